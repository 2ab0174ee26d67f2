use std::sync::Once;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,devnet_sync=debug,e2e_ctrl=debug";

/// Installs a fmt subscriber for tests, once per process.
///
/// Output goes through the test writer so it is only shown for failing
/// tests. `RUST_LOG` overrides the default filter.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        if let Err(error) = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init()
        {
            eprintln!("test logging not installed: {error}");
        }
    });
}
