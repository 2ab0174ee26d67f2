use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt as _;
use thiserror::Error;
use tokio::task::{Id, JoinSet};

use crate::{Context, DynError};

/// A devnet process or container that can be brought up once and reports when
/// it is ready to serve.
#[async_trait]
pub trait Service: Send + Sync {
    /// Blocks until the service is fully initialized. Implementations should
    /// return early when `ctx` is done, but the coordinator waits for them
    /// either way.
    async fn start(&self, ctx: &Context) -> Result<(), DynError>;
}

/// Service slot in a launch group. An empty slot is an optional service that
/// is not configured for this environment and counts as started.
#[derive(Clone)]
pub struct NamedService {
    name: String,
    service: Option<Arc<dyn Service>>,
}

impl NamedService {
    #[must_use]
    pub fn new(name: impl Into<String>, service: Arc<dyn Service>) -> Self {
        Self::optional(name, Some(service))
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, service: Option<Arc<dyn Service>>) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.service.is_some()
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("service {service} failed to start: {source}")]
    ServiceFailed {
        service: String,
        #[source]
        source: DynError,
    },
    #[error("service {service} panicked while starting: {message}")]
    ServicePanicked { service: String, message: String },
}

impl LaunchError {
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::ServiceFailed { service, .. } | Self::ServicePanicked { service, .. } => service,
        }
    }
}

type LaunchOutcome = Result<(), LaunchError>;

/// Starts every configured service concurrently and waits for all of them.
///
/// The first failure observed is returned and cancels the context shared by
/// the group, so cooperative services can unwind. Services that ignore the
/// cancellation are still awaited before this returns. `ctx` itself is never
/// cancelled here.
pub async fn start_all(
    ctx: &Context,
    services: impl IntoIterator<Item = NamedService>,
) -> Result<(), LaunchError> {
    let group_ctx = ctx.child();
    let mut tasks = JoinSet::new();
    let mut names: HashMap<Id, String> = HashMap::new();

    for NamedService { name, service } in services {
        let Some(service) = service else {
            tracing::debug!(service = %name, "service not configured, skipping");
            continue;
        };
        let task_ctx = group_ctx.clone();
        let task_name = name.clone();
        let handle = tasks.spawn(async move {
            tracing::info!(service = %task_name, "starting service");
            let outcome = AssertUnwindSafe(service.start(&task_ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    tracing::info!(service = %task_name, "service started");
                    Ok(())
                }
                Ok(Err(source)) => Err(LaunchError::ServiceFailed {
                    service: task_name,
                    source,
                }),
                Err(panic) => Err(LaunchError::ServicePanicked {
                    service: task_name,
                    message: panic_message(panic),
                }),
            }
        });
        names.insert(handle.id(), name);
    }

    let launched = names.len();
    let mut first_error: Option<LaunchError> = None;

    while let Some(joined) = tasks.join_next_with_id().await {
        let outcome: LaunchOutcome = match joined {
            Ok((_, outcome)) => outcome,
            Err(join_err) => Err(LaunchError::ServicePanicked {
                service: names
                    .remove(&join_err.id())
                    .unwrap_or_else(|| "<unknown>".to_owned()),
                message: join_err.to_string(),
            }),
        };

        if let Err(error) = outcome {
            if first_error.is_none() {
                tracing::warn!(
                    service = error.service(),
                    %error,
                    "service failed to start, cancelling remaining launches"
                );
                group_ctx.cancel();
                first_error = Some(error);
            } else {
                tracing::debug!(
                    service = error.service(),
                    %error,
                    "additional launch failure after group cancellation"
                );
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => {
            tracing::info!(services = launched, "all services started");
            Ok(())
        }
    }
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::context::DoneReason;

    #[derive(Default)]
    struct Immediate {
        starts: AtomicUsize,
    }

    #[async_trait]
    impl Service for Immediate {
        async fn start(&self, _ctx: &Context) -> Result<(), DynError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing {
        after: Duration,
        message: &'static str,
    }

    #[async_trait]
    impl Service for Failing {
        async fn start(&self, _ctx: &Context) -> Result<(), DynError> {
            sleep(self.after).await;
            Err(self.message.into())
        }
    }

    /// Ignores cancellation and always runs to completion.
    #[derive(Default)]
    struct Stubborn {
        finished: AtomicBool,
    }

    #[async_trait]
    impl Service for Stubborn {
        async fn start(&self, _ctx: &Context) -> Result<(), DynError> {
            sleep(Duration::from_secs(30)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Waits for readiness forever unless the context is done.
    #[derive(Default)]
    struct Cooperative {
        observed: Mutex<Option<DoneReason>>,
    }

    #[async_trait]
    impl Service for Cooperative {
        async fn start(&self, ctx: &Context) -> Result<(), DynError> {
            let reason = ctx.done().await;
            *self.observed.lock().unwrap() = Some(reason);
            Err(format!("aborted: {reason}").into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Service for Panicking {
        async fn start(&self, _ctx: &Context) -> Result<(), DynError> {
            panic!("bad config");
        }
    }

    #[tokio::test]
    async fn starts_every_configured_service_once() {
        let beacon = Arc::new(Immediate::default());
        let geth = Arc::new(Immediate::default());

        start_all(
            &Context::background(),
            [
                NamedService::new("beacon-node", beacon.clone()),
                NamedService::new("geth", geth.clone()),
            ],
        )
        .await
        .expect("all services start");

        assert_eq!(beacon.starts.load(Ordering::SeqCst), 1);
        assert_eq!(geth.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_optional_service_is_a_success() {
        let geth = Arc::new(Immediate::default());

        let result = start_all(
            &Context::background(),
            [
                NamedService::optional("validator", None),
                NamedService::new("geth", geth.clone()),
            ],
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(geth.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_group_succeeds() {
        let result = start_all(&Context::background(), Vec::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_returned_after_stragglers_finish() {
        let stubborn = Arc::new(Stubborn::default());
        let started = Instant::now();

        let error = start_all(
            &Context::background(),
            [
                NamedService::new("geth-2", stubborn.clone()),
                NamedService::new(
                    "beacon-follower",
                    Arc::new(Failing {
                        after: Duration::from_secs(1),
                        message: "port already in use",
                    }),
                ),
            ],
        )
        .await
        .expect_err("group must fail");

        assert_eq!(error.service(), "beacon-follower");
        assert!(error.to_string().contains("port already in use"));
        assert!(stubborn.finished.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_cancels_cooperative_peers_but_not_the_caller() {
        let cooperative = Arc::new(Cooperative::default());
        let caller = Context::background();

        let error = start_all(
            &caller,
            [
                NamedService::new("validator", cooperative.clone()),
                NamedService::new(
                    "beacon-node",
                    Arc::new(Failing {
                        after: Duration::from_secs(2),
                        message: "genesis mismatch",
                    }),
                ),
            ],
        )
        .await
        .expect_err("group must fail");

        assert_eq!(error.service(), "beacon-node");
        assert_eq!(
            *cooperative.observed.lock().unwrap(),
            Some(DoneReason::Cancelled)
        );
        assert!(!caller.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_observed_failure_wins() {
        let error = start_all(
            &Context::background(),
            [
                NamedService::new(
                    "slow",
                    Arc::new(Failing {
                        after: Duration::from_secs(10),
                        message: "slow failure",
                    }),
                ),
                NamedService::new(
                    "fast",
                    Arc::new(Failing {
                        after: Duration::from_secs(1),
                        message: "fast failure",
                    }),
                ),
            ],
        )
        .await
        .expect_err("group must fail");

        assert_eq!(error.service(), "fast");
    }

    #[tokio::test]
    async fn panic_is_reported_as_launch_failure() {
        let error = start_all(
            &Context::background(),
            [NamedService::new("lodestar", Arc::new(Panicking))],
        )
        .await
        .expect_err("panic must fail the group");

        assert!(matches!(
            &error,
            LaunchError::ServicePanicked { service, message }
                if service == "lodestar" && message == "bad config"
        ));
    }
}
