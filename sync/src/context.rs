use std::{fmt, time::Duration};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Cancellation scope handed to services and pollers.
///
/// A context is done once its token is cancelled (directly or through a
/// parent) or once its deadline, if any, has passed. Derived contexts never
/// cancel their parent.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DoneReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("context cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Root context: never expires, only done when cancelled explicitly.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a context that is cancelled together with `self` but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child whose deadline is `timeout` from now, or the inherited
    /// deadline if that one comes first.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now() + timeout;
        let deadline = self
            .deadline
            .map_or(requested, |inherited| inherited.min(requested));
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live. Explicit
    /// cancellation wins over an expired deadline.
    #[must_use]
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done_reason().is_some()
    }

    /// Resolves once the context is done and reports why.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => DoneReason::Cancelled,
                    () = sleep_until(deadline) => DoneReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_without_cancelling_parent() {
        let parent = Context::background();
        let ctx = parent.with_timeout(Duration::from_secs(5));

        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert!(ctx.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn inherited_deadline_is_never_extended() {
        let outer = Context::background().with_timeout(Duration::from_secs(5));
        let inner = outer.with_timeout(Duration::from_secs(60));

        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_children() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(3600));

        parent.cancel();

        assert_eq!(grandchild.done().await, DoneReason::Cancelled);
        assert_eq!(child.done_reason(), Some(DoneReason::Cancelled));
    }

    #[tokio::test]
    async fn child_cancellation_stays_local() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();

        assert!(child.is_done());
        assert!(parent.done_reason().is_none());
    }
}
