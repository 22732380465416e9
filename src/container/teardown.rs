//! Bounded, exhaustive subsystem teardown.

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::TeardownError;
use crate::observability::metrics;
use crate::subsystem::{SubsystemError, SubsystemKind};

/// A pending `close()` call, tagged with its subsystem.
pub(crate) type Closing<'a> = (SubsystemKind, BoxFuture<'a, Result<(), SubsystemError>>);

/// Outcome of a teardown pass.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Subsystems that closed cleanly, in close order.
    pub closed: Vec<SubsystemKind>,
    /// Subsystems whose close failed or timed out.
    pub failures: Vec<(SubsystemKind, TeardownError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// How many close calls were made.
    pub fn attempted(&self) -> usize {
        self.closed.len() + self.failures.len()
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} closed, {} failed", self.closed.len(), self.failures.len())?;
        for (kind, err) in &self.failures {
            write!(f, "; {}: {}", kind, err)?;
        }
        Ok(())
    }
}

/// Await each close in order, each bounded by `timeout`.
///
/// Never stops early: a failing subsystem is recorded and the next one
/// is still closed.
pub(crate) async fn close_all(closers: Vec<Closing<'_>>, timeout: Duration) -> TeardownReport {
    let mut report = TeardownReport::default();

    for (kind, closing) in closers {
        match tokio::time::timeout(timeout, closing).await {
            Ok(Ok(())) => {
                tracing::info!(subsystem = %kind, "Subsystem closed");
                metrics::record_teardown(kind, "closed");
                report.closed.push(kind);
            }
            Ok(Err(e)) => {
                tracing::warn!(subsystem = %kind, error = %e, "Subsystem close failed");
                metrics::record_teardown(kind, "failed");
                report.failures.push((kind, TeardownError::Failed(e)));
            }
            Err(_) => {
                tracing::warn!(subsystem = %kind, timeout = ?timeout, "Subsystem close timed out");
                metrics::record_teardown(kind, "timed_out");
                report.failures.push((kind, TeardownError::TimedOut(timeout)));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[tokio::test]
    async fn failures_do_not_stop_the_pass() {
        let closers: Vec<Closing<'_>> = vec![
            (SubsystemKind::Broker, async { Ok(()) }.boxed()),
            (
                SubsystemKind::Cache,
                async { Err(SubsystemError::Unavailable("gone".into())) }.boxed(),
            ),
            (SubsystemKind::Queue, async { Ok(()) }.boxed()),
        ];

        let report = close_all(closers, Duration::from_secs(1)).await;

        assert_eq!(report.closed, vec![SubsystemKind::Broker, SubsystemKind::Queue]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, SubsystemKind::Cache);
        assert_eq!(report.attempted(), 3);
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_close_is_abandoned_after_timeout() {
        let closers: Vec<Closing<'_>> = vec![
            (SubsystemKind::Scheduler, futures_util::future::pending().boxed()),
            (SubsystemKind::Cache, async { Ok(()) }.boxed()),
        ];

        let report = close_all(closers, Duration::from_secs(5)).await;

        assert_eq!(report.closed, vec![SubsystemKind::Cache]);
        assert!(matches!(
            report.failures[0],
            (SubsystemKind::Scheduler, TeardownError::TimedOut(d)) if d == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn empty_pass_is_clean() {
        let report = close_all(Vec::new(), Duration::from_secs(1)).await;
        assert!(report.is_clean());
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.to_string(), "0 closed, 0 failed");
    }
}
