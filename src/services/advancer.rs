use crate::error::{Result, UnkindleError};
use crate::services::window::WindowController;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct PageAdvancer {
    window: Arc<dyn WindowController>,
    settle: Duration,
}

impl PageAdvancer {
    pub fn new(window: Arc<dyn WindowController>, settle_ms: u64) -> Self {
        Self {
            window,
            settle: Duration::from_millis(settle_ms),
        }
    }

    /// Turns one page and waits for the reader to render it.
    ///
    /// Not retried: a second key press could skip a page, and a missed one
    /// would look like end-of-book to the duplicate check.
    pub async fn advance(&self) -> Result<()> {
        self.window
            .send_advance_key()
            .await
            .map_err(|e| match e {
                UnkindleError::NavigationFailed { .. } => e,
                other => UnkindleError::NavigationFailed {
                    reason: other.to_string(),
                },
            })?;

        debug!("Advance key sent, settling for {}ms", self.settle.as_millis());
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedWindow;

    #[tokio::test]
    async fn test_advance_sends_one_key() {
        let window = Arc::new(ScriptedWindow::with_distinct_pages(3));
        let advancer = PageAdvancer::new(window.clone(), 0);

        advancer.advance().await.unwrap();
        advancer.advance().await.unwrap();
        assert_eq!(window.advances(), 2);
    }

    #[tokio::test]
    async fn test_advance_failure_is_navigation_failure() {
        let window = Arc::new(ScriptedWindow::with_distinct_pages(3).failing_advance_at(1));
        let advancer = PageAdvancer::new(window, 0);

        let err = advancer.advance().await.unwrap_err();
        assert!(matches!(err, UnkindleError::NavigationFailed { .. }));
    }
}
