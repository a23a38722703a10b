use crate::error::{Result, UnkindleError};
use crate::services::window::WindowController;
use crate::types::WindowBounds;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// File name of a page capture: `page_<page>_<timestamp millis>.png`.
pub fn page_file_name(page_number: u32, timestamp_millis: i64) -> String {
    format!("page_{}_{}.png", page_number, timestamp_millis)
}

pub struct PageCapturer {
    window: Arc<dyn WindowController>,
    capture_delay: Duration,
}

impl PageCapturer {
    pub fn new(window: Arc<dyn WindowController>, capture_delay_ms: u64) -> Self {
        Self {
            window,
            capture_delay: Duration::from_millis(capture_delay_ms),
        }
    }

    /// Destination for `page_number` in `output_dir`, stamped with the current time.
    pub fn destination_for(output_dir: &Path, page_number: u32) -> PathBuf {
        let timestamp = chrono::Utc::now().timestamp_millis();
        output_dir.join(page_file_name(page_number, timestamp))
    }

    /// Screenshots `bounds` into `destination`.
    ///
    /// Any failure removes whatever was written and surfaces as `CaptureFailed`.
    pub async fn capture(&self, bounds: &WindowBounds, destination: &Path) -> Result<PathBuf> {
        match self.write_capture(bounds, destination).await {
            Ok(()) => Ok(destination.to_path_buf()),
            Err(e) => {
                Self::discard_partial(destination).await;
                Err(match e {
                    UnkindleError::CaptureFailed { .. } => e,
                    other => UnkindleError::CaptureFailed {
                        path: destination.display().to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn write_capture(&self, bounds: &WindowBounds, destination: &Path) -> Result<()> {
        self.window.foreground().await?;
        tokio::time::sleep(self.capture_delay).await;

        self.window.capture_region(bounds, destination).await?;

        let size = fs::metadata(destination).await?.len();
        if size == 0 {
            return Err(UnkindleError::CaptureFailed {
                path: destination.display().to_string(),
                reason: "screenshot file is empty".to_string(),
            });
        }

        debug!("Captured {} ({} bytes)", destination.display(), size);
        Ok(())
    }

    async fn discard_partial(destination: &Path) {
        if let Err(e) = fs::remove_file(destination).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(
                    "Could not remove partial capture {}: {}",
                    destination.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedWindow;

    #[test]
    fn test_page_file_name() {
        assert_eq!(page_file_name(12, 1700000000123), "page_12_1700000000123.png");
    }

    #[tokio::test]
    async fn test_capture_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let capturer = PageCapturer::new(Arc::new(ScriptedWindow::with_distinct_pages(2)), 0);
        let destination = PageCapturer::destination_for(dir.path(), 1);

        let path = capturer
            .capture(&ScriptedWindow::BOUNDS, &destination)
            .await
            .unwrap();

        assert_eq!(path, destination);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("page_1_") && name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_empty_capture_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let window = ScriptedWindow::with_distinct_pages(2).empty_capture_at(1);
        let capturer = PageCapturer::new(Arc::new(window), 0);
        let destination = dir.path().join(page_file_name(1, 1));

        let err = capturer
            .capture(&ScriptedWindow::BOUNDS, &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, UnkindleError::CaptureFailed { .. }));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_capture_failure() {
        let dir = tempfile::tempdir().unwrap();
        let capturer = PageCapturer::new(Arc::new(ScriptedWindow::with_distinct_pages(1)), 0);
        let destination = dir.path().join("missing").join(page_file_name(1, 1));

        let err = capturer
            .capture(&ScriptedWindow::BOUNDS, &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, UnkindleError::CaptureFailed { .. }));
    }
}
