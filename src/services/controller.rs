use crate::error::{Result, UnkindleError};
use crate::services::advancer::PageAdvancer;
use crate::services::assembler::DocumentAssembler;
use crate::services::capturer::PageCapturer;
use crate::services::fingerprint::DuplicateDetector;
use crate::services::locator::TargetWindowLocator;
use crate::services::window::WindowController;
use crate::types::{
    CaptureConfig, CaptureResult, PageCapture, SessionProgress, SessionStatus, WindowBounds,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Remote control for a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    cancel_token: CancellationToken,
    progress_rx: watch::Receiver<SessionProgress>,
}

impl SessionHandle {
    /// Finish the page in flight, then build the document.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        info!("Stop requested, finishing current page");
    }

    /// Abandon the session: the newest page is deleted and no document is built.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
        info!("Cancel requested");
    }

    pub fn progress(&self) -> watch::Receiver<SessionProgress> {
        self.progress_rx.clone()
    }
}

/// Per-run state, owned and mutated only by the controller.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub output_dir: PathBuf,
    pub capture_delay_ms: u64,
    pub current_page: u32,
    pub pages_processed: u32,
    pub max_pages: Option<u32>,
    pub bounds: Option<WindowBounds>,
    pub status: SessionStatus,
}

impl CaptureSession {
    fn from_config(config: &CaptureConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            capture_delay_ms: config.capture_delay_ms,
            current_page: config.start_page,
            pages_processed: 0,
            max_pages: config.max_pages,
            bounds: None,
            status: SessionStatus::Idle,
        }
    }

    fn page_limit_reached(&self) -> bool {
        self.max_pages
            .map(|max| self.pages_processed >= max)
            .unwrap_or(false)
    }
}

/// How a session ended when no error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Completed { document_path: PathBuf },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Cancelled,
    StopRequested,
    RepeatedPage,
    PageLimit,
    PageNumbersExhausted,
}

pub struct CaptureController {
    config: CaptureConfig,
    locator: TargetWindowLocator,
    capturer: PageCapturer,
    advancer: PageAdvancer,
    session: CaptureSession,
    captures: Vec<PageCapture>,
    stop_rx: watch::Receiver<bool>,
    cancel_token: CancellationToken,
    progress_tx: watch::Sender<SessionProgress>,
}

impl CaptureController {
    pub fn new(window: Arc<dyn WindowController>, config: CaptureConfig) -> (Self, SessionHandle) {
        let session = CaptureSession::from_config(&config);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(SessionProgress {
            status: session.status,
            current_page: session.current_page,
            pages_processed: 0,
        });
        let cancel_token = CancellationToken::new();

        let handle = SessionHandle {
            stop_tx: Arc::new(stop_tx),
            cancel_token: cancel_token.clone(),
            progress_rx,
        };

        let controller = Self {
            locator: TargetWindowLocator::new(window.clone(), config.title_bar_inset),
            capturer: PageCapturer::new(window.clone(), config.capture_delay_ms),
            advancer: PageAdvancer::new(window, config.advance_settle_ms),
            config,
            session,
            captures: Vec::new(),
            stop_rx,
            cancel_token,
            progress_tx,
        };

        (controller, handle)
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    /// Pages retained by this session, in capture order.
    pub fn captures(&self) -> &[PageCapture] {
        &self.captures
    }

    /// Runs the session to the end and reports it in the caller-facing shape.
    pub async fn run(mut self) -> CaptureResult {
        match self.execute().await {
            Ok(SessionEnd::Completed { document_path }) => CaptureResult {
                success: true,
                pages_captured: self.captures.len(),
                document_path: Some(document_path),
                error: None,
                status: self.session.status,
            },
            Ok(SessionEnd::Cancelled) => CaptureResult {
                success: false,
                pages_captured: self.captures.len(),
                document_path: None,
                error: Some("capture cancelled".to_string()),
                status: self.session.status,
            },
            Err(e) => CaptureResult {
                success: false,
                pages_captured: self.captures.len(),
                document_path: None,
                error: Some(e.to_string()),
                status: self.session.status,
            },
        }
    }

    /// Drives the session through its states.
    ///
    /// Errors leave every page written so far on disk; only cancellation deletes.
    pub async fn execute(&mut self) -> Result<SessionEnd> {
        self.transition(SessionStatus::Initializing);

        let bounds = match self.initialize().await {
            Ok(bounds) => bounds,
            Err(e) => return Err(self.fail(e)),
        };
        self.session.bounds = Some(bounds);

        if self.cancel_token.is_cancelled() {
            self.transition(SessionStatus::Cancelled);
            return Ok(SessionEnd::Cancelled);
        }

        self.transition(SessionStatus::Capturing);
        info!(
            "Capturing from page {} into {}",
            self.session.current_page,
            self.session.output_dir.display()
        );

        let exit = match self.capture_loop(&bounds).await {
            Ok(exit) => exit,
            Err(e) => return Err(self.fail(e)),
        };
        info!(
            "Capture loop ended ({:?}) after {} pages",
            exit, self.session.pages_processed
        );

        if exit == LoopExit::Cancelled || self.cancel_token.is_cancelled() {
            self.discard_newest_capture().await;
            self.transition(SessionStatus::Cancelled);
            return Ok(SessionEnd::Cancelled);
        }

        if self.session.status == SessionStatus::Capturing {
            self.transition(SessionStatus::Stopping);
        }

        match DocumentAssembler::assemble(&self.session.output_dir).await {
            Ok(document_path) => {
                self.transition(SessionStatus::Completed);
                Ok(SessionEnd::Completed { document_path })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn initialize(&mut self) -> Result<WindowBounds> {
        self.config.validate()?;

        let output_dir = &self.session.output_dir;
        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| UnkindleError::DirectoryAccessFailed {
                path: output_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        self.locator.locate().await
    }

    async fn capture_loop(&mut self, bounds: &WindowBounds) -> Result<LoopExit> {
        let mut previous_fingerprint: Option<String> = None;

        loop {
            if self.cancel_token.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }
            if self.stop_requested() {
                self.transition(SessionStatus::Stopping);
                return Ok(LoopExit::StopRequested);
            }
            if self.session.page_limit_reached() {
                return Ok(LoopExit::PageLimit);
            }

            let page_number = self.session.current_page;
            debug!("Capturing page {}", page_number);

            let destination = PageCapturer::destination_for(&self.session.output_dir, page_number);
            let path = self.capturer.capture(bounds, &destination).await?;
            let fingerprint = DuplicateDetector::fingerprint(&path).await?;

            if DuplicateDetector::is_repeat(previous_fingerprint.as_deref(), &fingerprint) {
                info!(
                    "Page {} is identical to the previous page, treating it as the end of the book",
                    page_number
                );
                fs::remove_file(&path).await?;
                return Ok(LoopExit::RepeatedPage);
            }

            self.captures.push(PageCapture {
                path,
                page_number,
                fingerprint: fingerprint.clone(),
            });
            previous_fingerprint = Some(fingerprint);
            self.session.pages_processed += 1;
            self.publish_progress();
            info!("Captured page {}", page_number);

            // A signal that arrived mid-capture leaves the reader where it is.
            if self.cancel_token.is_cancelled() || self.stop_requested() {
                continue;
            }

            let Some(next_page) = page_number.checked_add(1) else {
                warn!("Page {} is the highest page number available, ending capture", page_number);
                return Ok(LoopExit::PageNumbersExhausted);
            };

            self.advancer.advance().await?;
            self.session.current_page = next_page;
            self.publish_progress();
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn discard_newest_capture(&mut self) {
        let Some(newest) = self.captures.pop() else {
            return;
        };

        match fs::remove_file(&newest.path).await {
            Ok(()) => info!(
                "Removed page {} captured before cancellation",
                newest.page_number
            ),
            Err(e) => warn!(
                "Could not remove partial capture {}: {}",
                newest.path.display(),
                e
            ),
        }
    }

    fn fail(&mut self, e: UnkindleError) -> UnkindleError {
        error!("Capture session failed: {}", e);
        self.transition(SessionStatus::Failed);
        e
    }

    fn transition(&mut self, next: SessionStatus) {
        let current = self.session.status;
        if !current.can_transition_to(next) {
            warn!("Ignoring session transition {} -> {}", current, next);
            return;
        }

        debug!("Session {} -> {}", current, next);
        self.session.status = next;
        self.publish_progress();
    }

    fn publish_progress(&self) {
        self.progress_tx.send_replace(SessionProgress {
            status: self.session.status,
            current_page: self.session.current_page,
            pages_processed: self.session.pages_processed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::assembler::{DocumentAssembler, DOCUMENT_FILE_NAME};
    use crate::services::testing::{page_png, ScriptedWindow};
    use std::path::Path;
    use std::sync::OnceLock;

    fn config_for(dir: &Path) -> CaptureConfig {
        let mut config = CaptureConfig::new(dir);
        config.capture_delay_ms = 0;
        config.advance_settle_ms = 0;
        config
    }

    fn page_numbers_on_disk(dir: &Path) -> Vec<u32> {
        DocumentAssembler::scan_pages(dir)
            .unwrap()
            .iter()
            .map(|p| p.page_number)
            .collect()
    }

    #[tokio::test]
    async fn test_page_limit_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(5));
        let mut config = config_for(dir.path());
        config.max_pages = Some(3);

        let (mut controller, _handle) = CaptureController::new(window.clone(), config);
        let end = controller.execute().await.unwrap();

        assert!(matches!(end, SessionEnd::Completed { .. }));
        assert_eq!(controller.status(), SessionStatus::Completed);
        assert_eq!(controller.session().pages_processed, 3);
        assert_eq!(window.captures(), 3);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2, 3]);
        assert!(dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_repeated_page_ends_book() {
        let dir = tempfile::tempdir().unwrap();
        let screens = vec![page_png(1, 20), page_png(2, 20), page_png(2, 20)];
        let window = Arc::new(ScriptedWindow::new(screens));

        let (controller, _handle) = CaptureController::new(window.clone(), config_for(dir.path()));
        let result = controller.run().await;

        assert!(result.success);
        assert_eq!(result.pages_captured, 2);
        assert_eq!(result.status, SessionStatus::Completed);
        assert_eq!(window.captures(), 3);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2]);
        assert_eq!(
            result.document_path,
            Some(dir.path().join(DOCUMENT_FILE_NAME))
        );
    }

    #[tokio::test]
    async fn test_last_page_repeats_at_end_of_book() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(4));

        let (mut controller, _handle) = CaptureController::new(window.clone(), config_for(dir.path()));
        controller.execute().await.unwrap();

        assert_eq!(controller.captures().len(), 4);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_start_page_numbers_captures() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(2));
        let mut config = config_for(dir.path());
        config.start_page = 41;

        let (mut controller, _handle) = CaptureController::new(window, config);
        controller.execute().await.unwrap();

        assert_eq!(page_numbers_on_disk(dir.path()), vec![41, 42]);
    }

    #[tokio::test]
    async fn test_cancel_removes_newest_page_only() {
        let dir = tempfile::tempdir().unwrap();
        let handle_slot: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());
        let slot = handle_slot.clone();
        let window = ScriptedWindow::with_distinct_pages(6).on_capture(move |ordinal| {
            if ordinal == 3 {
                if let Some(handle) = slot.get() {
                    handle.cancel();
                }
            }
        });

        let (controller, handle) = CaptureController::new(Arc::new(window), config_for(dir.path()));
        handle_slot.set(handle).ok();
        let result = controller.run().await;

        assert!(!result.success);
        assert_eq!(result.status, SessionStatus::Cancelled);
        assert_eq!(result.pages_captured, 2);
        assert!(result.document_path.is_none());
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2]);
        assert!(!dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_stop_finishes_current_page_and_assembles() {
        let dir = tempfile::tempdir().unwrap();
        let handle_slot: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());
        let slot = handle_slot.clone();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(6).on_capture(move |ordinal| {
            if ordinal == 2 {
                if let Some(handle) = slot.get() {
                    handle.stop();
                }
            }
        }));

        let (controller, handle) = CaptureController::new(window.clone(), config_for(dir.path()));
        handle_slot.set(handle.clone()).ok();
        let result = controller.run().await;

        assert!(result.success);
        assert_eq!(result.pages_captured, 2);
        assert_eq!(window.advances(), 1);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2]);
        assert_eq!(handle.progress().borrow().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_wins_over_stop() {
        let dir = tempfile::tempdir().unwrap();
        let handle_slot: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());
        let slot = handle_slot.clone();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(6).on_capture(move |ordinal| {
            if ordinal == 3 {
                if let Some(handle) = slot.get() {
                    handle.stop();
                    handle.cancel();
                }
            }
        }));

        let (controller, handle) = CaptureController::new(window.clone(), config_for(dir.path()));
        handle_slot.set(handle.clone()).ok();
        let result = controller.run().await;

        assert!(!result.success);
        assert_eq!(result.status, SessionStatus::Cancelled);
        assert_eq!(result.pages_captured, 2);
        assert!(result.document_path.is_none());
        assert_eq!(window.advances(), 2);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2]);
        assert!(!dir.path().join(DOCUMENT_FILE_NAME).exists());
        assert_eq!(handle.progress().borrow().status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_final_capture_skips_document() {
        let dir = tempfile::tempdir().unwrap();
        let handle_slot: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());
        let slot = handle_slot.clone();
        // The third capture repeats the second, so the loop ends on its own
        // with the cancel already signalled.
        let screens = vec![page_png(1, 20), page_png(2, 20), page_png(2, 20)];
        let window = ScriptedWindow::new(screens).on_capture(move |ordinal| {
            if ordinal == 3 {
                if let Some(handle) = slot.get() {
                    handle.cancel();
                }
            }
        });

        let (controller, handle) = CaptureController::new(Arc::new(window), config_for(dir.path()));
        handle_slot.set(handle).ok();
        let result = controller.run().await;

        assert_eq!(result.status, SessionStatus::Cancelled);
        assert_eq!(result.pages_captured, 1);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1]);
        assert!(!dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_highest_page_number_ends_capture() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(3));
        let mut config = config_for(dir.path());
        config.start_page = u32::MAX;

        let (controller, _handle) = CaptureController::new(window.clone(), config);
        let result = controller.run().await;

        assert!(result.success);
        assert_eq!(result.status, SessionStatus::Completed);
        assert_eq!(result.pages_captured, 1);
        assert_eq!(window.advances(), 0);
        assert_eq!(page_numbers_on_disk(dir.path()), vec![u32::MAX]);
        assert!(dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_missing_reader_fails_before_capture() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("new-book");
        let window = Arc::new(ScriptedWindow::not_running());

        let (mut controller, _handle) = CaptureController::new(window.clone(), config_for(&output));
        let err = controller.execute().await.unwrap_err();

        assert!(matches!(err, UnkindleError::TargetNotRunning { .. }));
        assert_eq!(controller.status(), SessionStatus::Failed);
        assert_eq!(window.captures(), 0);
        assert!(output.is_dir());
    }

    #[tokio::test]
    async fn test_navigation_failure_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(5).failing_advance_at(2));

        let (controller, _handle) = CaptureController::new(window, config_for(dir.path()));
        let result = controller.run().await;

        assert!(!result.success);
        assert_eq!(result.status, SessionStatus::Failed);
        assert!(result.error.unwrap().contains("navigate"));
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1, 2]);
        assert!(!dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_capture_failure_fails_session() {
        let dir = tempfile::tempdir().unwrap();
        let window = Arc::new(ScriptedWindow::with_distinct_pages(5).empty_capture_at(2));

        let (mut controller, _handle) = CaptureController::new(window, config_for(dir.path()));
        let err = controller.execute().await.unwrap_err();

        assert!(matches!(err, UnkindleError::CaptureFailed { .. }));
        assert_eq!(page_numbers_on_disk(dir.path()), vec![1]);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.max_pages = Some(0);

        let (mut controller, _handle) =
            CaptureController::new(Arc::new(ScriptedWindow::with_distinct_pages(1)), config);
        let err = controller.execute().await.unwrap_err();

        assert!(matches!(err, UnkindleError::InvalidOptions { .. }));
        assert_eq!(controller.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_status_transitions() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Capturing.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Capturing));
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(!Idle.can_transition_to(Capturing));
    }
}
