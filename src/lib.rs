//! # Unkindle
//!
//! Pages through an open e-reader window, screenshots every page, notices when
//! the book stops changing and binds the captures into a single PDF.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unkindle::{AppleScriptWindow, CaptureConfig, CaptureController};
//!
//! #[tokio::main]
//! async fn main() {
//!     let window = Arc::new(AppleScriptWindow::default());
//!
//!     let mut config = CaptureConfig::new("./books/my_book");
//!     config.max_pages = Some(50);
//!
//!     let (controller, handle) = CaptureController::new(window, config);
//!
//!     // `handle.stop()` finishes the current page and builds the PDF,
//!     // `handle.cancel()` abandons the run.
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.cancel();
//!     });
//!
//!     let result = controller.run().await;
//!     println!("Captured {} pages", result.pages_captured);
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

// Re-export main types and services for easier usage
pub use error::{Result, UnkindleError};
pub use services::{
    AppleScriptWindow, BookLibrary, CaptureController, DocumentAssembler, DuplicateDetector,
    PageAdvancer, PageCapturer, SessionEnd, SessionHandle, TargetWindowLocator,
    WindowController,
};
pub use types::{
    BookEntry, CaptureConfig, CaptureResult, PageCapture, SessionProgress, SessionStatus,
    WindowBounds,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
