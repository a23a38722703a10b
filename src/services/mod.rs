pub mod advancer;
pub mod assembler;
pub mod capturer;
pub mod controller;
pub mod fingerprint;
pub mod library;
pub mod locator;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use advancer::PageAdvancer;
pub use assembler::{DocumentAssembler, PageFile, DOCUMENT_FILE_NAME};
pub use capturer::PageCapturer;
pub use controller::{CaptureController, CaptureSession, SessionEnd, SessionHandle};
pub use fingerprint::DuplicateDetector;
pub use library::BookLibrary;
pub use locator::TargetWindowLocator;
pub use window::{AppleScriptWindow, WindowController};
