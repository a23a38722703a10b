use crate::error::{Result, UnkindleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CAPTURE_DELAY_MS: u64 = 1000;
pub const DEFAULT_ADVANCE_SETTLE_MS: u64 = 1000;
pub const DEFAULT_TITLE_BAR_INSET: i32 = 22;

/// Capturable region of the reader window in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl WindowBounds {
    /// Moves the top edge down by `inset` pixels to drop the title bar.
    pub fn inset_top(self, inset: i32) -> Self {
        Self {
            x: self.x,
            y: self.y + inset,
            width: self.width,
            height: self.height - inset,
        }
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCapture {
    pub path: PathBuf,
    pub page_number: u32,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Initializing,
    Capturing,
    Stopping,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Capturing)
                | (Initializing, Cancelled)
                | (Initializing, Failed)
                | (Capturing, Stopping)
                | (Capturing, Cancelled)
                | (Capturing, Failed)
                | (Stopping, Cancelled)
                | (Stopping, Completed)
                | (Stopping, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Cancelled | SessionStatus::Completed | SessionStatus::Failed
        )
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Initializing => "Initializing",
            SessionStatus::Capturing => "Capturing",
            SessionStatus::Stopping => "Stopping",
            SessionStatus::Cancelled => "Cancelled",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Snapshot published to observers after every state change or recorded page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub status: SessionStatus,
    pub current_page: u32,
    pub pages_processed: u32,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub output_dir: PathBuf,
    pub capture_delay_ms: u64,
    pub start_page: u32,
    pub max_pages: Option<u32>,
    pub title_bar_inset: i32,
    pub advance_settle_ms: u64,
}

impl CaptureConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            capture_delay_ms: DEFAULT_CAPTURE_DELAY_MS,
            start_page: 1,
            max_pages: None,
            title_bar_inset: DEFAULT_TITLE_BAR_INSET,
            advance_settle_ms: DEFAULT_ADVANCE_SETTLE_MS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_page == 0 {
            return Err(UnkindleError::InvalidOptions {
                reason: "start page must be at least 1".to_string(),
            });
        }

        if self.max_pages == Some(0) {
            return Err(UnkindleError::InvalidOptions {
                reason: "max pages must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub success: bool,
    pub pages_captured: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookEntry {
    pub name: String,
    pub path: PathBuf,
    pub last_page: u32,
}
