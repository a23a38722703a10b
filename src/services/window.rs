//! Operating-system automation surface for the reader application.
//!
//! The capture engine only needs four capabilities from the desktop: find the
//! reader window, bring it to the front, grab a screen region into a file and
//! press the "next page" key. [`WindowController`] names those capabilities so
//! the engine does not care which automation backend sits underneath.

use crate::error::{Result, UnkindleError};
use crate::types::WindowBounds;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_APP_NAME: &str = "Amazon Kindle";
/// macOS virtual key code for the right arrow.
pub const DEFAULT_ADVANCE_KEY_CODE: u16 = 124;

const ACTIVATION_SETTLE: Duration = Duration::from_millis(500);
const NOT_RUNNING_MARKER: &str = "NOT_RUNNING";

#[async_trait]
pub trait WindowController: Send + Sync {
    /// Name of the automated application, used in error messages.
    fn app_name(&self) -> &str;

    /// Reports the raw window geometry, title bar included.
    async fn locate(&self) -> Result<WindowBounds>;

    async fn foreground(&self) -> Result<()>;

    /// Writes a screenshot of `bounds` to `destination`.
    async fn capture_region(&self, bounds: &WindowBounds, destination: &Path) -> Result<()>;

    async fn send_advance_key(&self) -> Result<()>;
}

/// Drives the reader through `osascript` and `screencapture` (macOS).
pub struct AppleScriptWindow {
    app_name: String,
    advance_key_code: u16,
}

impl AppleScriptWindow {
    pub fn new(app_name: impl Into<String>, advance_key_code: u16) -> Self {
        Self {
            app_name: app_name.into(),
            advance_key_code,
        }
    }

    async fn run_osascript(script: &str) -> std::io::Result<Output> {
        Command::new("osascript").arg("-e").arg(script).output().await
    }

    fn stderr_of(output: &Output) -> String {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    }
}

impl Default for AppleScriptWindow {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME, DEFAULT_ADVANCE_KEY_CODE)
    }
}

#[async_trait]
impl WindowController for AppleScriptWindow {
    fn app_name(&self) -> &str {
        &self.app_name
    }

    async fn locate(&self) -> Result<WindowBounds> {
        let script = format!(
            r#"tell application "{app}"
  if not running then
    return "{marker}"
  end if
  activate
end tell
delay 0.5
tell application "System Events"
  tell process "{app}"
    get {{position, size}} of window 1
  end tell
end tell"#,
            app = self.app_name,
            marker = NOT_RUNNING_MARKER
        );

        let output = Self::run_osascript(&script).await.map_err(|e| {
            UnkindleError::WindowGeometryUnavailable {
                reason: format!("failed to run osascript: {}", e),
            }
        })?;

        if !output.status.success() {
            return Err(UnkindleError::WindowGeometryUnavailable {
                reason: format!(
                    "window query failed, check accessibility permissions: {}",
                    Self::stderr_of(&output)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("Window query answered: {}", stdout.trim());

        if stdout.trim() == NOT_RUNNING_MARKER {
            return Err(UnkindleError::TargetNotRunning {
                app: self.app_name.clone(),
            });
        }

        parse_window_geometry(&stdout)
    }

    async fn foreground(&self) -> Result<()> {
        let script = format!("tell application \"{}\" to activate", self.app_name);
        let output = Self::run_osascript(&script).await?;

        if !output.status.success() {
            return Err(UnkindleError::TargetNotRunning {
                app: self.app_name.clone(),
            });
        }

        tokio::time::sleep(ACTIVATION_SETTLE).await;
        Ok(())
    }

    async fn capture_region(&self, bounds: &WindowBounds, destination: &Path) -> Result<()> {
        let output = Command::new("screencapture")
            .arg("-x")
            .arg("-R")
            .arg(bounds.to_string())
            .arg(destination)
            .output()
            .await
            .map_err(|e| UnkindleError::CaptureFailed {
                path: destination.display().to_string(),
                reason: format!("failed to run screencapture: {}", e),
            })?;

        if !output.status.success() {
            return Err(UnkindleError::CaptureFailed {
                path: destination.display().to_string(),
                reason: Self::stderr_of(&output),
            });
        }

        Ok(())
    }

    async fn send_advance_key(&self) -> Result<()> {
        let script = format!(
            r#"tell application "{app}"
  activate
end tell
tell application "System Events"
  tell process "{app}"
    key code {key}
    delay 0.2
  end tell
end tell"#,
            app = self.app_name,
            key = self.advance_key_code
        );

        let output = Self::run_osascript(&script)
            .await
            .map_err(|e| UnkindleError::NavigationFailed {
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(UnkindleError::NavigationFailed {
                reason: Self::stderr_of(&output),
            });
        }

        Ok(())
    }
}

/// Parses the `{position, size}` answer of the window query.
///
/// The answer must contain exactly four integers: x, y, width and height.
pub fn parse_window_geometry(answer: &str) -> Result<WindowBounds> {
    let number = Regex::new(r"-?\d+").map_err(|e| UnkindleError::WindowGeometryUnavailable {
        reason: e.to_string(),
    })?;

    let values = number
        .find_iter(answer)
        .map(|m| m.as_str().parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| UnkindleError::WindowGeometryUnavailable {
            reason: format!("unreadable coordinate in '{}': {}", answer.trim(), e),
        })?;

    match values.as_slice() {
        [x, y, width, height] => Ok(WindowBounds {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err(UnkindleError::WindowGeometryUnavailable {
            reason: format!(
                "expected 4 integers, got {} in '{}'. Make sure the window is not minimized",
                values.len(),
                answer.trim()
            ),
        }),
    }
}
