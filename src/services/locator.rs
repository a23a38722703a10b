use crate::error::{Result, UnkindleError};
use crate::services::window::WindowController;
use crate::types::WindowBounds;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TargetWindowLocator {
    window: Arc<dyn WindowController>,
    title_bar_inset: i32,
}

impl TargetWindowLocator {
    pub fn new(window: Arc<dyn WindowController>, title_bar_inset: i32) -> Self {
        Self {
            window,
            title_bar_inset,
        }
    }

    /// Finds the reader window and returns the region below its title bar.
    pub async fn locate(&self) -> Result<WindowBounds> {
        let reported = self.window.locate().await?;
        debug!("Reported window geometry: {}", reported);

        let bounds = reported.inset_top(self.title_bar_inset);
        if bounds.width <= 0 || bounds.height <= 0 {
            return Err(UnkindleError::WindowGeometryUnavailable {
                reason: format!(
                    "window {} leaves no capturable area below a {}px title bar",
                    reported, self.title_bar_inset
                ),
            });
        }

        info!("Capture region for {}: {}", self.window.app_name(), bounds);
        Ok(bounds)
    }
}
