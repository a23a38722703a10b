//! In-memory reader used by the unit tests.

use crate::error::{Result, UnkindleError};
use crate::services::window::WindowController;
use crate::types::WindowBounds;
use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type CaptureHook = Box<dyn Fn(usize) + Send + Sync>;

/// Encodes a solid-colour PNG. `width` doubles as a page marker in PDF assertions.
pub fn page_png(seed: u8, width: u32) -> Vec<u8> {
    let buffer = ImageBuffer::from_pixel(width, 8, Rgb([seed, 255 - seed, seed / 2]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn write_page_file(dir: &Path, name: &str, width: u32) {
    std::fs::write(dir.join(name), page_png(width as u8, width)).unwrap();
}

/// A reader showing a fixed list of screens. Advancing past the last screen
/// keeps showing it, the way a real reader sits on the final page.
pub struct ScriptedWindow {
    screens: Vec<Vec<u8>>,
    position: Mutex<usize>,
    running: bool,
    empty_capture_at: Option<usize>,
    failing_advance_at: Option<usize>,
    on_capture: Option<CaptureHook>,
    captures: AtomicUsize,
    advances: AtomicUsize,
}

impl ScriptedWindow {
    pub const BOUNDS: WindowBounds = WindowBounds {
        x: 10,
        y: 40,
        width: 640,
        height: 480,
    };

    pub fn new(screens: Vec<Vec<u8>>) -> Self {
        Self {
            screens,
            position: Mutex::new(0),
            running: true,
            empty_capture_at: None,
            failing_advance_at: None,
            on_capture: None,
            captures: AtomicUsize::new(0),
            advances: AtomicUsize::new(0),
        }
    }

    pub fn with_distinct_pages(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| page_png((i * 20 % 256) as u8, 16 + i as u32))
                .collect(),
        )
    }

    pub fn not_running() -> Self {
        let mut window = Self::new(Vec::new());
        window.running = false;
        window
    }

    /// The capture with this 1-based ordinal produces a zero-length file.
    pub fn empty_capture_at(mut self, ordinal: usize) -> Self {
        self.empty_capture_at = Some(ordinal);
        self
    }

    /// The advance with this 1-based ordinal fails.
    pub fn failing_advance_at(mut self, ordinal: usize) -> Self {
        self.failing_advance_at = Some(ordinal);
        self
    }

    /// Runs `hook` with the capture ordinal after every written capture.
    pub fn on_capture(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_capture = Some(Box::new(hook));
        self
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WindowController for ScriptedWindow {
    fn app_name(&self) -> &str {
        "Scripted Reader"
    }

    async fn locate(&self) -> Result<WindowBounds> {
        if !self.running {
            return Err(UnkindleError::TargetNotRunning {
                app: self.app_name().to_string(),
            });
        }
        Ok(Self::BOUNDS)
    }

    async fn foreground(&self) -> Result<()> {
        Ok(())
    }

    async fn capture_region(&self, _bounds: &WindowBounds, destination: &Path) -> Result<()> {
        let ordinal = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = if self.empty_capture_at == Some(ordinal) {
            Vec::new()
        } else {
            let position = *self.position.lock().unwrap();
            self.screens[position].clone()
        };

        tokio::fs::write(destination, bytes).await?;

        if let Some(hook) = &self.on_capture {
            hook(ordinal);
        }
        Ok(())
    }

    async fn send_advance_key(&self) -> Result<()> {
        let ordinal = self.advances.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_advance_at == Some(ordinal) {
            return Err(UnkindleError::NavigationFailed {
                reason: "key injection refused".to_string(),
            });
        }

        let mut position = self.position.lock().unwrap();
        if *position + 1 < self.screens.len() {
            *position += 1;
        }
        Ok(())
    }
}
