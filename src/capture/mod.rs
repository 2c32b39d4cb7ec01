mod screen;

pub use screen::ScreenCapture;

use anyhow::Result;
use image::RgbaImage;

/// A source of screen frames. Implementors are moved onto the session's
/// worker thread, so they must be `Send`.
pub trait Capture: Send {
    fn capture(&self) -> Result<RgbaImage>;
}

#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}
