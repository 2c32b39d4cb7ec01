use anyhow::{anyhow, Result};
use image::RgbaImage;
use xcap::Monitor;

use super::{Capture, MonitorInfo};

const MAX_CAPTURE_DIMENSION: u32 = 16384;

/// Grabs the full area of one monitor. The monitor is looked up by id on
/// every grab because xcap handles are not `Send` on every platform.
pub struct ScreenCapture {
    monitor_id: Option<u32>,
}

impl ScreenCapture {
    pub fn new() -> Self {
        Self { monitor_id: None }
    }

    pub fn with_monitor(monitor_id: u32) -> Self {
        Self {
            monitor_id: Some(monitor_id),
        }
    }

    pub fn primary() -> Result<Self> {
        let monitors = Monitor::all()?;
        let primary = monitors
            .into_iter()
            .find(|m| m.is_primary())
            .ok_or_else(|| anyhow!("No primary monitor found"))?;
        Ok(Self {
            monitor_id: Some(primary.id()),
        })
    }

    fn find_monitor(&self) -> Result<Monitor> {
        let monitors = Monitor::all()?;

        match self.monitor_id {
            Some(id) => monitors
                .into_iter()
                .find(|m| m.id() == id)
                .ok_or_else(|| anyhow!("Monitor {} not found", id)),
            None => {
                let mut iter = monitors.into_iter();
                let mut first = None;
                for m in iter.by_ref() {
                    if m.is_primary() {
                        return Ok(m);
                    }
                    if first.is_none() {
                        first = Some(m);
                    }
                }
                first.ok_or_else(|| anyhow!("No monitors found"))
            }
        }
    }

    pub fn monitor_info(&self) -> Result<MonitorInfo> {
        let monitor = self.find_monitor()?;
        Ok(MonitorInfo {
            id: monitor.id(),
            name: monitor.name().to_string(),
            width: monitor.width(),
            height: monitor.height(),
        })
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture for ScreenCapture {
    fn capture(&self) -> Result<RgbaImage> {
        let monitor = self.find_monitor()?;
        let img = monitor.capture_image()?;

        if img.width() > MAX_CAPTURE_DIMENSION || img.height() > MAX_CAPTURE_DIMENSION {
            return Err(anyhow!("Captured image dimensions exceed safety limit"));
        }
        if img.width() == 0 || img.height() == 0 {
            return Err(anyhow!("Captured image has zero dimension"));
        }

        Ok(img)
    }
}
