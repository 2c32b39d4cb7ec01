use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const MIN_FPS: u32 = 10;
pub const MAX_FPS: u32 = 60;
const DEFAULT_FPS: u32 = 20;
const MAX_DURATION_SECS: u64 = 24 * 60 * 60;
const MIN_SAMPLE_RATE: u32 = 8000;
const MAX_SAMPLE_RATE: u32 = 192_000;
const MAX_CHANNELS: u16 = 8;
const MIN_QUEUE_CAPACITY: usize = 16;
const MAX_QUEUE_CAPACITY: usize = 65_536;
const MAX_FILENAME_TEMPLATE_LEN: usize = 128;
const DEFAULT_FILENAME_TEMPLATE: &str = "recording_%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub recording: RecordingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingConfig {
    pub fps: u32,
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
    pub output_directory: PathBuf,
    pub filename_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub queue_capacity: usize,
    pub intermediate_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44100,
            channels: 2,
            queue_capacity: 4096,
            intermediate_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub preset: EncoderPreset,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    Ultrafast,
    #[default]
    Veryfast,
    Medium,
}

impl EncoderPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderPreset::Ultrafast => "ultrafast",
            EncoderPreset::Veryfast => "veryfast",
            EncoderPreset::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiConfig {
    pub theme: Theme,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { theme: Theme::Dark }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.recording.fps < MIN_FPS || self.recording.fps > MAX_FPS {
            return Err(anyhow!("fps must be between {} and {}", MIN_FPS, MAX_FPS));
        }
        if let Some(secs) = self.recording.max_duration_secs {
            if secs == 0 || secs > MAX_DURATION_SECS {
                return Err(anyhow!("max_duration_secs must be between 1 and {}", MAX_DURATION_SECS));
            }
        }
        if self.recording.filename_template.len() > MAX_FILENAME_TEMPLATE_LEN {
            return Err(anyhow!("filename_template too long"));
        }
        if self.recording.filename_template.contains('/')
            || self.recording.filename_template.contains('\\')
            || self.recording.filename_template.contains("..")
        {
            return Err(anyhow!("filename_template contains invalid path characters"));
        }
        if self.audio.sample_rate < MIN_SAMPLE_RATE || self.audio.sample_rate > MAX_SAMPLE_RATE {
            return Err(anyhow!(
                "sample_rate must be between {} and {}",
                MIN_SAMPLE_RATE,
                MAX_SAMPLE_RATE
            ));
        }
        if self.audio.channels == 0 || self.audio.channels > MAX_CHANNELS {
            return Err(anyhow!("channels must be between 1 and {}", MAX_CHANNELS));
        }
        if self.audio.queue_capacity < MIN_QUEUE_CAPACITY
            || self.audio.queue_capacity > MAX_QUEUE_CAPACITY
        {
            return Err(anyhow!(
                "queue_capacity must be between {} and {}",
                MIN_QUEUE_CAPACITY,
                MAX_QUEUE_CAPACITY
            ));
        }
        if self.audio.intermediate_dir.as_os_str().is_empty() {
            return Err(anyhow!("intermediate_dir is empty"));
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.recording.fps = self.recording.fps.clamp(MIN_FPS, MAX_FPS);
        self.recording.max_duration_secs = self
            .recording
            .max_duration_secs
            .filter(|&s| s > 0)
            .map(|s| s.min(MAX_DURATION_SECS));
        self.audio.sample_rate = self.audio.sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        self.audio.channels = self.audio.channels.clamp(1, MAX_CHANNELS);
        self.audio.queue_capacity = self
            .audio
            .queue_capacity
            .clamp(MIN_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY);

        if self.recording.filename_template.is_empty()
            || self.recording.filename_template.len() > MAX_FILENAME_TEMPLATE_LEN
            || self.recording.filename_template.contains('/')
            || self.recording.filename_template.contains('\\')
            || self.recording.filename_template.contains("..")
        {
            self.recording.filename_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        }

        if self.audio.intermediate_dir.as_os_str().is_empty() {
            self.audio.intermediate_dir = PathBuf::from(".");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let videos_dir = directories::UserDirs::new()
            .and_then(|d| d.video_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            recording: RecordingConfig {
                fps: DEFAULT_FPS,
                max_duration_secs: None,
                output_directory: videos_dir,
                filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            },
            audio: AudioConfig::default(),
            encoder: EncoderConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "recscr", "recscr").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Loads the config file if one exists. Settings edited in the UI are
    /// never written back, so every run starts from these values.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                return Self::from_toml(&content);
            }
        }
        Ok(Config::default())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn generate_filename(&self) -> String {
        let now = chrono::Local::now();
        let formatted = now.format(&self.recording.filename_template).to_string();
        let sanitized: String = formatted
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .take(200)
            .collect();
        let safe_name = if sanitized.is_empty() {
            format!("recording_{}", now.timestamp())
        } else {
            sanitized
        };
        format!("{}.mp4", safe_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[recording]
fps = 30
output_directory = "/tmp/videos"
filename_template = "clip_%Y"
"#;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recording.fps, 20);
        assert!(config.recording.max_duration_secs.is_none());
        assert!(config.audio.enabled);
    }

    #[test]
    fn test_minimal_toml_fills_sections() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.encoder.preset, EncoderPreset::Veryfast);
        assert_eq!(config.ui.theme, Theme::Dark);
    }

    #[test]
    fn test_fps_is_clamped() {
        let content = MINIMAL.replace("fps = 30", "fps = 240");
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(config.recording.fps, MAX_FPS);

        let content = MINIMAL.replace("fps = 30", "fps = 1");
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(config.recording.fps, MIN_FPS);
    }

    #[test]
    fn test_bad_template_is_replaced() {
        let content = MINIMAL.replace("clip_%Y", "../escape");
        let config = Config::from_toml(&content).unwrap();
        assert_eq!(config.recording.filename_template, DEFAULT_FILENAME_TEMPLATE);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = format!("{}\nbogus = 1\n", MINIMAL);
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    fn test_zero_max_duration_means_unlimited() {
        let content = MINIMAL.replace("fps = 30", "fps = 30\nmax_duration_secs = 0");
        let config = Config::from_toml(&content).unwrap();
        assert!(config.recording.max_duration_secs.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_channels() {
        let mut config = Config::default();
        config.audio.channels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_filename_is_mp4() {
        let config = Config::default();
        let name = config.generate_filename();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".mp4"));
    }
}
