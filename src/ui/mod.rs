pub mod style;
pub mod views;

use iced::{Element, Task, Theme};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{MonitorInfo, ScreenCapture};
use crate::config::{Config, MAX_FPS, MIN_FPS};
use crate::recording::{
    FfmpegBackend, MediaBackend, RecordError, RecordingSession, RecordingSettings,
    RecordingState, SessionEvent,
};

use self::style::MonochromeTheme;

#[derive(Debug, Clone)]
pub enum Message {
    StartRecording,
    SavePathChosen(Option<PathBuf>),
    StopRecording,
    OpenSettings,
    CloseSettings,
    SettingChanged(SettingChange),
    Tick,
    DialogClosed,
}

#[derive(Debug, Clone)]
pub enum SettingChange {
    Fps(u32),
    RecordAudio(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogLevel {
    Info,
    Warning,
    Error,
}

pub struct App {
    config: Config,
    theme: MonochromeTheme,
    view: View,
    session: RecordingSession,
    monitor: Option<MonitorInfo>,
    last_output: Option<PathBuf>,
    settings_state: views::SettingsState,
}

impl App {
    pub fn new(config: Config, ffmpeg: PathBuf) -> (Self, Task<Message>) {
        let theme = match config.ui.theme {
            crate::config::Theme::Dark => MonochromeTheme::dark(),
            crate::config::Theme::Light => MonochromeTheme::light(),
        };

        let backend: Arc<dyn MediaBackend> =
            Arc::new(FfmpegBackend::new(ffmpeg, config.encoder.preset));

        let monitor = match ScreenCapture::new().monitor_info() {
            Ok(info) => {
                tracing::info!("Recording monitor {} ({}x{})", info.name, info.width, info.height);
                Some(info)
            }
            Err(e) => {
                tracing::warn!("Could not query monitors: {}", e);
                None
            }
        };

        let settings_state = views::SettingsState::from_config(&config);

        let app = Self {
            config,
            theme,
            view: View::Main,
            session: RecordingSession::new(backend),
            monitor,
            last_output: None,
            settings_state,
        };

        (app, Task::none())
    }

    pub fn title(&self) -> String {
        match (self.view, self.session.state()) {
            (View::Settings, _) => String::from("recscr - Settings"),
            (_, RecordingState::Recording) => String::from("recscr - Recording"),
            (_, RecordingState::Finalizing) => String::from("recscr - Saving"),
            (_, RecordingState::Idle) => String::from("recscr"),
        }
    }

    pub fn theme(&self) -> Theme {
        if self.theme.is_dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::StartRecording => {
                if self.session.state() != RecordingState::Idle {
                    return Self::report(&RecordError::AlreadyActive);
                }
                let file_name = self.config.generate_filename();
                let directory = self.config.recording.output_directory.clone();
                return Task::perform(
                    async move {
                        let dialog = rfd::AsyncFileDialog::new()
                            .set_title("Save Recording As")
                            .add_filter("MP4 video", &["mp4"])
                            .add_filter("AVI video", &["avi"])
                            .set_directory(directory)
                            .set_file_name(file_name);
                        dialog.save_file().await.map(|h| h.path().to_path_buf())
                    },
                    Message::SavePathChosen,
                );
            }
            Message::SavePathChosen(path_opt) => {
                let output = match path_opt.map(normalize_output_path) {
                    Some(Ok(path)) => Some(path),
                    Some(Err(e)) => {
                        return show_dialog(DialogLevel::Error, "Invalid Location", e);
                    }
                    None => None,
                };
                return self.start_recording(output);
            }
            Message::StopRecording => {
                if self.session.stop() {
                    tracing::info!("Recording stopped by user; finalizing");
                }
            }
            Message::OpenSettings => {
                self.settings_state = views::SettingsState::from_config(&self.config);
                self.view = View::Settings;
            }
            Message::CloseSettings => {
                self.view = View::Main;
            }
            Message::SettingChanged(change) => {
                self.apply_setting_change(change);
            }
            Message::Tick => {
                let tasks: Vec<Task<Message>> = self
                    .session
                    .poll_events()
                    .into_iter()
                    .map(|event| self.handle_session_event(event))
                    .collect();
                return Task::batch(tasks);
            }
            Message::DialogClosed => {}
        }
        Task::none()
    }

    fn start_recording(&mut self, output: Option<PathBuf>) -> Task<Message> {
        let source = match &self.monitor {
            Some(info) => ScreenCapture::with_monitor(info.id),
            None => ScreenCapture::primary().unwrap_or_default(),
        };
        let settings = RecordingSettings::from_config(&self.config);

        match self.session.start(Box::new(source), output, &settings) {
            Ok(()) => Task::none(),
            Err(RecordError::NoOutputPath) => {
                tracing::debug!("Save dialog dismissed; recording not started");
                Task::none()
            }
            Err(e) => {
                tracing::error!("Could not start recording: {}", e);
                Self::report(&e)
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) -> Task<Message> {
        match event {
            SessionEvent::CaptureFailed(e) => Self::report(&e),
            SessionEvent::Finished { path, .. } => {
                let body = format!("Recording saved as:\n{}", path.display());
                self.last_output = Some(path);
                show_dialog(DialogLevel::Info, "Done", body)
            }
            SessionEvent::Failed(e) => Self::report(&e),
        }
    }

    fn report(err: &RecordError) -> Task<Message> {
        let level = if err.is_warning() {
            DialogLevel::Warning
        } else {
            DialogLevel::Error
        };
        show_dialog(level, err.dialog_title(), err.to_string())
    }

    fn apply_setting_change(&mut self, change: SettingChange) {
        match change {
            SettingChange::Fps(fps) => {
                self.config.recording.fps = fps.clamp(MIN_FPS, MAX_FPS);
            }
            SettingChange::RecordAudio(enabled) => {
                self.config.audio.enabled = enabled;
            }
        }
        self.settings_state = views::SettingsState::from_config(&self.config);
    }

    pub fn view(&self) -> Element<'_, Message> {
        match self.view {
            View::Main => views::MainView::view(
                &self.theme,
                views::StatusLine {
                    state: self.session.state(),
                    elapsed: self.session.elapsed(),
                    frames: self.session.frame_count(),
                    fps: self.config.recording.fps,
                    record_audio: self.config.audio.enabled,
                },
                self.monitor.as_ref(),
                self.last_output.as_deref(),
            ),
            View::Settings => views::SettingsView::view(&self.theme, &self.settings_state),
        }
    }

    pub fn subscription(&self) -> iced::Subscription<Message> {
        iced::time::every(Duration::from_millis(100)).map(|_| Message::Tick)
    }
}

/// Opens a modal message box and resolves once it is dismissed.
pub fn show_dialog(level: DialogLevel, title: &str, body: String) -> Task<Message> {
    let level = match level {
        DialogLevel::Info => rfd::MessageLevel::Info,
        DialogLevel::Warning => rfd::MessageLevel::Warning,
        DialogLevel::Error => rfd::MessageLevel::Error,
    };
    let title = title.to_string();
    Task::perform(
        async move {
            rfd::AsyncMessageDialog::new()
                .set_level(level)
                .set_title(title)
                .set_description(body)
                .set_buttons(rfd::MessageButtons::Ok)
                .show()
                .await
        },
        |_| Message::DialogClosed,
    )
}

/// Checks a path returned by the save dialog and appends `.mp4` when it does
/// not already end in a video extension.
pub fn normalize_output_path(path: PathBuf) -> Result<PathBuf, String> {
    validate_save_path(&path)?;
    let has_video_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4") || e.eq_ignore_ascii_case("avi"));
    if has_video_ext {
        Ok(path)
    } else {
        let mut name = path.into_os_string();
        name.push(".mp4");
        Ok(PathBuf::from(name))
    }
}

fn validate_save_path(path: &Path) -> Result<(), String> {
    if path.file_name().is_none() {
        return Err("No file name given".to_string());
    }

    if path.components().any(|c| c == Component::ParentDir) {
        return Err("Path contains directory traversal".to_string());
    }

    #[cfg(windows)]
    {
        let path_str = path.to_string_lossy();
        if path_str.starts_with("\\\\") {
            return Err("Network paths are not allowed".to_string());
        }

        let dangerous_prefixes = ["C:\\Windows", "C:\\Program Files", "C:\\System"];
        let path_lower = path_str.to_lowercase();
        for prefix in &dangerous_prefixes {
            if path_lower.starts_with(&prefix.to_lowercase()) {
                return Err("Cannot save to system directories".to_string());
            }
        }
    }

    #[cfg(unix)]
    {
        let dangerous_prefixes = ["/bin", "/sbin", "/usr/bin", "/usr/sbin", "/etc", "/boot"];
        for prefix in &dangerous_prefixes {
            if path.starts_with(prefix) {
                return Err("Cannot save to system directories".to_string());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_extension_becomes_mp4() {
        let path = normalize_output_path(PathBuf::from("/tmp/clip")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/clip.mp4"));
    }

    #[test]
    fn test_avi_extension_kept() {
        let path = normalize_output_path(PathBuf::from("/tmp/clip.AVI")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/clip.AVI"));
    }

    #[test]
    fn test_other_extension_is_kept() {
        let path = normalize_output_path(PathBuf::from("/tmp/clip.v2")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/clip.v2.mp4"));
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(normalize_output_path(PathBuf::from("/tmp/../etc/clip.mp4")).is_err());
    }

    #[test]
    fn test_double_dot_in_name_allowed() {
        let path = normalize_output_path(PathBuf::from("/tmp/take..1.mp4")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/take..1.mp4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_dir_rejected() {
        assert!(normalize_output_path(PathBuf::from("/etc/clip.mp4")).is_err());
        assert!(normalize_output_path(PathBuf::from("/etcetera/clip.mp4")).is_ok());
    }
}
