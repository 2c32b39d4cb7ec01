use iced::widget::{button, column, container, horizontal_space, row, text};
use iced::{Alignment, Border, Color, Element, Length};
use std::path::Path;
use std::time::Duration;

use crate::capture::MonitorInfo;
use crate::recording::RecordingState;
use crate::ui::style::{
    primary_button_style, record_button_style, status_color, tile_button_style, MonochromeTheme,
};
use crate::ui::Message;

/// Snapshot of the session shown in the status area.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    pub state: RecordingState,
    pub elapsed: Option<Duration>,
    pub frames: u64,
    pub fps: u32,
    pub record_audio: bool,
}

impl StatusLine {
    fn label(&self) -> String {
        match self.state {
            RecordingState::Idle => "Idle".to_string(),
            RecordingState::Recording => {
                let secs = self.elapsed.map(|d| d.as_secs()).unwrap_or(0);
                format!(
                    "Recording {:02}:{:02}  ({} frames)",
                    secs / 60,
                    secs % 60,
                    self.frames
                )
            }
            RecordingState::Finalizing => "Saving...".to_string(),
        }
    }
}

pub struct MainView;

impl MainView {
    pub fn view<'a>(
        theme: &MonochromeTheme,
        status: StatusLine,
        monitor: Option<&MonitorInfo>,
        last_output: Option<&'a Path>,
    ) -> Element<'a, Message> {
        let title = text("Screen Recorder").size(20);

        let status_color = status_color(status.state);
        let status_text = text(status.label()).size(14).color(status_color);

        let details = text(format!(
            "{} fps, microphone {}{}",
            status.fps,
            if status.record_audio { "on" } else { "off" },
            monitor
                .map(|m| format!(", {} ({}x{})", m.name, m.width, m.height))
                .unwrap_or_default()
        ))
        .size(11);

        let idle = status.state == RecordingState::Idle;
        let recording = status.state == RecordingState::Recording;

        let start_style = primary_button_style(theme);
        let start_btn = button(text("Start Recording").size(13))
            .width(Length::Fill)
            .padding([8, 16])
            .style(move |_t, _s| start_style)
            .on_press_maybe(idle.then_some(Message::StartRecording));

        let stop_style = record_button_style(theme);
        let stop_btn = button(text("Stop Recording").size(13))
            .width(Length::Fill)
            .padding([8, 16])
            .style(move |_t, _s| stop_style)
            .on_press_maybe(recording.then_some(Message::StopRecording));

        let settings_style = tile_button_style(theme);
        let settings_btn = button(text("[=]").size(11))
            .padding([4, 8])
            .style(move |_t, _s| settings_style)
            .on_press_maybe(idle.then_some(Message::OpenSettings));

        let header = row![title, horizontal_space(), settings_btn]
            .spacing(8)
            .align_y(Alignment::Center);

        let mut content = column![header, status_text, details, start_btn, stop_btn]
            .spacing(10)
            .padding(16);

        if let Some(path) = last_output {
            content = content.push(text(format!("Last: {}", path.display())).size(11));
        }

        let surface = theme.surface();
        let border_color = if theme.is_dark {
            Color::from_rgb(0.3, 0.3, 0.3)
        } else {
            Color::from_rgb(0.7, 0.7, 0.7)
        };

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(move |_| container::Style {
                background: Some(iced::Background::Color(surface)),
                border: Border {
                    color: border_color,
                    width: 1.0,
                    radius: 8.0.into(),
                },
                ..Default::default()
            })
            .into()
    }
}
