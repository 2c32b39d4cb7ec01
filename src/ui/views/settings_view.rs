use iced::{
    widget::{button, column, container, horizontal_space, row, slider, text, toggler},
    Alignment, Element, Length,
};

use crate::config::{Config, MAX_FPS, MIN_FPS};
use crate::ui::style::MonochromeTheme;
use crate::ui::{Message, SettingChange};

#[derive(Debug, Clone)]
pub struct SettingsState {
    pub fps: u32,
    pub record_audio: bool,
}

impl SettingsState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fps: config.recording.fps,
            record_audio: config.audio.enabled,
        }
    }
}

pub struct SettingsView;

impl SettingsView {
    pub fn view<'a>(theme: &'a MonochromeTheme, state: &'a SettingsState) -> Element<'a, Message> {
        let title = text("Settings").size(20);

        let recording_section = column![
            text("Recording").size(15),
            row![
                text(format!("Frame rate: {}", state.fps)).width(Length::Fixed(110.0)),
                slider(MIN_FPS as u8..=MAX_FPS as u8, state.fps as u8, |fps| {
                    Message::SettingChanged(SettingChange::Fps(fps as u32))
                })
                .width(Length::Fill),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            row![
                text("Microphone:").width(Length::Fixed(110.0)),
                toggler(state.record_audio)
                    .on_toggle(|v| Message::SettingChanged(SettingChange::RecordAudio(v))),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            text("Changes apply to the next recording and reset on restart.").size(11),
        ]
        .spacing(10);

        let close_button = button(text("Close"))
            .padding([8, 16])
            .on_press(Message::CloseSettings);

        let content = column![title, recording_section, row![horizontal_space(), close_button]]
            .spacing(14)
            .padding(16)
            .width(Length::Fill);

        let bg = theme.background();
        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .style(move |_t| container::Style {
                background: Some(iced::Background::Color(bg)),
                ..Default::default()
            })
            .into()
    }
}
