use iced::widget::button;
use iced::{Border, Color};

use crate::recording::RecordingState;

pub const BACKGROUND_DARK: Color = Color::from_rgb(0.1, 0.1, 0.1);
pub const BACKGROUND_LIGHT: Color = Color::from_rgb(0.95, 0.95, 0.95);
pub const SURFACE_DARK: Color = Color::from_rgb(0.15, 0.15, 0.15);
pub const SURFACE_LIGHT: Color = Color::from_rgb(0.9, 0.9, 0.9);
pub const TILE_DARK: Color = Color::from_rgb(0.2, 0.2, 0.2);
pub const TILE_LIGHT: Color = Color::from_rgb(0.85, 0.85, 0.85);
pub const ACCENT_DARK: Color = Color::from_rgb(0.4, 0.4, 0.4);
pub const ACCENT_LIGHT: Color = Color::from_rgb(0.3, 0.3, 0.3);
pub const TEXT_DARK: Color = Color::from_rgb(0.9, 0.9, 0.9);
pub const TEXT_LIGHT: Color = Color::from_rgb(0.1, 0.1, 0.1);
pub const RECORD_RED: Color = Color::from_rgb(0.8, 0.2, 0.2);
pub const IDLE_GREEN: Color = Color::from_rgb(0.3, 0.7, 0.3);
pub const SAVING_AMBER: Color = Color::from_rgb(0.85, 0.6, 0.2);
pub const BORDER_RADIUS: f32 = 12.0;
pub const SMALL_RADIUS: f32 = 8.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonochromeTheme {
    pub is_dark: bool,
}

impl MonochromeTheme {
    pub fn dark() -> Self {
        Self { is_dark: true }
    }

    pub fn light() -> Self {
        Self { is_dark: false }
    }

    pub fn background(&self) -> Color {
        if self.is_dark {
            BACKGROUND_DARK
        } else {
            BACKGROUND_LIGHT
        }
    }

    pub fn surface(&self) -> Color {
        if self.is_dark {
            SURFACE_DARK
        } else {
            SURFACE_LIGHT
        }
    }

    pub fn tile(&self) -> Color {
        if self.is_dark {
            TILE_DARK
        } else {
            TILE_LIGHT
        }
    }

    pub fn accent(&self) -> Color {
        if self.is_dark {
            ACCENT_DARK
        } else {
            ACCENT_LIGHT
        }
    }

    pub fn text(&self) -> Color {
        if self.is_dark {
            TEXT_DARK
        } else {
            TEXT_LIGHT
        }
    }
}

pub fn status_color(state: RecordingState) -> Color {
    match state {
        RecordingState::Idle => IDLE_GREEN,
        RecordingState::Recording => RECORD_RED,
        RecordingState::Finalizing => SAVING_AMBER,
    }
}

pub fn tile_button_style(theme: &MonochromeTheme) -> button::Style {
    let bg = theme.tile();
    let text = theme.text();

    button::Style {
        background: Some(iced::Background::Color(bg)),
        text_color: text,
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius: BORDER_RADIUS.into(),
        },
        shadow: iced::Shadow::default(),
    }
}

pub fn primary_button_style(theme: &MonochromeTheme) -> button::Style {
    let bg = theme.accent();
    let text = if theme.is_dark {
        TEXT_DARK
    } else {
        Color::WHITE
    };

    button::Style {
        background: Some(iced::Background::Color(bg)),
        text_color: text,
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius: SMALL_RADIUS.into(),
        },
        shadow: iced::Shadow::default(),
    }
}

pub fn record_button_style(theme: &MonochromeTheme) -> button::Style {
    button::Style {
        background: Some(iced::Background::Color(RECORD_RED)),
        text_color: if theme.is_dark { TEXT_DARK } else { Color::WHITE },
        border: Border {
            color: Color::TRANSPARENT,
            width: 0.0,
            radius: SMALL_RADIUS.into(),
        },
        shadow: iced::Shadow::default(),
    }
}
