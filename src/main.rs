#![windows_subsystem = "windows"]

mod capture;
mod config;
mod recording;
mod ui;

use iced::{window, Size};
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring unreadable config file: {}", e);
            config::Config::default()
        }
    };

    let ffmpeg = match recording::locate_ffmpeg(config.encoder.ffmpeg_path.as_deref()) {
        Ok(path) => {
            tracing::info!("Using ffmpeg at {}", path.display());
            path
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    iced::application(ui::App::title, ui::App::update, ui::App::view)
        .subscription(ui::App::subscription)
        .theme(ui::App::theme)
        .window(window::Settings {
            size: Size::new(360.0, 260.0),
            min_size: Some(Size::new(320.0, 220.0)),
            resizable: true,
            decorations: true,
            ..Default::default()
        })
        .run_with(move || ui::App::new(config, ffmpeg))
}
