mod main_view;
mod settings_view;

pub use main_view::{MainView, StatusLine};
pub use settings_view::{SettingsState, SettingsView};
