mod settings;

pub use settings::{DEFAULT_SETTINGS_FILE_NAME, Settings, SettingsError};
