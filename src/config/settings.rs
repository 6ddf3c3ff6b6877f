use std::{
    borrow::Cow,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use crate::ext::BestEffortPathExt;

pub const DEFAULT_SETTINGS_FILE_NAME: &str = "treestat.yaml";

const DEFAULT_REPORT_DEPTH: u32 = 1;

/// Settings read from the YAML settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Worker threads listing directories. `None` means one per core.
    pub workers: Option<NonZeroUsize>,
    /// How many directory levels below the root the report shows.
    pub depth: u32,
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: None,
            depth: DEFAULT_REPORT_DEPTH,
            color: true,
        }
    }
}

impl Settings {
    /// Reads `path`, or the default file in the current directory.
    ///
    /// Only an explicitly named file has to exist.
    pub async fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_path(path).await,
            None => {
                let default_path = PathBuf::from(DEFAULT_SETTINGS_FILE_NAME);
                if default_path.exists() {
                    Self::from_path(&default_path).await
                } else {
                    debug!("No settings file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, SettingsError> {
        debug!("Reading settings file: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        let contents = String::from_utf8(bytes).context(Utf8Snafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }

    fn parse_top_level(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        for (key, value) in top_level {
            let Yaml::Value(Scalar::String(key)) = key else {
                debug!("Skipping non-string settings key: {:?}", key);
                continue;
            };

            match &**key {
                "workers" => {
                    let workers = Self::expect_integer(key, value)?;
                    settings.workers = usize::try_from(workers)
                        .ok()
                        .and_then(NonZeroUsize::new)
                        .map(Some)
                        .context(InvalidValueSnafu {
                            key: key.to_string(),
                            expected: "a positive integer",
                        })?;
                }
                "depth" => {
                    let depth = Self::expect_integer(key, value)?;
                    settings.depth = u32::try_from(depth).ok().context(InvalidValueSnafu {
                        key: key.to_string(),
                        expected: "a non-negative integer",
                    })?;
                }
                "color" => {
                    settings.color = match value {
                        Yaml::Value(Scalar::Boolean(color)) => *color,
                        _ => {
                            return InvalidValueSnafu {
                                key: key.to_string(),
                                expected: "a boolean",
                            }
                            .fail();
                        }
                    };
                }
                other => debug!("Ignoring unknown settings key '{}'", other),
            }
        }

        Ok(settings)
    }

    fn expect_integer(key: &Cow<'_, str>, value: &Yaml) -> Result<i64, SettingsError> {
        match value {
            Yaml::Value(Scalar::Integer(number)) => Ok(*number),
            _ => InvalidValueSnafu {
                key: key.to_string(),
                expected: "an integer",
            }
            .fail(),
        }
    }
}

impl TryFrom<&str> for Settings {
    type Error = SettingsError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let Some(document) = documents.first() else {
            return Err(SettingsError::MalformedSettings);
        };

        match document {
            Yaml::Mapping(top_level) => Self::parse_top_level(top_level),
            // An empty document only holds a null.
            Yaml::Value(Scalar::Null) => Ok(Self::default()),
            _ => Err(SettingsError::TopLevelNotMap),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("Failed to read the settings file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Settings file {} is not valid UTF-8", file_path))]
    Utf8Error {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the settings file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted settings file"))]
    MalformedSettings,
    #[snafu(display("Top level of the settings file should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Setting '{}' should be {}", key, expected))]
    InvalidValueError { key: String, expected: &'static str },
}
