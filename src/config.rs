//src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString};
use thiserror::Error;
use tracing::warn;

use crate::controller::DEFAULT_MAP_ZOOM;
use crate::store::DEFAULT_STORAGE_KEY;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "workout-map";
const CONFIG_ENV_VAR: &str = "WORKOUT_MAP_CONFIG_DIR"; // Environment variable name
const MAX_ZOOM: u8 = 19; // Deepest zoom of the usual OSM tile servers

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Map zoom level must be between 1 and 19, got {0}.")]
    InvalidZoomLevel(u8),
}

// Colors accepted for the list header; names match comfy_table's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    DarkRed,
    DarkGreen,
    DarkYellow,
    DarkBlue,
    DarkMagenta,
    DarkCyan,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Self::Black,
            StandardColor::Red => Self::Red,
            StandardColor::Green => Self::Green,
            StandardColor::Yellow => Self::Yellow,
            StandardColor::Blue => Self::Blue,
            StandardColor::Magenta => Self::Magenta,
            StandardColor::Cyan => Self::Cyan,
            StandardColor::White => Self::White,
            StandardColor::DarkGrey => Self::DarkGrey,
            StandardColor::DarkRed => Self::DarkRed,
            StandardColor::DarkGreen => Self::DarkGreen,
            StandardColor::DarkYellow => Self::DarkYellow,
            StandardColor::DarkBlue => Self::DarkBlue,
            StandardColor::DarkMagenta => Self::DarkMagenta,
            StandardColor::DarkCyan => Self::DarkCyan,
            StandardColor::Grey => Self::Grey,
        }
    }
}

/// Parses a color name case-insensitively ("green", "DarkBlue").
/// # Errors
/// Returns `ConfigError::InvalidColor` for unknown names.
pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    color_str
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidColor(color_str.to_string()))
}

/// Names of every accepted color, for help output.
pub fn color_names() -> Vec<String> {
    StandardColor::iter().map(|c| format!("{c:?}")).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub header_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header_color: "Green".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)] // Missing fields fall back to defaults
pub struct Config {
    /// Zoom used when focusing the map on a workout.
    pub map_zoom_level: u8,
    /// Name of the durable record holding all workouts.
    pub storage_key: String,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_zoom_level: DEFAULT_MAP_ZOOM,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            theme: Theme::default(),
        }
    }
}

impl Config {
    /// Header color from the theme, falling back to green for unknown names.
    pub fn header_color(&self) -> Color {
        parse_color(&self.theme.header_color).map_or(Color::Green, Color::from)
    }
}

/// Checks a zoom level before it is stored.
/// # Errors
/// Returns `ConfigError::InvalidZoomLevel` outside `1..=19`.
pub fn check_zoom_level(zoom: u8) -> Result<u8, ConfigError> {
    if zoom == 0 || zoom > MAX_ZOOM {
        Err(ConfigError::InvalidZoomLevel(zoom))
    } else {
        Ok(zoom)
    }
}

/// Determines the path to the configuration file, creating its directory.
/// # Errors
/// Returns `ConfigError` if no config directory exists or it cannot be created.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = if let Ok(path_str) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            warn!(
                var = CONFIG_ENV_VAR,
                path = %path.display(),
                "Config directory override does not exist, creating it"
            );
        }
        path
    } else {
        dirs::config_dir()
            .ok_or(ConfigError::CannotDetermineConfigDir)?
            .join(APP_CONFIG_DIR)
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration, writing the defaults if the file is missing.
/// # Errors
/// Returns `ConfigError` on I/O or TOML errors.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        if check_zoom_level(config.map_zoom_level).is_err() {
            warn!(zoom = config.map_zoom_level, "Ignoring invalid map zoom level");
            return Ok(Config {
                map_zoom_level: DEFAULT_MAP_ZOOM,
                ..config
            });
        }
        Ok(config)
    } else {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        Ok(default_config)
    }
}

/// Saves the configuration to the TOML file.
/// # Errors
/// Returns `ConfigError` on I/O or TOML errors.
pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str("map_zoom_level = 15\n").unwrap();
        assert_eq!(config.map_zoom_level, 15);
        assert_eq!(config.storage_key, "workouts");
        assert_eq!(config.theme.header_color, "Green");
    }

    #[test]
    fn toml_round_trip() {
        let config = Config {
            map_zoom_level: 11,
            storage_key: "my-workouts".into(),
            theme: Theme {
                header_color: "Cyan".into(),
            },
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn colors_parse_case_insensitively() {
        assert_eq!(parse_color("darkblue").unwrap(), StandardColor::DarkBlue);
        assert_eq!(parse_color(" Green ").unwrap(), StandardColor::Green);
        assert!(matches!(
            parse_color("mauve"),
            Err(ConfigError::InvalidColor(c)) if c == "mauve"
        ));
        assert_eq!(color_names().len(), 16);
    }

    #[test]
    fn unknown_header_color_falls_back_to_green() {
        let mut config = Config::default();
        config.theme.header_color = "nope".into();
        assert_eq!(config.header_color(), Color::Green);
        config.theme.header_color = "red".into();
        assert_eq!(config.header_color(), Color::Red);
    }

    #[test]
    fn zoom_level_bounds() {
        assert!(check_zoom_level(0).is_err());
        assert_eq!(check_zoom_level(13).unwrap(), 13);
        assert!(check_zoom_level(20).is_err());
    }
}
