// src/lib.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

// --- Declare modules ---
mod config;
pub mod controller;
pub mod store;
pub mod validation;
pub mod workout;

// --- Expose public types ---
pub use config::{
    check_zoom_level, color_names, get_config_path as get_config_path_util,
    load as load_config_util, parse_color, save as save_config_util, Config, ConfigError,
    StandardColor, Theme,
};
pub use controller::{
    Action, ControllerError, Effect, FormMode, FormPrefill, SortKey, SortState,
    WorkoutController, DEFAULT_MAP_ZOOM,
};
pub use store::{
    get_db_path as get_db_path_util, KeyValueStore, MemoryStore, Persistence, PersistenceError,
    SqliteStore, StoredWorkout, DEFAULT_STORAGE_KEY,
};
pub use validation::{validate, ActivityFields, Field, RawFields, ValidatedFields, ValidationError};
pub use workout::{create_workout, Activity, ActivityType, Coords, Workout, WorkoutId};

/// Configuration plus a controller backed by the on-disk store.
pub struct AppService {
    pub config: Config,
    pub controller: WorkoutController<SqliteStore>,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or opening fails.
    /// Unreadable workout data is not an error; it loads as an empty collection.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = store::get_db_path().context("Failed to determine database path")?;
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        Ok(Self::from_parts(config, config_path, db_path, store))
    }

    /// Builds the service from already opened parts.
    pub fn from_parts(
        config: Config,
        config_path: PathBuf,
        db_path: PathBuf,
        store: SqliteStore,
    ) -> Self {
        let persistence = Persistence::new(store, config.storage_key.clone());
        let controller =
            WorkoutController::initialize(persistence).with_zoom(config.map_zoom_level);
        Self {
            config,
            controller,
            db_path,
            config_path,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Sets the zoom used for map focus requests.
    /// # Errors
    /// - `ConfigError::InvalidZoomLevel` if `zoom` is outside `1..=19`.
    /// - `ConfigError` variants if saving fails.
    pub fn set_map_zoom_level(&mut self, zoom: u8) -> Result<(), ConfigError> {
        self.config.map_zoom_level = check_zoom_level(zoom)?;
        self.controller.set_zoom(zoom);
        self.save_config()
    }

    /// Sets the list header color.
    /// # Errors
    /// - `ConfigError::InvalidColor` if the name is unknown.
    /// - `ConfigError` variants if saving fails.
    pub fn set_header_color(&mut self, color: &str) -> Result<(), ConfigError> {
        let parsed = parse_color(color)?;
        self.config.theme.header_color = format!("{parsed:?}");
        self.save_config()
    }

    /// Looks up a workout by id.
    /// # Errors
    /// Returns `ControllerError::NotFound` if no workout has this id.
    pub fn require_workout(&self, id: &WorkoutId) -> Result<&Workout, ControllerError> {
        self.controller
            .find(id)
            .ok_or_else(|| ControllerError::NotFound(id.clone()))
    }
}
