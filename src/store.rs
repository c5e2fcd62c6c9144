// src/store.rs
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::validation::check_values;
use crate::workout::{ActivityType, Coords, Workout, WorkoutId};

pub const DEFAULT_STORAGE_KEY: &str = "workouts";
const DB_FILE_NAME: &str = "workouts.sqlite";
const APP_DATA_DIR: &str = "workout-map";
const DATA_ENV_VAR: &str = "WORKOUT_MAP_DATA_DIR";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Stored workout has an unknown activity type: {0}")]
    UnknownType(String),
    #[error("Stored workout data is corrupt: {0}")]
    Corrupt(String),
    #[error("Failed to serialize workouts: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing storage file: {0}")]
    Io(#[from] std::io::Error),
}

/// A string-to-string store holding durable records, shaped like browser
/// local storage. Every `set` replaces the whole value in one step.
pub trait KeyValueStore {
    /// # Errors
    /// Returns `PersistenceError::Storage` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    /// # Errors
    /// Returns `PersistenceError::Storage` if the backend cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
    /// # Errors
    /// Returns `PersistenceError::Storage` if the backend cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), PersistenceError>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Key-value records kept in a single SQLite table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and its table.
    /// # Errors
    /// Returns `PersistenceError::Storage` if the file cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// # Errors
    /// Returns `PersistenceError::Storage` if the table cannot be created.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, creating the table if needed.
    /// # Errors
    /// Returns `PersistenceError::Storage` if the table cannot be created.
    pub fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        init(&conn)?;
        Ok(Self { conn })
    }
}

/// Creates the key-value table if it doesn't exist.
fn init(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Gets the path to the SQLite file within the app's data directory.
/// `WORKOUT_MAP_DATA_DIR` overrides the platform default.
/// # Errors
/// Returns `PersistenceError::DataDir` if no data directory can be found,
/// or `PersistenceError::Io` if it cannot be created.
pub fn get_db_path() -> Result<PathBuf, PersistenceError> {
    let app_dir = match std::env::var(DATA_ENV_VAR) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::data_dir()
            .ok_or(PersistenceError::DataDir)?
            .join(APP_DATA_DIR),
    };
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// One workout as it appears in the durable record.
/// Keys written by the older browser build (`type`, `date`, `clicks`) are
/// accepted when reading. When both `activityType` and `type` are present,
/// `activityType` wins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredWorkout {
    pub id: WorkoutId,
    #[serde(alias = "date")]
    pub created_at: DateTime<Utc>,
    pub coords: Coords,
    pub distance: f64,
    pub duration: f64,
    pub description: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing)]
    pub legacy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(alias = "clicks", default)]
    pub visit_count: u32,
}

impl From<&Workout> for StoredWorkout {
    fn from(w: &Workout) -> Self {
        Self {
            id: w.id().clone(),
            created_at: w.created_at(),
            coords: w.coords(),
            distance: w.distance(),
            duration: w.duration(),
            description: w.description().to_string(),
            activity_type: Some(w.activity_type().to_string()),
            legacy_type: None,
            cadence: w.cadence().map(f64::from),
            elevation_gain: w.elevation_gain(),
            pace: w.pace(),
            speed: w.speed(),
            visit_count: w.visit_count(),
        }
    }
}

impl TryFrom<StoredWorkout> for Workout {
    type Error = PersistenceError;

    fn try_from(raw: StoredWorkout) -> Result<Self, Self::Error> {
        let tag = raw
            .activity_type
            .or(raw.legacy_type)
            .ok_or_else(|| PersistenceError::UnknownType("<missing>".to_string()))?;
        let activity: ActivityType = tag
            .parse()
            .map_err(|_| PersistenceError::UnknownType(tag.clone()))?;
        let (specific, key) = match activity {
            ActivityType::Running => (raw.cadence, "cadence"),
            ActivityType::Cycling => (raw.elevation_gain, "elevationGain"),
        };
        let specific = specific.ok_or_else(|| {
            PersistenceError::Corrupt(format!("{activity} workout {} has no {key}", raw.id))
        })?;
        let fields = check_values(activity, raw.distance, raw.duration, specific)
            .map_err(|e| PersistenceError::Corrupt(format!("workout {}: {e}", raw.id)))?;

        Ok(Self::restore(
            raw.id,
            raw.created_at,
            raw.coords,
            &fields,
            raw.description,
            raw.visit_count,
        ))
    }
}

/// Writes the whole collection as one JSON record and reads it back into
/// typed workouts.
pub struct Persistence<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Serializes every workout and overwrites the durable record.
    /// # Errors
    /// Returns `PersistenceError` if serialization or the store write fails.
    pub fn save(&mut self, workouts: &[Workout]) -> Result<(), PersistenceError> {
        let records: Vec<StoredWorkout> = workouts.iter().map(StoredWorkout::from).collect();
        let json = serde_json::to_string(&records)?;
        self.store.set(&self.key, &json)?;
        debug!(count = records.len(), key = %self.key, "Saved workouts");
        Ok(())
    }

    /// Reads the durable record. A missing record is an empty collection.
    /// Entries with an unknown type or invalid values are skipped with a
    /// warning; the rest load in stored order.
    /// # Errors
    /// Returns `PersistenceError::Corrupt` if the record is not a JSON array,
    /// or `PersistenceError::Storage` if the store cannot be read.
    pub fn load(&self) -> Result<Vec<Workout>, PersistenceError> {
        let Some(json) = self.store.get(&self.key)? else {
            info!(key = %self.key, "No stored workouts");
            return Ok(Vec::new());
        };
        let entries: Vec<serde_json::Value> = serde_json::from_str(&json)
            .map_err(|e| PersistenceError::Corrupt(format!("record '{}': {e}", self.key)))?;

        let total = entries.len();
        let workouts: Vec<Workout> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match decode_entry(entry) {
                Ok(workout) => Some(workout),
                Err(e) => {
                    warn!(index, error = %e, "Skipping stored workout");
                    None
                }
            })
            .collect();
        info!(loaded = workouts.len(), skipped = total - workouts.len(), "Loaded workouts");
        Ok(workouts)
    }

    /// Deletes the durable record.
    /// # Errors
    /// Returns `PersistenceError::Storage` if the store cannot be written.
    pub fn reset(&mut self) -> Result<(), PersistenceError> {
        self.store.remove(&self.key)?;
        info!(key = %self.key, "Cleared stored workouts");
        Ok(())
    }
}

fn decode_entry(entry: serde_json::Value) -> Result<Workout, PersistenceError> {
    let raw: StoredWorkout =
        serde_json::from_value(entry).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    Workout::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ActivityFields, ValidatedFields};
    use crate::workout::create_workout;
    use chrono::TimeZone;

    fn sample() -> Vec<Workout> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let mut run = create_workout(
            "1714552200".into(),
            at,
            Coords::new(51.5, -0.1),
            &ValidatedFields {
                distance: 5.0,
                duration: 25.0,
                activity: ActivityFields::Running { cadence: 180 },
            },
        );
        run.visit();
        let ride = create_workout(
            "1714552201".into(),
            at,
            Coords::new(48.85, 2.35),
            &ValidatedFields {
                distance: 20.0,
                duration: 60.0,
                activity: ActivityFields::Cycling {
                    elevation_gain: 300.0,
                },
            },
        );
        vec![run, ride]
    }

    #[test]
    fn save_then_load_is_faithful() {
        let mut p = Persistence::new(MemoryStore::default(), DEFAULT_STORAGE_KEY);
        let workouts = sample();
        p.save(&workouts).unwrap();
        assert_eq!(p.load().unwrap(), workouts);
    }

    #[test]
    fn values_without_short_decimal_form_survive_reload() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let workouts: Vec<Workout> = (1..=500_u32)
            .map(|i| {
                let n = f64::from(i);
                let activity = if i % 2 == 0 {
                    ActivityFields::Running { cadence: 150 + i }
                } else {
                    ActivityFields::Cycling {
                        elevation_gain: n.sqrt() * 13.0 / 7.0,
                    }
                };
                create_workout(
                    WorkoutId::new(format!("{i:010}")),
                    at,
                    Coords::new(n / 3.0 - 80.0, -12.538567033333335 + n / 7.0),
                    &ValidatedFields {
                        distance: n.sqrt() / 3.0,
                        duration: n / 11.0 + 0.1,
                        activity,
                    },
                )
            })
            .collect();

        let mut p = Persistence::new(MemoryStore::default(), DEFAULT_STORAGE_KEY);
        p.save(&workouts).unwrap();
        assert_eq!(p.load().unwrap(), workouts);
    }

    #[test]
    fn activity_type_key_wins_over_legacy_type() {
        let mut store = MemoryStore::default();
        store
            .set(
                "workouts",
                r#"[{"id":"1","createdAt":"2024-01-02T10:00:00Z","coords":[1.0,2.0],
                    "distance":4.0,"duration":20.0,"description":"Running on January 2",
                    "activityType":"running","type":"cycling","cadence":170}]"#,
            )
            .unwrap();
        let loaded = Persistence::new(store, "workouts").load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].activity_type(), ActivityType::Running);
        assert_eq!(loaded[0].cadence(), Some(170));
    }

    #[test]
    fn legacy_type_key_is_not_written() {
        let json = serde_json::to_value(StoredWorkout::from(&sample()[0])).unwrap();
        assert_eq!(json["activityType"], "running");
        assert!(json.get("type").is_none());
    }

    #[test]
    fn sqlite_store_round_trips_and_overwrites() {
        let mut p = Persistence::new(SqliteStore::open_in_memory().unwrap(), "workouts");
        let workouts = sample();
        p.save(&workouts).unwrap();
        p.save(&workouts[..1]).unwrap();
        assert_eq!(p.load().unwrap(), workouts[..1].to_vec());
    }

    #[test]
    fn missing_record_loads_empty() {
        let p = Persistence::new(MemoryStore::default(), "workouts");
        assert!(p.load().unwrap().is_empty());
    }

    #[test]
    fn reset_removes_the_record() {
        let mut p = Persistence::new(SqliteStore::open_in_memory().unwrap(), "workouts");
        p.save(&sample()).unwrap();
        p.reset().unwrap();
        assert_eq!(p.store().get("workouts").unwrap(), None);
        assert!(p.load().unwrap().is_empty());
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let json = serde_json::to_value(StoredWorkout::from(&sample()[1])).unwrap();
        assert_eq!(json["activityType"], "cycling");
        assert_eq!(json["elevationGain"], 300.0);
        assert_eq!(json["speed"], 20.0);
        assert_eq!(json["coords"], serde_json::json!([48.85, 2.35]));
        assert_eq!(json["visitCount"], 0);
        assert!(json.get("cadence").is_none());
        assert!(json.get("pace").is_none());
    }

    #[test]
    fn description_is_restored_verbatim() {
        let mut store = MemoryStore::default();
        store
            .set(
                "workouts",
                r#"[{"id":"1","createdAt":"2024-01-02T10:00:00Z","coords":[1.0,2.0],
                    "distance":4.0,"duration":20.0,"description":"Morning jog",
                    "activityType":"running","cadence":170,"pace":5.0,"visitCount":3}]"#,
            )
            .unwrap();
        let loaded = Persistence::new(store, "workouts").load().unwrap();
        assert_eq!(loaded[0].description(), "Morning jog");
        assert_eq!(loaded[0].visit_count(), 3);
        assert_eq!(loaded[0].pace(), Some(5.0));
    }

    #[test]
    fn legacy_browser_keys_are_accepted() {
        let mut store = MemoryStore::default();
        store
            .set(
                "workouts",
                r#"[{"date":"2023-07-14T09:12:33.120Z","id":"9312553120","clicks":0,
                    "coords":[51.5,-0.1],"distance":20,"duration":60,"type":"cycling",
                    "elevationGain":300,"speed":20,"description":"Cycling on July 14"}]"#,
            )
            .unwrap();
        let loaded = Persistence::new(store, "workouts").load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].activity_type(), ActivityType::Cycling);
        assert_eq!(loaded[0].id().as_str(), "9312553120");
        assert_eq!(loaded[0].speed(), Some(20.0));
    }

    #[test]
    fn unknown_and_invalid_entries_are_skipped() {
        let mut store = MemoryStore::default();
        store
            .set(
                "workouts",
                r#"[
                  {"id":"a","createdAt":"2024-01-02T10:00:00Z","coords":[0,0],"distance":1,
                   "duration":5,"description":"Swimming on January 2","activityType":"swimming"},
                  {"id":"b","createdAt":"2024-01-02T10:00:00Z","coords":[0,0],"distance":1,
                   "duration":5,"description":"x"},
                  {"id":"c","createdAt":"2024-01-02T10:00:00Z","coords":[0,0],"distance":-1,
                   "duration":5,"description":"x","activityType":"running","cadence":150},
                  {"id":"d","createdAt":"2024-01-02T10:00:00Z","coords":[0,0],"distance":2,
                   "duration":10,"description":"Running on January 2","activityType":"running","cadence":150}
                ]"#,
            )
            .unwrap();
        let loaded = Persistence::new(store, "workouts").load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id().as_str(), "d");
    }

    #[test]
    fn unknown_type_is_reported_as_such() {
        let raw = StoredWorkout {
            activity_type: Some("rowing".into()),
            ..StoredWorkout::from(&sample()[0])
        };
        assert!(matches!(
            Workout::try_from(raw),
            Err(PersistenceError::UnknownType(t)) if t == "rowing"
        ));
    }

    #[test]
    fn non_array_record_is_corrupt() {
        let mut store = MemoryStore::default();
        store.set("workouts", "{not json").unwrap();
        let err = Persistence::new(store, "workouts").load().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }
}
