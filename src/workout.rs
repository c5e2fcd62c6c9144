// src/workout.rs
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::validation::{ActivityFields, ValidatedFields};

/// Ids are the last ten digits of a millisecond timestamp.
const ID_MODULUS: i64 = 10_000_000_000;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActivityType {
    Running,
    Cycling,
}

impl ActivityType {
    /// Capitalized name used in descriptions ("Running", "Cycling").
    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Cycling => "Cycling",
        }
    }

    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Running => "🏃‍♂️",
            Self::Cycling => "🚴‍♀️",
        }
    }

    /// Unit of the derived metric: pace for running, speed for cycling.
    pub const fn rate_unit(self) -> &'static str {
        match self {
            Self::Running => "min/km",
            Self::Cycling => "km/h",
        }
    }

    /// Unit of the type-specific field: cadence or elevation gain.
    pub const fn effort_unit(self) -> &'static str {
        match self {
            Self::Running => "spm",
            Self::Cycling => "m",
        }
    }
}

/// A `(latitude, longitude)` pair. Stored as a two element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coords {
    pub lat: f64,
    pub lng: f64,
}

impl Coords {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for Coords {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<Coords> for [f64; 2] {
    fn from(c: Coords) -> Self {
        [c.lat, c.lng]
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkoutId(String);

impl WorkoutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkoutId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Hands out timestamp based ids that never repeat within one sequence,
/// even when several workouts are created in the same millisecond.
#[derive(Debug, Default, Clone)]
pub struct IdSequence {
    last_millis: i64,
}

impl IdSequence {
    pub fn next_id(&mut self, now: DateTime<Utc>) -> WorkoutId {
        let millis = now.timestamp_millis().max(self.last_millis + 1);
        self.last_millis = millis;
        WorkoutId(format!("{:010}", millis.rem_euclid(ID_MODULUS)))
    }
}

/// Type-specific data plus the derived metric that goes with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity {
    Running { cadence: u32, pace: f64 },
    Cycling { elevation_gain: f64, speed: f64 },
}

impl Activity {
    fn compute(distance: f64, duration: f64, fields: ActivityFields) -> Self {
        match fields {
            ActivityFields::Running { cadence } => Self::Running {
                cadence,
                pace: pace(distance, duration),
            },
            ActivityFields::Cycling { elevation_gain } => Self::Cycling {
                elevation_gain,
                speed: speed(distance, duration),
            },
        }
    }

    pub const fn activity_type(&self) -> ActivityType {
        match self {
            Self::Running { .. } => ActivityType::Running,
            Self::Cycling { .. } => ActivityType::Cycling,
        }
    }
}

/// Minutes per kilometer.
pub fn pace(distance: f64, duration: f64) -> f64 {
    duration / distance
}

/// Kilometers per hour.
pub fn speed(distance: f64, duration: f64) -> f64 {
    distance / (duration / 60.0)
}

/// `"<Activity> on <Month> <day>"`, using the local calendar date.
pub fn describe(activity: ActivityType, created_at: DateTime<Utc>) -> String {
    let local = created_at.with_timezone(&Local);
    format!("{} on {}", activity.label(), local.format("%B %-d"))
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a {expected} workout cannot be edited as {requested}")]
pub struct ActivityMismatch {
    pub expected: ActivityType,
    pub requested: ActivityType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    id: WorkoutId,
    created_at: DateTime<Utc>,
    coords: Coords,
    distance: f64,
    duration: f64,
    description: String,
    visit_count: u32,
    activity: Activity,
}

/// Builds a new workout from validated input. The derived metric and the
/// description are computed before the value is returned.
pub fn create_workout(
    id: WorkoutId,
    created_at: DateTime<Utc>,
    coords: Coords,
    fields: &ValidatedFields,
) -> Workout {
    let activity = Activity::compute(fields.distance, fields.duration, fields.activity);
    Workout {
        id,
        created_at,
        coords,
        distance: fields.distance,
        duration: fields.duration,
        description: describe(activity.activity_type(), created_at),
        visit_count: 0,
        activity,
    }
}

impl Workout {
    /// Rebuilds a stored workout. The description and visit counter are kept
    /// exactly as they were written.
    pub(crate) fn restore(
        id: WorkoutId,
        created_at: DateTime<Utc>,
        coords: Coords,
        fields: &ValidatedFields,
        description: String,
        visit_count: u32,
    ) -> Self {
        Self {
            id,
            created_at,
            coords,
            distance: fields.distance,
            duration: fields.duration,
            description,
            visit_count,
            activity: Activity::compute(fields.distance, fields.duration, fields.activity),
        }
    }

    /// Applies an edit. Only distance, duration and the type-specific field
    /// change; the activity type itself is fixed.
    /// # Errors
    /// Returns `ActivityMismatch` if `fields` belong to another activity type.
    pub fn edit(&mut self, fields: &ValidatedFields) -> Result<(), ActivityMismatch> {
        let requested = fields.activity.activity_type();
        if requested != self.activity_type() {
            return Err(ActivityMismatch {
                expected: self.activity_type(),
                requested,
            });
        }
        self.distance = fields.distance;
        self.duration = fields.duration;
        self.activity = Activity::compute(fields.distance, fields.duration, fields.activity);
        self.description = describe(requested, self.created_at);
        Ok(())
    }

    pub fn visit(&mut self) {
        self.visit_count = self.visit_count.saturating_add(1);
    }

    pub const fn id(&self) -> &WorkoutId {
        &self.id
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn coords(&self) -> Coords {
        self.coords
    }

    pub const fn distance(&self) -> f64 {
        self.distance
    }

    pub const fn duration(&self) -> f64 {
        self.duration
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn visit_count(&self) -> u32 {
        self.visit_count
    }

    pub const fn activity(&self) -> &Activity {
        &self.activity
    }

    pub const fn activity_type(&self) -> ActivityType {
        self.activity.activity_type()
    }

    pub const fn pace(&self) -> Option<f64> {
        match self.activity {
            Activity::Running { pace, .. } => Some(pace),
            Activity::Cycling { .. } => None,
        }
    }

    pub const fn speed(&self) -> Option<f64> {
        match self.activity {
            Activity::Cycling { speed, .. } => Some(speed),
            Activity::Running { .. } => None,
        }
    }

    pub const fn cadence(&self) -> Option<u32> {
        match self.activity {
            Activity::Running { cadence, .. } => Some(cadence),
            Activity::Cycling { .. } => None,
        }
    }

    pub const fn elevation_gain(&self) -> Option<f64> {
        match self.activity {
            Activity::Cycling { elevation_gain, .. } => Some(elevation_gain),
            Activity::Running { .. } => None,
        }
    }

    /// Pace or speed, whichever this workout carries.
    pub const fn rate(&self) -> f64 {
        match self.activity {
            Activity::Running { pace, .. } => pace,
            Activity::Cycling { speed, .. } => speed,
        }
    }

    /// Cadence or elevation gain, as a plain number for display.
    pub fn effort(&self) -> f64 {
        match self.activity {
            Activity::Running { cadence, .. } => f64::from(cadence),
            Activity::Cycling { elevation_gain, .. } => elevation_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn running(distance: f64, duration: f64, cadence: u32) -> ValidatedFields {
        ValidatedFields {
            distance,
            duration,
            activity: ActivityFields::Running { cadence },
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn running_pace_is_duration_over_distance() {
        let w = create_workout(
            "1".into(),
            noon(4),
            Coords::new(51.5, -0.1),
            &running(5.0, 25.0, 180),
        );
        assert_eq!(w.pace(), Some(5.0));
        assert_eq!(w.speed(), None);
        assert_eq!(w.cadence(), Some(180));
        assert_eq!(w.visit_count(), 0);
    }

    #[test]
    fn cycling_speed_is_km_per_hour() {
        let fields = ValidatedFields {
            distance: 20.0,
            duration: 60.0,
            activity: ActivityFields::Cycling {
                elevation_gain: 300.0,
            },
        };
        let w = create_workout("2".into(), noon(4), Coords::new(0.0, 0.0), &fields);
        assert_eq!(w.speed(), Some(20.0));
        assert_eq!(w.pace(), None);
        assert_eq!(w.elevation_gain(), Some(300.0));
    }

    #[test]
    fn description_uses_month_name_and_unpadded_day() {
        let created = noon(4);
        let expected_day = created.with_timezone(&Local).format("%B %-d").to_string();
        assert_eq!(
            describe(ActivityType::Cycling, created),
            format!("Cycling on {expected_day}")
        );
    }

    #[test]
    fn edit_recomputes_pace_and_keeps_identity() {
        let created = noon(10);
        let mut w = create_workout(
            "42".into(),
            created,
            Coords::new(51.5, -0.1),
            &running(5.0, 25.0, 180),
        );
        w.edit(&running(10.0, 25.0, 175)).unwrap();
        assert_eq!(w.pace(), Some(2.5));
        assert_eq!(w.cadence(), Some(175));
        assert_eq!(w.id().as_str(), "42");
        assert_eq!(w.created_at(), created);
        assert_eq!(w.coords(), Coords::new(51.5, -0.1));
    }

    #[test]
    fn edit_with_other_activity_is_rejected() {
        let mut w = create_workout(
            "7".into(),
            noon(1),
            Coords::new(1.0, 2.0),
            &running(5.0, 25.0, 180),
        );
        let before = w.clone();
        let err = w
            .edit(&ValidatedFields {
                distance: 3.0,
                duration: 10.0,
                activity: ActivityFields::Cycling {
                    elevation_gain: 10.0,
                },
            })
            .unwrap_err();
        assert_eq!(err.expected, ActivityType::Running);
        assert_eq!(err.requested, ActivityType::Cycling);
        assert_eq!(w, before);
    }

    #[test]
    fn visit_only_bumps_the_counter() {
        let mut w = create_workout("9".into(), noon(2), Coords::new(0.0, 0.0), &running(1.0, 6.0, 160));
        let before = w.clone();
        w.visit();
        w.visit();
        assert_eq!(w.visit_count(), 2);
        assert_eq!(w.distance(), before.distance());
        assert_eq!(w.description(), before.description());
    }

    #[test]
    fn id_sequence_never_repeats_within_a_millisecond() {
        let mut ids = IdSequence::default();
        let now = noon(5);
        let a = ids.next_id(now);
        let b = ids.next_id(now);
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 10);
    }

    #[test]
    fn activity_type_parses_case_insensitively() {
        assert_eq!("Running".parse::<ActivityType>().unwrap(), ActivityType::Running);
        assert_eq!("cycling".parse::<ActivityType>().unwrap(), ActivityType::Cycling);
        assert!("swimming".parse::<ActivityType>().is_err());
        assert_eq!(ActivityType::Cycling.to_string(), "cycling");
    }
}
