// src/validation.rs
use strum_macros::Display;
use thiserror::Error;

use crate::workout::{ActivityType, Workout};

/// Form input exactly as the user typed it. Only the fields required by the
/// selected activity type are looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    pub distance: String,
    pub duration: String,
    pub cadence: String,
    pub elevation_gain: String,
}

impl RawFields {
    pub fn running(distance: &str, duration: &str, cadence: &str) -> Self {
        Self {
            distance: distance.to_string(),
            duration: duration.to_string(),
            cadence: cadence.to_string(),
            ..Default::default()
        }
    }

    pub fn cycling(distance: &str, duration: &str, elevation_gain: &str) -> Self {
        Self {
            distance: distance.to_string(),
            duration: duration.to_string(),
            elevation_gain: elevation_gain.to_string(),
            ..Default::default()
        }
    }
}

// Pre-populates an edit form from the workout's current values.
impl From<&Workout> for RawFields {
    fn from(w: &Workout) -> Self {
        Self {
            distance: w.distance().to_string(),
            duration: w.duration().to_string(),
            cadence: w.cadence().map(|c| c.to_string()).unwrap_or_default(),
            elevation_gain: w.elevation_gain().map(|e| e.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityFields {
    Running { cadence: u32 },
    Cycling { elevation_gain: f64 },
}

impl ActivityFields {
    pub const fn activity_type(&self) -> ActivityType {
        match self {
            Self::Running { .. } => ActivityType::Running,
            Self::Cycling { .. } => ActivityType::Cycling,
        }
    }
}

/// Decoded input, ready for `create_workout` or `Workout::edit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedFields {
    pub distance: f64,
    pub duration: f64,
    pub activity: ActivityFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Field {
    #[strum(to_string = "distance")]
    Distance,
    #[strum(to_string = "duration")]
    Duration,
    #[strum(to_string = "cadence")]
    Cadence,
    #[strum(to_string = "elevation gain")]
    ElevationGain,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Inputs have to be numbers: {field} is not a number.")]
    NotANumber { field: Field },
    #[error("Inputs have to be positive numbers: {field} must be greater than zero.")]
    NotPositive { field: Field },
    #[error("Inputs have to be whole numbers: {field} cannot have a fractional part.")]
    NotAWholeNumber { field: Field },
    #[error("Inputs are out of range: {field} is too large.")]
    TooLarge { field: Field },
}

/// Validates raw form input for the given activity type.
/// All required fields are decoded before any positivity check, so a field
/// that is not a number is reported ahead of one that is merely not positive.
/// # Errors
/// - `ValidationError::NotANumber` if a required field is empty or not a finite number.
/// - `ValidationError::NotPositive` if distance, duration or (running) cadence is not > 0.
/// - `ValidationError::NotAWholeNumber` if cadence has a fractional part.
/// - `ValidationError::TooLarge` if cadence does not fit in a `u32`.
pub fn validate(
    activity: ActivityType,
    raw: &RawFields,
) -> Result<ValidatedFields, ValidationError> {
    let distance = decode(Field::Distance, &raw.distance)?;
    let duration = decode(Field::Duration, &raw.duration)?;
    let specific = match activity {
        ActivityType::Running => decode(Field::Cadence, &raw.cadence)?,
        ActivityType::Cycling => decode(Field::ElevationGain, &raw.elevation_gain)?,
    };
    check_values(activity, distance, duration, specific)
}

/// Checks already-decoded numbers against the workout invariants. Shared by
/// form validation and by reconstruction from the durable record.
/// # Errors
/// Same taxonomy as [`validate`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn check_values(
    activity: ActivityType,
    distance: f64,
    duration: f64,
    specific: f64,
) -> Result<ValidatedFields, ValidationError> {
    for (field, value) in [
        (Field::Distance, distance),
        (Field::Duration, duration),
        (specific_field(activity), specific),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NotANumber { field });
        }
    }
    for (field, value) in [(Field::Distance, distance), (Field::Duration, duration)] {
        if value <= 0.0 {
            return Err(ValidationError::NotPositive { field });
        }
    }

    let activity = match activity {
        ActivityType::Running => {
            if specific <= 0.0 {
                return Err(ValidationError::NotPositive {
                    field: Field::Cadence,
                });
            }
            if specific.fract() != 0.0 {
                return Err(ValidationError::NotAWholeNumber {
                    field: Field::Cadence,
                });
            }
            if specific > f64::from(u32::MAX) {
                return Err(ValidationError::TooLarge {
                    field: Field::Cadence,
                });
            }
            ActivityFields::Running {
                cadence: specific as u32,
            }
        }
        // Elevation may be negative (net descent); it only has to be a number.
        ActivityType::Cycling => ActivityFields::Cycling {
            elevation_gain: specific,
        },
    };

    Ok(ValidatedFields {
        distance,
        duration,
        activity,
    })
}

const fn specific_field(activity: ActivityType) -> Field {
    match activity {
        ActivityType::Running => Field::Cadence,
        ActivityType::Cycling => Field::ElevationGain,
    }
}

fn decode(field: Field, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::NotANumber { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_running_input() {
        let v = validate(ActivityType::Running, &RawFields::running("5.2", "30", "178")).unwrap();
        assert_eq!(v.distance, 5.2);
        assert_eq!(v.duration, 30.0);
        assert_eq!(v.activity, ActivityFields::Running { cadence: 178 });
    }

    #[test]
    fn rejects_zero_and_negative_distance() {
        for distance in ["0", "-5"] {
            let err = validate(ActivityType::Running, &RawFields::running(distance, "30", "178"))
                .unwrap_err();
            assert_eq!(
                err,
                ValidationError::NotPositive {
                    field: Field::Distance
                }
            );
        }
    }

    #[test]
    fn rejects_non_numeric_duration() {
        let err =
            validate(ActivityType::Running, &RawFields::running("5", "abc", "178")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotANumber {
                field: Field::Duration
            }
        );
    }

    #[test]
    fn not_a_number_is_reported_before_not_positive() {
        let err = validate(ActivityType::Running, &RawFields::running("0", "30", "x")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotANumber {
                field: Field::Cadence
            }
        );
    }

    #[test]
    fn empty_and_non_finite_fields_are_not_numbers() {
        for bad in ["", "   ", "NaN", "inf", "-infinity"] {
            let err = validate(ActivityType::Cycling, &RawFields::cycling("10", "40", bad))
                .unwrap_err();
            assert_eq!(
                err,
                ValidationError::NotANumber {
                    field: Field::ElevationGain
                }
            );
        }
    }

    #[test]
    fn cycling_elevation_may_be_zero_or_negative() {
        let v = validate(ActivityType::Cycling, &RawFields::cycling("20", "60", "-35")).unwrap();
        assert_eq!(
            v.activity,
            ActivityFields::Cycling {
                elevation_gain: -35.0
            }
        );
        assert!(validate(ActivityType::Cycling, &RawFields::cycling("20", "60", "0")).is_ok());
    }

    #[test]
    fn running_cadence_must_be_positive_and_whole() {
        assert_eq!(
            validate(ActivityType::Running, &RawFields::running("5", "25", "0")).unwrap_err(),
            ValidationError::NotPositive {
                field: Field::Cadence
            }
        );
        assert_eq!(
            validate(ActivityType::Running, &RawFields::running("5", "25", "170.5")).unwrap_err(),
            ValidationError::NotAWholeNumber {
                field: Field::Cadence
            }
        );
    }

    #[test]
    fn only_fields_of_the_selected_type_are_read() {
        let raw = RawFields {
            distance: "20".into(),
            duration: "60".into(),
            cadence: "not used".into(),
            elevation_gain: "300".into(),
        };
        assert!(validate(ActivityType::Cycling, &raw).is_ok());
        assert!(validate(ActivityType::Running, &raw).is_err());
    }

    #[test]
    fn error_messages_name_the_field() {
        let err = ValidationError::NotPositive {
            field: Field::ElevationGain,
        };
        assert!(err.to_string().contains("elevation gain"));
        let err = ValidationError::NotAWholeNumber {
            field: Field::Cadence,
        };
        assert!(err.to_string().contains("cadence"));
    }

    #[test]
    fn oversized_cadence_is_out_of_range() {
        let err = validate(ActivityType::Running, &RawFields::running("5", "25", "5000000000"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                field: Field::Cadence
            }
        );
        assert!(err.to_string().contains("cadence is too large"));
        assert!(validate(ActivityType::Running, &RawFields::running("5", "25", "4294967295")).is_ok());
    }
}
