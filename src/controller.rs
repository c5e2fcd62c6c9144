// src/controller.rs
use chrono::Utc;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{KeyValueStore, Persistence, PersistenceError};
use crate::validation::{validate, RawFields, ValidationError};
use crate::workout::{
    create_workout, ActivityMismatch, ActivityType, Coords, IdSequence, Workout, WorkoutId,
};

pub const DEFAULT_MAP_ZOOM: u8 = 13;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Workout not found: ID {0}")]
    NotFound(WorkoutId),
    #[error("Activity type is locked while editing: {0}")]
    ActivityLocked(#[from] ActivityMismatch),
    #[error("No workout form is open for this submission")]
    NoFormOpen,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Metrics the list can be sorted by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortKey {
    Distance,
    Duration,
}

impl SortKey {
    pub const fn value_of(self, workout: &Workout) -> f64 {
        match self {
            Self::Distance => workout.distance(),
            Self::Duration => workout.duration(),
        }
    }
}

/// One flag per sortable metric. At most one flag is set at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    flags: BTreeMap<SortKey, bool>,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            flags: SortKey::iter().map(|k| (k, false)).collect(),
        }
    }
}

impl SortState {
    pub fn is_sorted_by(&self, key: SortKey) -> bool {
        self.flags.get(&key).copied().unwrap_or(false)
    }

    pub fn active(&self) -> Option<SortKey> {
        self.flags
            .iter()
            .find_map(|(&key, &on)| if on { Some(key) } else { None })
    }

    /// Flips `key`. Turning a key on clears every other key.
    /// Returns the key now in effect, if any.
    pub fn toggle(&mut self, key: SortKey) -> Option<SortKey> {
        let was_on = self.is_sorted_by(key);
        self.clear();
        if !was_on {
            self.flags.insert(key, true);
        }
        self.active()
    }

    pub fn clear(&mut self) {
        self.flags.values_mut().for_each(|on| *on = false);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormMode {
    Idle,
    Creating { coords: Coords },
    Editing { id: WorkoutId },
}

/// What the form should show when it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPrefill {
    /// `Some` when the type selector is locked to this activity.
    pub locked_activity: Option<ActivityType>,
    pub fields: RawFields,
}

/// User intents coming from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PickLocation(Coords),
    SubmitNew {
        activity: ActivityType,
        fields: RawFields,
    },
    BeginEdit(WorkoutId),
    SubmitEdit {
        id: WorkoutId,
        activity: ActivityType,
        fields: RawFields,
    },
    Cancel,
    Delete(WorkoutId),
    ToggleSort(SortKey),
    Select(WorkoutId),
    Reset,
}

/// Follow-up work for the presentation layer after an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowForm(FormPrefill),
    HideForm,
    RenderWorkout(WorkoutId),
    RenderMarker(WorkoutId),
    RenderAll,
    FocusMap { coords: Coords, zoom: u8 },
    Persisted,
}

/// Owns the workout collection, the form mode, the sort toggles and the
/// current selection. Every structural change is written through to the
/// durable store before it becomes visible in memory.
pub struct WorkoutController<S> {
    workouts: Vec<Workout>,
    persistence: Persistence<S>,
    mode: FormMode,
    sort: SortState,
    selected: Option<WorkoutId>,
    ids: IdSequence,
    zoom: u8,
}

impl<S: KeyValueStore> WorkoutController<S> {
    /// Loads the stored workouts. An unreadable record is logged and treated
    /// as no prior data so startup never fails.
    pub fn initialize(persistence: Persistence<S>) -> Self {
        let workouts = persistence.load().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read stored workouts, starting empty");
            Vec::new()
        });
        Self {
            workouts,
            persistence,
            mode: FormMode::Idle,
            sort: SortState::default(),
            selected: None,
            ids: IdSequence::default(),
            zoom: DEFAULT_MAP_ZOOM,
        }
    }

    #[must_use]
    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.set_zoom(zoom);
        self
    }

    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    /// Single entry point for presentation layers that work with actions.
    /// # Errors
    /// See the individual operations.
    pub fn handle(&mut self, action: Action) -> Result<Vec<Effect>, ControllerError> {
        match action {
            Action::PickLocation(coords) => Ok(self.pick_location(coords)),
            Action::SubmitNew { activity, fields } => self.submit_new(activity, &fields),
            Action::BeginEdit(id) => self.begin_edit(&id),
            Action::SubmitEdit {
                id,
                activity,
                fields,
            } => self.submit_edit(&id, activity, &fields),
            Action::Cancel => Ok(self.cancel()),
            Action::Delete(id) => self.delete(&id),
            Action::ToggleSort(key) => Ok(self.toggle_sort(key)),
            Action::Select(id) => Ok(self.select_workout(&id)),
            Action::Reset => self.reset(),
        }
    }

    /// Opens an empty form for a new workout at `coords`. A pending edit is
    /// dropped without changes.
    pub fn pick_location(&mut self, coords: Coords) -> Vec<Effect> {
        self.drop_pending_edit();
        self.mode = FormMode::Creating { coords };
        vec![Effect::ShowForm(FormPrefill {
            locked_activity: None,
            fields: RawFields::default(),
        })]
    }

    /// Validates and appends a new workout at the picked location.
    /// # Errors
    /// - `ControllerError::NoFormOpen` if no location was picked.
    /// - `ControllerError::Validation` if input is invalid; nothing changes.
    /// - `ControllerError::Persistence` if the write fails; nothing changes.
    pub fn submit_new(
        &mut self,
        activity: ActivityType,
        raw: &RawFields,
    ) -> Result<Vec<Effect>, ControllerError> {
        let FormMode::Creating { coords } = self.mode else {
            return Err(ControllerError::NoFormOpen);
        };
        let fields = validate(activity, raw)?;

        let id = self.fresh_id();
        let workout = create_workout(id.clone(), Utc::now(), coords, &fields);
        self.workouts.push(workout);
        if let Err(e) = self.persistence.save(&self.workouts) {
            self.workouts.pop();
            return Err(e.into());
        }

        debug!(%id, %activity, "Added workout");
        self.mode = FormMode::Idle;
        self.selected = Some(id.clone());
        Ok(vec![
            Effect::Persisted,
            Effect::RenderMarker(id.clone()),
            Effect::RenderWorkout(id),
            Effect::HideForm,
        ])
    }

    /// Opens the form pre-filled from an existing workout with its type locked.
    /// Any edit already in progress is dropped.
    /// # Errors
    /// Returns `ControllerError::NotFound` if `id` is unknown; state is unchanged.
    pub fn begin_edit(&mut self, id: &WorkoutId) -> Result<Vec<Effect>, ControllerError> {
        let workout = self
            .find(id)
            .ok_or_else(|| ControllerError::NotFound(id.clone()))?;
        let prefill = FormPrefill {
            locked_activity: Some(workout.activity_type()),
            fields: RawFields::from(workout),
        };
        self.drop_pending_edit();
        self.mode = FormMode::Editing { id: id.clone() };
        self.selected = Some(id.clone());
        Ok(vec![Effect::ShowForm(prefill)])
    }

    /// Applies the open edit to workout `id`.
    /// # Errors
    /// - `ControllerError::NoFormOpen` if `id` is not the workout being edited.
    /// - `ControllerError::NotFound` if the workout no longer exists.
    /// - `ControllerError::ActivityLocked` if `activity` differs from the workout's type.
    /// - `ControllerError::Validation` if input is invalid.
    /// - `ControllerError::Persistence` if the write fails; the edit is rolled back.
    pub fn submit_edit(
        &mut self,
        id: &WorkoutId,
        activity: ActivityType,
        raw: &RawFields,
    ) -> Result<Vec<Effect>, ControllerError> {
        if !matches!(&self.mode, FormMode::Editing { id: editing } if editing == id) {
            return Err(ControllerError::NoFormOpen);
        }
        let index = self
            .position(id)
            .ok_or_else(|| ControllerError::NotFound(id.clone()))?;
        let expected = self.workouts[index].activity_type();
        if activity != expected {
            return Err(ActivityMismatch {
                expected,
                requested: activity,
            }
            .into());
        }
        let fields = validate(activity, raw)?;

        let previous = self.workouts[index].clone();
        self.workouts[index].edit(&fields)?;
        if let Err(e) = self.persistence.save(&self.workouts) {
            self.workouts[index] = previous;
            return Err(e.into());
        }

        debug!(%id, "Edited workout");
        self.mode = FormMode::Idle;
        Ok(vec![
            Effect::Persisted,
            Effect::RenderWorkout(id.clone()),
            Effect::HideForm,
        ])
    }

    /// Submits whatever form is open: a new workout or the pending edit.
    /// # Errors
    /// `ControllerError::NoFormOpen` when idle, otherwise as `submit_new` / `submit_edit`.
    pub fn submit(
        &mut self,
        activity: ActivityType,
        raw: &RawFields,
    ) -> Result<Vec<Effect>, ControllerError> {
        match self.mode.clone() {
            FormMode::Idle => Err(ControllerError::NoFormOpen),
            FormMode::Creating { .. } => self.submit_new(activity, raw),
            FormMode::Editing { id } => self.submit_edit(&id, activity, raw),
        }
    }

    /// Closes the form without touching any workout.
    pub fn cancel(&mut self) -> Vec<Effect> {
        if self.mode == FormMode::Idle {
            return Vec::new();
        }
        self.mode = FormMode::Idle;
        vec![Effect::HideForm]
    }

    /// Removes workout `id`. Unknown ids are a no-op.
    /// # Errors
    /// Returns `ControllerError::Persistence` if the write fails; the workout is kept.
    pub fn delete(&mut self, id: &WorkoutId) -> Result<Vec<Effect>, ControllerError> {
        let Some(index) = self.position(id) else {
            debug!(%id, "Delete of unknown workout ignored");
            return Ok(Vec::new());
        };
        let removed = self.workouts.remove(index);
        if let Err(e) = self.persistence.save(&self.workouts) {
            self.workouts.insert(index, removed);
            return Err(e.into());
        }

        debug!(%id, "Deleted workout");
        let mut effects = vec![Effect::Persisted, Effect::RenderAll];
        if matches!(&self.mode, FormMode::Editing { id: editing } if editing == id) {
            self.mode = FormMode::Idle;
            effects.push(Effect::HideForm);
        }
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Ok(effects)
    }

    /// Switches the list between descending order by `key` and insertion order.
    pub fn toggle_sort(&mut self, key: SortKey) -> Vec<Effect> {
        let active = self.sort.toggle(key);
        debug!(?active, "Sort toggled");
        vec![Effect::RenderAll]
    }

    /// Marks a workout visited and makes it the current one. Not persisted.
    /// Unknown ids are ignored.
    pub fn select_workout(&mut self, id: &WorkoutId) -> Vec<Effect> {
        let Some(workout) = self.workouts.iter_mut().find(|w| w.id() == id) else {
            return Vec::new();
        };
        workout.visit();
        let coords = workout.coords();
        self.selected = Some(id.clone());
        vec![Effect::FocusMap {
            coords,
            zoom: self.zoom,
        }]
    }

    /// Clears the durable record and all in-memory state.
    /// # Errors
    /// Returns `ControllerError::Persistence` if the record cannot be removed.
    pub fn reset(&mut self) -> Result<Vec<Effect>, ControllerError> {
        self.persistence.reset()?;
        self.workouts.clear();
        self.mode = FormMode::Idle;
        self.sort.clear();
        self.selected = None;
        Ok(vec![Effect::HideForm, Effect::RenderAll])
    }

    /// Workouts in display order: sorted descending by the active key, or
    /// insertion order when no key is active. Ties keep insertion order.
    pub fn view(&self) -> Vec<&Workout> {
        let mut view: Vec<&Workout> = self.workouts.iter().collect();
        if let Some(key) = self.sort.active() {
            view.sort_by(|a, b| key.value_of(b).total_cmp(&key.value_of(a)));
        }
        view
    }

    /// Workouts in insertion order.
    pub fn workouts(&self) -> &[Workout] {
        &self.workouts
    }

    pub fn find(&self, id: &WorkoutId) -> Option<&Workout> {
        self.workouts.iter().find(|w| w.id() == id)
    }

    pub fn selected(&self) -> Option<&Workout> {
        self.selected.as_ref().and_then(|id| self.find(id))
    }

    pub const fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub const fn sort_state(&self) -> &SortState {
        &self.sort
    }

    pub const fn zoom(&self) -> u8 {
        self.zoom
    }

    pub const fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    /// South-west and north-east corners enclosing every workout.
    pub fn bounds(&self) -> Option<(Coords, Coords)> {
        let first = self.workouts.first()?.coords();
        let init = (first, first);
        Some(self.workouts.iter().fold(init, |(sw, ne), w| {
            let c = w.coords();
            (
                Coords::new(sw.lat.min(c.lat), sw.lng.min(c.lng)),
                Coords::new(ne.lat.max(c.lat), ne.lng.max(c.lng)),
            )
        }))
    }

    fn position(&self, id: &WorkoutId) -> Option<usize> {
        self.workouts.iter().position(|w| w.id() == id)
    }

    fn fresh_id(&mut self) -> WorkoutId {
        loop {
            let id = self.ids.next_id(Utc::now());
            if self.position(&id).is_none() {
                return id;
            }
        }
    }

    fn drop_pending_edit(&mut self) {
        if let FormMode::Editing { id } = &self.mode {
            debug!(%id, "Dropping unsubmitted edit");
        }
        self.mode = FormMode::Idle;
    }
}
