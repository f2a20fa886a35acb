//! Status Views
//!
//! A [`PixiumView`] is anything that displays the detector status: a GUI panel, a log
//! sink, a test probe. The controller formats every value before handing it over, so
//! views only ever receive display strings, plus the raw enum value for the two state
//! fields (the view decides how to colour or label them).
//!
//! Two views ship with the crate:
//!
//! - [`SnapshotView`] keeps the latest value of every field, serializable with serde
//! - [`TracingView`] emits each update as a structured `tracing` event

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use crate::epics::{AcquireState, CaptureState};

/// Outbound contract of the status controller.
///
/// Methods take `&self`; implementations use interior mutability. Updates may arrive
/// from any thread.
pub trait PixiumView: Send + Sync {
    /// Frames acquired so far.
    fn set_array_counter(&self, value: &str);
    /// Current frame rate.
    fn set_array_rate(&self, value: &str);
    /// Time remaining in the acquisition.
    fn set_time(&self, value: &str);
    /// Exposures acquired for the current image.
    fn set_exp(&self, value: &str);
    /// Images acquired in the current acquisition.
    fn set_img(&self, value: &str);
    /// Raw `Acquire` state.
    fn set_acquire_state(&self, state: i16);
    /// Exposure time setting.
    fn set_acq_exposure(&self, value: &str);
    /// Acquire period setting.
    fn set_acq_period(&self, value: &str);
    /// File saver X dimension.
    fn set_file_saver_x(&self, value: &str);
    /// File saver Y dimension.
    fn set_file_saver_y(&self, value: &str);
    /// File saver timestamp, already formatted.
    fn set_file_saver_time_stamp(&self, value: &str);
    /// Raw file saver capture state.
    fn set_file_saver_capture_state(&self, state: i16);
}

// =============================================================================
// SnapshotView
// =============================================================================

/// Latest displayed value of every status field. `None` until the first update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Frames acquired so far.
    pub array_counter: Option<String>,
    /// Current frame rate.
    pub array_rate: Option<String>,
    /// Time remaining.
    pub time_remaining: Option<String>,
    /// Exposures counter.
    pub exposures: Option<String>,
    /// Images counter.
    pub images: Option<String>,
    /// Raw acquire state.
    pub acquire_state: Option<i16>,
    /// Exposure time.
    pub acq_exposure: Option<String>,
    /// Acquire period.
    pub acq_period: Option<String>,
    /// File saver X dimension.
    pub file_saver_x: Option<String>,
    /// File saver Y dimension.
    pub file_saver_y: Option<String>,
    /// File saver timestamp.
    pub file_saver_time_stamp: Option<String>,
    /// Raw file saver capture state.
    pub file_saver_capture_state: Option<i16>,
}

impl StatusSnapshot {
    /// Label/value pairs in display order. Unset fields show as `-`, state fields are
    /// decoded where possible.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_else(|| "-".to_string())
        }
        let acquire = self.acquire_state.map(|raw| match AcquireState::try_from(raw) {
            Ok(state) => state.label().to_string(),
            Err(_) => raw.to_string(),
        });
        let capture = self
            .file_saver_capture_state
            .map(|raw| match CaptureState::try_from(raw) {
                Ok(state) => state.label().to_string(),
                Err(_) => raw.to_string(),
            });

        vec![
            ("Acquire", text(&acquire)),
            ("Exposure (s)", text(&self.acq_exposure)),
            ("Period (s)", text(&self.acq_period)),
            ("Array counter", text(&self.array_counter)),
            ("Array rate (fps)", text(&self.array_rate)),
            ("Exposures", text(&self.exposures)),
            ("Images", text(&self.images)),
            ("Time remaining (s)", text(&self.time_remaining)),
            ("Capture", text(&capture)),
            ("File timestamp", text(&self.file_saver_time_stamp)),
            ("File X", text(&self.file_saver_x)),
            ("File Y", text(&self.file_saver_y)),
        ]
    }
}

/// View that records the latest value of each field.
#[derive(Debug, Default)]
pub struct SnapshotView {
    snapshot: Mutex<StatusSnapshot>,
    updates: Mutex<usize>,
}

impl SnapshotView {
    /// Create an empty snapshot view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total number of updates received.
    pub fn update_count(&self) -> usize {
        *self.updates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            update(&mut *snapshot);
        }
        *self.updates.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

impl PixiumView for SnapshotView {
    fn set_array_counter(&self, value: &str) {
        self.apply(|s| s.array_counter = Some(value.to_string()));
    }

    fn set_array_rate(&self, value: &str) {
        self.apply(|s| s.array_rate = Some(value.to_string()));
    }

    fn set_time(&self, value: &str) {
        self.apply(|s| s.time_remaining = Some(value.to_string()));
    }

    fn set_exp(&self, value: &str) {
        self.apply(|s| s.exposures = Some(value.to_string()));
    }

    fn set_img(&self, value: &str) {
        self.apply(|s| s.images = Some(value.to_string()));
    }

    fn set_acquire_state(&self, state: i16) {
        self.apply(|s| s.acquire_state = Some(state));
    }

    fn set_acq_exposure(&self, value: &str) {
        self.apply(|s| s.acq_exposure = Some(value.to_string()));
    }

    fn set_acq_period(&self, value: &str) {
        self.apply(|s| s.acq_period = Some(value.to_string()));
    }

    fn set_file_saver_x(&self, value: &str) {
        self.apply(|s| s.file_saver_x = Some(value.to_string()));
    }

    fn set_file_saver_y(&self, value: &str) {
        self.apply(|s| s.file_saver_y = Some(value.to_string()));
    }

    fn set_file_saver_time_stamp(&self, value: &str) {
        self.apply(|s| s.file_saver_time_stamp = Some(value.to_string()));
    }

    fn set_file_saver_capture_state(&self, state: i16) {
        self.apply(|s| s.file_saver_capture_state = Some(state));
    }
}

// =============================================================================
// TracingView
// =============================================================================

/// View that logs every update at info level.
#[derive(Debug, Clone)]
pub struct TracingView {
    name: String,
}

impl TracingView {
    /// Create a view whose events carry `name` in the `view` field.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn emit(&self, field: &'static str, value: &str) {
        tracing::info!(view = %self.name, field, value, "Status update");
    }
}

impl PixiumView for TracingView {
    fn set_array_counter(&self, value: &str) {
        self.emit("array_counter", value);
    }

    fn set_array_rate(&self, value: &str) {
        self.emit("array_rate", value);
    }

    fn set_time(&self, value: &str) {
        self.emit("time_remaining", value);
    }

    fn set_exp(&self, value: &str) {
        self.emit("exposures", value);
    }

    fn set_img(&self, value: &str) {
        self.emit("images", value);
    }

    fn set_acquire_state(&self, state: i16) {
        let label = AcquireState::try_from(state).map(AcquireState::label);
        tracing::info!(
            view = %self.name,
            field = "acquire_state",
            state,
            label = ?label.ok(),
            "Status update"
        );
    }

    fn set_acq_exposure(&self, value: &str) {
        self.emit("acq_exposure", value);
    }

    fn set_acq_period(&self, value: &str) {
        self.emit("acq_period", value);
    }

    fn set_file_saver_x(&self, value: &str) {
        self.emit("file_saver_x", value);
    }

    fn set_file_saver_y(&self, value: &str) {
        self.emit("file_saver_y", value);
    }

    fn set_file_saver_time_stamp(&self, value: &str) {
        self.emit("file_saver_time_stamp", value);
    }

    fn set_file_saver_capture_state(&self, state: i16) {
        let label = CaptureState::try_from(state).map(CaptureState::label);
        tracing::info!(
            view = %self.name,
            field = "file_saver_capture_state",
            state,
            label = ?label.ok(),
            "Status update"
        );
    }
}
