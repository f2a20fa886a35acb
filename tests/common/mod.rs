//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use pixium_status::epics::sim::{SimAdBase, SimFfMpeg, SimFileSaver};
use pixium_status::{PixiumStatusController, PixiumView};
use std::sync::{Arc, Mutex};

/// View that records every call as `(field, value)` in arrival order.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|(field, _)| field).collect()
    }

    pub fn last(&self, field: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| value)
    }

    fn record(&self, field: &'static str, value: impl Into<String>) {
        self.calls.lock().unwrap().push((field, value.into()));
    }
}

impl PixiumView for RecordingView {
    fn set_array_counter(&self, value: &str) {
        self.record("array_counter", value);
    }
    fn set_array_rate(&self, value: &str) {
        self.record("array_rate", value);
    }
    fn set_time(&self, value: &str) {
        self.record("time", value);
    }
    fn set_exp(&self, value: &str) {
        self.record("exp", value);
    }
    fn set_img(&self, value: &str) {
        self.record("img", value);
    }
    fn set_acquire_state(&self, state: i16) {
        self.record("acquire_state", state.to_string());
    }
    fn set_acq_exposure(&self, value: &str) {
        self.record("acq_exposure", value);
    }
    fn set_acq_period(&self, value: &str) {
        self.record("acq_period", value);
    }
    fn set_file_saver_x(&self, value: &str) {
        self.record("file_saver_x", value);
    }
    fn set_file_saver_y(&self, value: &str) {
        self.record("file_saver_y", value);
    }
    fn set_file_saver_time_stamp(&self, value: &str) {
        self.record("file_saver_time_stamp", value);
    }
    fn set_file_saver_capture_state(&self, state: i16) {
        self.record("file_saver_capture_state", state.to_string());
    }
}

pub struct Rig {
    pub controller: PixiumStatusController,
    pub cam: Arc<SimAdBase>,
    pub hdf: Arc<SimFileSaver>,
    pub mjpg: Arc<SimFfMpeg>,
}

/// Controller wired to fresh simulated models. Must be called inside a tokio runtime.
pub fn rig() -> Rig {
    let cam = Arc::new(SimAdBase::new("BL12I-EA-DET-05:CAM:"));
    let hdf = Arc::new(SimFileSaver::new("BL12I-EA-DET-05:HDF5:"));
    let mjpg = Arc::new(SimFfMpeg::new("BL12I-EA-DET-05:MJPG:"));
    let controller = PixiumStatusController::builder()
        .ad_base_model(cam.clone())
        .file_saver_model(hdf.clone())
        .ff_mpeg_model(mjpg.clone())
        .build()
        .expect("controller should build with all models");
    Rig {
        controller,
        cam,
        hdf,
        mjpg,
    }
}
