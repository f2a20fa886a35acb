//! Simulated Device Models
//!
//! In-process stand-ins for the three areaDetector models, used by tests and by the CLI
//! when no IOC is reachable. All simulated models use async-safe primitives
//! (`tokio::sync::RwLock`, `tokio::time::sleep`).
//!
//! # Available Simulations
//!
//! - `SimAdBase` - detector driver with acquisition counters and a frame loop
//! - `SimFileSaver` - file-writing plugin with dimensions, timestamp and capture state
//! - `SimFfMpeg` - MJPEG streaming plugin with dimensions and timestamp
//!
//! Setter methods behave like channel-access monitors: they store the new value and then
//! fire the matching callback on every registered view controller. Reads can be made to
//! fail per channel with [`SimAdBase::fail_channel`] and friends.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

use crate::display::epics_now;
use crate::epics::{
    AcquireState, AdBaseModel, AdBaseViewController, CaptureState, FfMpegModel,
    FileSaverModel, FileSaverViewController, NdDataType,
};
use crate::error::{AppResult, StatusError};

/// PV field names used by the simulated models.
pub mod fields {
    /// Array counter readback.
    pub const ARRAY_COUNTER: &str = "ArrayCounter_RBV";
    /// Array rate readback.
    pub const ARRAY_RATE: &str = "ArrayRate_RBV";
    /// Time remaining readback.
    pub const TIME_REMAINING: &str = "TimeRemaining_RBV";
    /// Exposures counter readback.
    pub const NUM_EXPOSURES_COUNTER: &str = "NumExposuresCounter_RBV";
    /// Images counter readback.
    pub const NUM_IMAGES_COUNTER: &str = "NumImagesCounter_RBV";
    /// Exposure time readback.
    pub const ACQUIRE_TIME: &str = "AcquireTime_RBV";
    /// Acquire period readback.
    pub const ACQUIRE_PERIOD: &str = "AcquirePeriod_RBV";
    /// Acquire state.
    pub const ACQUIRE: &str = "Acquire";
    /// Data type readback.
    pub const DATA_TYPE: &str = "DataType_RBV";
    /// First array dimension.
    pub const ARRAY_SIZE_0: &str = "ArraySize0_RBV";
    /// Second array dimension.
    pub const ARRAY_SIZE_1: &str = "ArraySize1_RBV";
    /// Array timestamp.
    pub const TIME_STAMP: &str = "TimeStamp_RBV";
    /// File capture state.
    pub const CAPTURE: &str = "Capture_RBV";
}

/// Kind of failure injected into a simulated channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The read times out, as when the IOC is down.
    Timeout,
    /// The channel reports a disconnect.
    Disconnected,
}

// =============================================================================
// Shared plumbing
// =============================================================================

/// PV prefix plus the table of injected faults.
#[derive(Debug)]
struct Channels {
    prefix: String,
    faults: Mutex<HashMap<String, FaultKind>>,
}

impl Channels {
    fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            faults: Mutex::new(HashMap::new()),
        }
    }

    fn pv(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }

    fn fail(&self, field: &str, kind: FaultKind) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field.to_string(), kind);
    }

    fn clear(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fail the read if a fault is injected on `field`.
    fn check(&self, field: &str) -> AppResult<()> {
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field)
            .copied();
        match fault {
            None => Ok(()),
            Some(FaultKind::Timeout) => Err(StatusError::ChannelTimeout {
                channel: self.pv(field),
            }),
            Some(FaultKind::Disconnected) => Err(StatusError::Channel {
                channel: self.pv(field),
                message: "channel disconnected".to_string(),
            }),
        }
    }
}

/// Registered callback tables, notified from a snapshot of the list.
struct Listeners<T: ?Sized> {
    inner: StdRwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Listeners<T> {
    fn new() -> Self {
        Self {
            inner: StdRwLock::new(Vec::new()),
        }
    }

    fn push(&self, listener: Arc<T>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// SimAdBase - Simulated detector driver
// =============================================================================

#[derive(Debug, Clone)]
struct AdBaseState {
    array_counter: i32,
    array_rate: f64,
    time_remaining: f64,
    num_exposures_counter: i32,
    num_images_counter: i32,
    acq_exposure: f64,
    acq_period: f64,
    acquire_state: i16,
    data_type: i16,
}

impl Default for AdBaseState {
    fn default() -> Self {
        Self {
            array_counter: 0,
            array_rate: 0.0,
            time_remaining: 0.0,
            num_exposures_counter: 0,
            num_images_counter: 0,
            acq_exposure: 0.5,
            acq_period: 1.0,
            acquire_state: AcquireState::Done as i16,
            data_type: NdDataType::UInt16 as i16,
        }
    }
}

/// Simulated area-detector driver.
///
/// # Example
///
/// ```rust,ignore
/// let cam = SimAdBase::new("BL12I-EA-DET-05:CAM:");
/// cam.set_array_counter(42).await;
/// assert_eq!(cam.array_counter_rbv().await?, 42);
/// ```
pub struct SimAdBase {
    channels: Channels,
    state: RwLock<AdBaseState>,
    listeners: Listeners<dyn AdBaseViewController>,
}

impl SimAdBase {
    /// Create a simulated driver serving PVs under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            channels: Channels::new(prefix),
            state: RwLock::new(AdBaseState::default()),
            listeners: Listeners::new(),
        }
    }

    /// PV prefix of this model.
    pub fn prefix(&self) -> &str {
        &self.channels.prefix
    }

    /// Number of registered callback tables.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Make reads of `field` fail.
    pub fn fail_channel(&self, field: &str, kind: FaultKind) {
        self.channels.fail(field, kind);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.channels.clear();
    }

    /// Post a new array counter.
    pub async fn set_array_counter(&self, value: i32) {
        self.state.write().await.array_counter = value;
        for l in self.listeners.snapshot() {
            l.update_array_counter(value);
        }
    }

    /// Post a new array rate.
    pub async fn set_array_rate(&self, value: f64) {
        self.state.write().await.array_rate = value;
        for l in self.listeners.snapshot() {
            l.update_array_rate(value);
        }
    }

    /// Post a new time remaining.
    pub async fn set_time_remaining(&self, value: f64) {
        self.state.write().await.time_remaining = value;
        for l in self.listeners.snapshot() {
            l.update_time_remaining(value);
        }
    }

    /// Post a new exposures counter.
    pub async fn set_num_exposures_counter(&self, value: i32) {
        self.state.write().await.num_exposures_counter = value;
        for l in self.listeners.snapshot() {
            l.update_number_of_exposures_counter(value);
        }
    }

    /// Post a new images counter.
    pub async fn set_num_images_counter(&self, value: i32) {
        self.state.write().await.num_images_counter = value;
        for l in self.listeners.snapshot() {
            l.update_number_of_images_counter(value);
        }
    }

    /// Post a new exposure time.
    pub async fn set_acq_exposure(&self, value: f64) {
        self.state.write().await.acq_exposure = value;
        for l in self.listeners.snapshot() {
            l.update_acq_exposure(value);
        }
    }

    /// Post a new acquire period.
    pub async fn set_acq_period(&self, value: f64) {
        self.state.write().await.acq_period = value;
        for l in self.listeners.snapshot() {
            l.update_acq_period(value);
        }
    }

    /// Post a new acquire state.
    pub async fn set_acquire_state(&self, value: i16) {
        self.state.write().await.acquire_state = value;
        for l in self.listeners.snapshot() {
            l.update_acquire_state(value);
        }
    }

    /// Post a new data type.
    pub async fn set_data_type(&self, value: i16) {
        self.state.write().await.data_type = value;
        for l in self.listeners.snapshot() {
            l.update_detector_data_type(value);
        }
    }

    /// Run a simulated acquisition of `frames` images.
    ///
    /// Each frame waits `frame_period`, then advances the counters, rate and time
    /// remaining. When a file saver is linked, its frame dimensions are posted once, it
    /// receives a fresh timestamp per frame and captures for the duration of the run.
    pub async fn acquire_frames(
        &self,
        frames: u32,
        frame_period: Duration,
        file_saver: Option<&SimFileSaver>,
    ) {
        let period_s = frame_period.as_secs_f64();
        let rate = if period_s > 0.0 { 1.0 / period_s } else { 0.0 };
        tracing::debug!(
            prefix = %self.prefix(),
            frames,
            period_s,
            "Starting simulated acquisition"
        );

        self.set_acq_period(period_s).await;
        self.set_num_images_counter(0).await;
        self.set_acquire_state(AcquireState::Acquire as i16).await;
        if let Some(saver) = file_saver {
            let (dim0, dim1) = saver.dimensions().await;
            saver.set_dimensions(dim0, dim1).await;
            saver.set_capture_state(CaptureState::Capturing as i16).await;
        }

        for frame in 1..=frames {
            sleep(frame_period).await;
            let counter = self.state.read().await.array_counter;
            self.set_array_counter(counter.saturating_add(1)).await;
            self.set_num_images_counter(i32::try_from(frame).unwrap_or(i32::MAX)).await;
            self.set_num_exposures_counter(1).await;
            self.set_array_rate(rate).await;
            self.set_time_remaining(f64::from(frames - frame) * period_s).await;
            if let Some(saver) = file_saver {
                saver.set_time_stamp(epics_now()).await;
            }
        }

        if let Some(saver) = file_saver {
            saver.set_capture_state(CaptureState::Done as i16).await;
        }
        self.set_array_rate(0.0).await;
        self.set_acquire_state(AcquireState::Done as i16).await;
        tracing::debug!(prefix = %self.prefix(), frames, "Simulated acquisition complete");
    }

    async fn read<T>(&self, field: &str, get: impl FnOnce(&AdBaseState) -> T) -> AppResult<T> {
        self.channels.check(field)?;
        Ok(get(&*self.state.read().await))
    }
}

impl Default for SimAdBase {
    fn default() -> Self {
        Self::new("SIM:CAM:")
    }
}

#[async_trait]
impl AdBaseModel for SimAdBase {
    fn register_view_controller(&self, controller: Arc<dyn AdBaseViewController>) {
        self.listeners.push(controller);
    }

    async fn array_counter_rbv(&self) -> AppResult<i32> {
        self.read(fields::ARRAY_COUNTER, |s| s.array_counter).await
    }

    async fn array_rate_rbv(&self) -> AppResult<f64> {
        self.read(fields::ARRAY_RATE, |s| s.array_rate).await
    }

    async fn time_remaining_rbv(&self) -> AppResult<f64> {
        self.read(fields::TIME_REMAINING, |s| s.time_remaining).await
    }

    async fn num_exposures_counter_rbv(&self) -> AppResult<i32> {
        self.read(fields::NUM_EXPOSURES_COUNTER, |s| s.num_exposures_counter)
            .await
    }

    async fn num_images_counter_rbv(&self) -> AppResult<i32> {
        self.read(fields::NUM_IMAGES_COUNTER, |s| s.num_images_counter)
            .await
    }

    async fn acq_exposure_rbv(&self) -> AppResult<f64> {
        self.read(fields::ACQUIRE_TIME, |s| s.acq_exposure).await
    }

    async fn acq_period_rbv(&self) -> AppResult<f64> {
        self.read(fields::ACQUIRE_PERIOD, |s| s.acq_period).await
    }

    async fn acquire_state(&self) -> AppResult<i16> {
        self.read(fields::ACQUIRE, |s| s.acquire_state).await
    }

    async fn data_type(&self) -> AppResult<i16> {
        self.read(fields::DATA_TYPE, |s| s.data_type).await
    }
}

// =============================================================================
// SimFileSaver - Simulated file-writing plugin
// =============================================================================

#[derive(Debug, Clone, Default)]
struct FileSaverState {
    dim0: i32,
    dim1: i32,
    time_stamp: f64,
    capture_state: i16,
}

/// Simulated file-saver plugin.
pub struct SimFileSaver {
    channels: Channels,
    state: RwLock<FileSaverState>,
    listeners: Listeners<dyn FileSaverViewController>,
}

impl SimFileSaver {
    /// Create a simulated plugin serving PVs under `prefix`, with a 2880x2881 frame.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_dimensions(prefix, 2880, 2881)
    }

    /// Create a simulated plugin with explicit frame dimensions.
    pub fn with_dimensions(prefix: impl Into<String>, dim0: i32, dim1: i32) -> Self {
        Self {
            channels: Channels::new(prefix),
            state: RwLock::new(FileSaverState {
                dim0,
                dim1,
                ..Default::default()
            }),
            listeners: Listeners::new(),
        }
    }

    /// PV prefix of this model.
    pub fn prefix(&self) -> &str {
        &self.channels.prefix
    }

    /// Number of registered callback tables.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Make reads of `field` fail.
    pub fn fail_channel(&self, field: &str, kind: FaultKind) {
        self.channels.fail(field, kind);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.channels.clear();
    }

    async fn dimensions(&self) -> (i32, i32) {
        let state = self.state.read().await;
        (state.dim0, state.dim1)
    }

    /// Post new frame dimensions (X then Y).
    pub async fn set_dimensions(&self, dim0: i32, dim1: i32) {
        {
            let mut state = self.state.write().await;
            state.dim0 = dim0;
            state.dim1 = dim1;
        }
        for l in self.listeners.snapshot() {
            l.update_file_save_x(dim0);
            l.update_file_save_y(dim1);
        }
    }

    /// Post a new array timestamp (EPICS epoch seconds).
    pub async fn set_time_stamp(&self, value: f64) {
        self.state.write().await.time_stamp = value;
        for l in self.listeners.snapshot() {
            l.update_file_save_time_stamp(value);
        }
    }

    /// Post a new capture state.
    pub async fn set_capture_state(&self, value: i16) {
        self.state.write().await.capture_state = value;
        for l in self.listeners.snapshot() {
            l.update_file_saver_capture_state(value);
        }
    }

    async fn read<T>(
        &self,
        field: &str,
        get: impl FnOnce(&FileSaverState) -> T,
    ) -> AppResult<T> {
        self.channels.check(field)?;
        Ok(get(&*self.state.read().await))
    }
}

impl Default for SimFileSaver {
    fn default() -> Self {
        Self::new("SIM:HDF:")
    }
}

#[async_trait]
impl FileSaverModel for SimFileSaver {
    fn register_view_controller(&self, controller: Arc<dyn FileSaverViewController>) {
        self.listeners.push(controller);
    }

    async fn dim0_size(&self) -> AppResult<i32> {
        self.read(fields::ARRAY_SIZE_0, |s| s.dim0).await
    }

    async fn dim1_size(&self) -> AppResult<i32> {
        self.read(fields::ARRAY_SIZE_1, |s| s.dim1).await
    }

    async fn time_stamp(&self) -> AppResult<f64> {
        self.read(fields::TIME_STAMP, |s| s.time_stamp).await
    }

    async fn capture_state(&self) -> AppResult<i16> {
        self.read(fields::CAPTURE, |s| s.capture_state).await
    }
}

// =============================================================================
// SimFfMpeg - Simulated MJPEG streaming plugin
// =============================================================================

#[derive(Debug, Clone, Default)]
struct FfMpegState {
    dim0: i32,
    dim1: i32,
    time_stamp: f64,
}

/// Simulated MJPEG streaming plugin.
pub struct SimFfMpeg {
    channels: Channels,
    state: RwLock<FfMpegState>,
}

impl SimFfMpeg {
    /// Create a simulated plugin serving PVs under `prefix`, with a binned 720x720 stream.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            channels: Channels::new(prefix),
            state: RwLock::new(FfMpegState {
                dim0: 720,
                dim1: 720,
                time_stamp: 0.0,
            }),
        }
    }

    /// PV prefix of this model.
    pub fn prefix(&self) -> &str {
        &self.channels.prefix
    }

    /// Make reads of `field` fail.
    pub fn fail_channel(&self, field: &str, kind: FaultKind) {
        self.channels.fail(field, kind);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.channels.clear();
    }

    /// Set the stream dimensions.
    pub async fn set_dimensions(&self, dim0: i32, dim1: i32) {
        let mut state = self.state.write().await;
        state.dim0 = dim0;
        state.dim1 = dim1;
    }

    /// Set the stream timestamp (EPICS epoch seconds).
    pub async fn set_time_stamp(&self, value: f64) {
        self.state.write().await.time_stamp = value;
    }

    async fn read<T>(&self, field: &str, get: impl FnOnce(&FfMpegState) -> T) -> AppResult<T> {
        self.channels.check(field)?;
        Ok(get(&*self.state.read().await))
    }
}

impl Default for SimFfMpeg {
    fn default() -> Self {
        Self::new("SIM:MJPG:")
    }
}

#[async_trait]
impl FfMpegModel for SimFfMpeg {
    async fn dim0_size(&self) -> AppResult<i32> {
        self.read(fields::ARRAY_SIZE_0, |s| s.dim0).await
    }

    async fn dim1_size(&self) -> AppResult<i32> {
        self.read(fields::ARRAY_SIZE_1, |s| s.dim1).await
    }

    async fn time_stamp(&self) -> AppResult<f64> {
        self.read(fields::TIME_STAMP, |s| s.time_stamp).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CounterListener {
        last_counter: AtomicI32,
        updates: AtomicUsize,
    }

    impl AdBaseViewController for CounterListener {
        fn update_array_counter(&self, array_counter: i32) {
            self.last_counter.store(array_counter, Ordering::SeqCst);
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_setter_updates_readback_and_listeners() {
        let cam = SimAdBase::new("TEST:CAM:");
        let listener = Arc::new(CounterListener::default());
        cam.register_view_controller(listener.clone());

        cam.set_array_counter(17).await;

        assert_eq!(cam.array_counter_rbv().await.unwrap(), 17);
        assert_eq!(listener.last_counter.load(Ordering::SeqCst), 17);
        assert_eq!(listener.updates.load(Ordering::SeqCst), 1);
        assert_eq!(cam.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection_names_full_pv() {
        let cam = SimAdBase::new("TEST:CAM:");
        cam.fail_channel(fields::ARRAY_RATE, FaultKind::Timeout);

        let err = cam.array_rate_rbv().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.channel(), Some("TEST:CAM:ArrayRate_RBV"));

        // Other channels unaffected
        assert!(cam.array_counter_rbv().await.is_ok());

        cam.clear_faults();
        assert!(cam.array_rate_rbv().await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_fault_is_channel_error() {
        let saver = SimFileSaver::new("TEST:HDF:");
        saver.fail_channel(fields::TIME_STAMP, FaultKind::Disconnected);

        let err = saver.time_stamp().await.unwrap_err();
        assert!(matches!(err, StatusError::Channel { .. }));
    }

    #[tokio::test]
    async fn test_default_readbacks() {
        let cam = SimAdBase::default();
        assert_eq!(cam.acq_exposure_rbv().await.unwrap(), 0.5);
        assert_eq!(cam.acq_period_rbv().await.unwrap(), 1.0);
        assert_eq!(cam.acquire_state().await.unwrap(), AcquireState::Done as i16);
        assert_eq!(cam.data_type().await.unwrap(), NdDataType::UInt16 as i16);

        let mjpg = SimFfMpeg::default();
        assert_eq!(mjpg.dim0_size().await.unwrap(), 720);
        mjpg.set_dimensions(360, 180).await;
        assert_eq!(mjpg.dim1_size().await.unwrap(), 180);
    }

    #[tokio::test]
    async fn test_acquire_frames_advances_counters() {
        let cam = SimAdBase::new("TEST:CAM:");
        let saver = SimFileSaver::new("TEST:HDF:");

        cam.acquire_frames(3, Duration::from_millis(1), Some(&saver)).await;

        assert_eq!(cam.array_counter_rbv().await.unwrap(), 3);
        assert_eq!(cam.num_images_counter_rbv().await.unwrap(), 3);
        assert_eq!(cam.time_remaining_rbv().await.unwrap(), 0.0);
        assert_eq!(cam.acquire_state().await.unwrap(), AcquireState::Done as i16);
        assert_eq!(saver.capture_state().await.unwrap(), CaptureState::Done as i16);
        assert!(saver.time_stamp().await.unwrap() > 0.0);
    }

    #[derive(Default)]
    struct SaverListener {
        sizes: Mutex<Vec<(i32, i32)>>,
        time_stamps: AtomicUsize,
    }

    impl FileSaverViewController for SaverListener {
        fn update_file_save_x(&self, x: i32) {
            self.sizes.lock().unwrap().push((x, 0));
        }

        fn update_file_save_y(&self, y: i32) {
            if let Some(last) = self.sizes.lock().unwrap().last_mut() {
                last.1 = y;
            }
        }

        fn update_file_save_time_stamp(&self, _time_stamp: f64) {
            self.time_stamps.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_acquire_frames_posts_saver_dimensions_and_time_stamps() {
        let cam = SimAdBase::new("TEST:CAM:");
        let saver = SimFileSaver::with_dimensions("TEST:HDF:", 1024, 768);
        let listener = Arc::new(SaverListener::default());
        saver.register_view_controller(listener.clone());

        cam.acquire_frames(2, Duration::from_millis(1), Some(&saver)).await;

        assert_eq!(*listener.sizes.lock().unwrap(), vec![(1024, 768)]);
        assert_eq!(listener.time_stamps.load(Ordering::SeqCst), 2);
    }
}
