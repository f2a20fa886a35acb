//! Pixium Status Controller
//!
//! Connects the three EPICS device models of a Pixium detector to any number of
//! [`PixiumView`]s. The controller:
//!
//! 1. registers its callback tables with the ad-base and file-saver models, so monitor
//!    updates are pushed to it,
//! 2. formats every update into a display string and fans it out to all registered views,
//! 3. offers one-shot reads of initial values for views that are being built, and
//! 4. can re-read every tracked field in the background ([`update_all_fields`]).
//!
//! # Threading
//!
//! The view registry sits behind a lock shared by the controller and its callback tables.
//! Notifications iterate over a snapshot of the registry, so a view may add or remove
//! views from inside a callback. Callbacks may arrive from any thread.
//!
//! Bulk refreshes are spawned on the runtime handle given at construction; no executor
//! is created per call.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = PixiumStatusController::builder()
//!     .ad_base_model(cam.clone())
//!     .file_saver_model(hdf.clone())
//!     .ff_mpeg_model(mjpg.clone())
//!     .build()?;
//!
//! controller.add_view(Arc::new(SnapshotView::new()));
//! controller.update_all_fields().wait().await?;
//! ```
//!
//! [`update_all_fields`]: PixiumStatusController::update_all_fields

use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info_span, warn, Instrument};

use crate::display::{format_double, format_epics_timestamp, format_int};
use crate::epics::{
    AdBaseModel, AdBaseViewController, FfMpegModel, FileSaverModel, FileSaverViewController,
    NdDataType,
};
use crate::error::{AppResult, StatusError};
use crate::view::PixiumView;

// =============================================================================
// View registry
// =============================================================================

/// Shared, lock-protected list of views. Insertion order is kept; duplicates are allowed.
#[derive(Clone, Default)]
struct ViewRegistry {
    views: Arc<RwLock<Vec<Arc<dyn PixiumView>>>>,
}

impl ViewRegistry {
    fn add(&self, view: Arc<dyn PixiumView>) {
        self.views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(view);
    }

    /// Remove the first entry that is the same object as `view`.
    fn remove(&self, view: &Arc<dyn PixiumView>) -> bool {
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        match views.iter().position(|v| same_view(v, view)) {
            Some(index) => {
                views.remove(index);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Call `update` on every view registered at the time of the call.
    fn notify(&self, update: impl Fn(&dyn PixiumView)) {
        let views = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for view in &views {
            update(view.as_ref());
        }
    }
}

/// Identity comparison on the data pointer; vtable pointers may differ across codegen units.
fn same_view(a: &Arc<dyn PixiumView>, b: &Arc<dyn PixiumView>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// =============================================================================
// Callback tables
// =============================================================================

/// Translates ad-base monitor updates into view updates.
struct AdBaseStatusUpdater {
    views: ViewRegistry,
}

impl AdBaseViewController for AdBaseStatusUpdater {
    fn update_array_counter(&self, array_counter: i32) {
        let text = format_int(array_counter);
        self.views.notify(|v| v.set_array_counter(&text));
    }

    fn update_array_rate(&self, array_rate: f64) {
        let text = format_double(array_rate);
        self.views.notify(|v| v.set_array_rate(&text));
    }

    fn update_time_remaining(&self, time_remaining: f64) {
        let text = format_double(time_remaining);
        self.views.notify(|v| v.set_time(&text));
    }

    fn update_number_of_exposures_counter(&self, num_exposures_counter: i32) {
        let text = format_int(num_exposures_counter);
        self.views.notify(|v| v.set_exp(&text));
    }

    fn update_number_of_images_counter(&self, num_images_counter: i32) {
        let text = format_int(num_images_counter);
        self.views.notify(|v| v.set_img(&text));
    }

    fn update_acquire_state(&self, acquire_state: i16) {
        self.views.notify(|v| v.set_acquire_state(acquire_state));
    }

    fn update_acq_exposure(&self, acq_exposure: f64) {
        let text = format_double(acq_exposure);
        self.views.notify(|v| v.set_acq_exposure(&text));
    }

    fn update_acq_period(&self, acq_period: f64) {
        let text = format_double(acq_period);
        self.views.notify(|v| v.set_acq_period(&text));
    }

    fn update_detector_data_type(&self, data_type: i16) {
        // Views have no data type field
        match NdDataType::try_from(data_type) {
            Ok(decoded) => debug!(data_type = decoded.label(), "Detector data type"),
            Err(err) => debug!(data_type, %err, "Detector data type"),
        }
    }
}

/// Translates file-saver monitor updates into view updates.
struct FileSaverStatusUpdater {
    views: ViewRegistry,
}

impl FileSaverViewController for FileSaverStatusUpdater {
    fn update_file_save_x(&self, file_saver_x: i32) {
        let text = format_int(file_saver_x);
        self.views.notify(|v| v.set_file_saver_x(&text));
    }

    fn update_file_save_y(&self, file_saver_y: i32) {
        let text = format_int(file_saver_y);
        self.views.notify(|v| v.set_file_saver_y(&text));
    }

    fn update_file_save_time_stamp(&self, time_stamp: f64) {
        match format_epics_timestamp(time_stamp) {
            Ok(text) => self.views.notify(|v| v.set_file_saver_time_stamp(&text)),
            Err(err) => warn!(%err, "Dropping file saver timestamp update"),
        }
    }

    fn update_file_saver_capture_state(&self, capture_state: i16) {
        self.views.notify(|v| v.set_file_saver_capture_state(capture_state));
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Status controller for a Pixium detector.
pub struct PixiumStatusController {
    ad_base_model: Option<Arc<dyn AdBaseModel>>,
    file_saver_model: Option<Arc<dyn FileSaverModel>>,
    ff_mpeg_model: Option<Arc<dyn FfMpegModel>>,
    views: ViewRegistry,
    ad_base_updater: Arc<AdBaseStatusUpdater>,
    file_saver_updater: Arc<FileSaverStatusUpdater>,
    executor: Handle,
}

impl std::fmt::Debug for PixiumStatusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixiumStatusController")
            .field("has_ad_base_model", &self.ad_base_model.is_some())
            .field("has_file_saver_model", &self.file_saver_model.is_some())
            .field("has_ff_mpeg_model", &self.ff_mpeg_model.is_some())
            .field("views", &self.views.len())
            .finish()
    }
}

impl PixiumStatusController {
    /// Create an unconfigured controller whose bulk refreshes run on `executor`.
    ///
    /// Models must be set and [`validate`](Self::validate) must pass before use.
    pub fn new(executor: Handle) -> Self {
        let views = ViewRegistry::default();
        Self {
            ad_base_model: None,
            file_saver_model: None,
            ff_mpeg_model: None,
            ad_base_updater: Arc::new(AdBaseStatusUpdater {
                views: views.clone(),
            }),
            file_saver_updater: Arc::new(FileSaverStatusUpdater {
                views: views.clone(),
            }),
            views,
            executor,
        }
    }

    /// Start building a fully wired controller.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Set the ad-base model and register for its updates.
    pub fn set_ad_base_model(&mut self, model: Arc<dyn AdBaseModel>) {
        model.register_view_controller(self.ad_base_updater.clone());
        self.ad_base_model = Some(model);
    }

    /// Set the file-saver model and register for its updates.
    pub fn set_file_saver_model(&mut self, model: Arc<dyn FileSaverModel>) {
        model.register_view_controller(self.file_saver_updater.clone());
        self.file_saver_model = Some(model);
    }

    /// Set the MJPEG plugin model. It has no update table; only initial reads use it.
    pub fn set_ff_mpeg_model(&mut self, model: Arc<dyn FfMpegModel>) {
        self.ff_mpeg_model = Some(model);
    }

    /// Forget the ad-base model. Callbacks already registered with it stay registered.
    pub fn clear_ad_base_model(&mut self) {
        self.ad_base_model = None;
    }

    /// Forget the file-saver model. Callbacks already registered with it stay registered.
    pub fn clear_file_saver_model(&mut self) {
        self.file_saver_model = None;
    }

    /// Forget the MJPEG plugin model.
    pub fn clear_ff_mpeg_model(&mut self) {
        self.ff_mpeg_model = None;
    }

    /// The configured ad-base model.
    pub fn ad_base_model(&self) -> Option<&Arc<dyn AdBaseModel>> {
        self.ad_base_model.as_ref()
    }

    /// The configured file-saver model.
    pub fn file_saver_model(&self) -> Option<&Arc<dyn FileSaverModel>> {
        self.file_saver_model.as_ref()
    }

    /// The configured MJPEG plugin model.
    pub fn ff_mpeg_model(&self) -> Option<&Arc<dyn FfMpegModel>> {
        self.ff_mpeg_model.as_ref()
    }

    /// Check that all three models are set.
    ///
    /// Fails with [`StatusError::Configuration`] naming the first missing model.
    pub fn validate(&self) -> AppResult<()> {
        self.ad_base()?;
        self.file_saver()?;
        self.ff_mpeg()?;
        Ok(())
    }

    fn ad_base(&self) -> AppResult<&Arc<dyn AdBaseModel>> {
        self.ad_base_model
            .as_ref()
            .ok_or_else(|| missing_model("ad_base_model"))
    }

    fn file_saver(&self) -> AppResult<&Arc<dyn FileSaverModel>> {
        self.file_saver_model
            .as_ref()
            .ok_or_else(|| missing_model("file_saver_model"))
    }

    fn ff_mpeg(&self) -> AppResult<&Arc<dyn FfMpegModel>> {
        self.ff_mpeg_model
            .as_ref()
            .ok_or_else(|| missing_model("ff_mpeg_model"))
    }

    // -------------------------------------------------------------------------
    // View registry
    // -------------------------------------------------------------------------

    /// Register a view for updates. The same view may be added more than once.
    pub fn add_view(&self, view: Arc<dyn PixiumView>) {
        self.views.add(view);
    }

    /// Unregister one registration of `view`. Returns false if it was not registered.
    pub fn remove_view(&self, view: &Arc<dyn PixiumView>) -> bool {
        self.views.remove(view)
    }

    /// Number of registrations.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    // -------------------------------------------------------------------------
    // Initial values
    // -------------------------------------------------------------------------

    /// Current array counter.
    pub async fn initial_array_counter(&self) -> AppResult<String> {
        Ok(format_int(self.ad_base()?.array_counter_rbv().await?))
    }

    /// Current array rate.
    pub async fn initial_array_rate(&self) -> AppResult<String> {
        Ok(format_double(self.ad_base()?.array_rate_rbv().await?))
    }

    /// Current time remaining.
    pub async fn initial_time_remaining(&self) -> AppResult<String> {
        Ok(format_double(self.ad_base()?.time_remaining_rbv().await?))
    }

    /// Current exposures counter.
    pub async fn initial_remaining_exposures(&self) -> AppResult<String> {
        Ok(format_int(self.ad_base()?.num_exposures_counter_rbv().await?))
    }

    /// Current images counter.
    pub async fn initial_remaining_images(&self) -> AppResult<String> {
        Ok(format_int(self.ad_base()?.num_images_counter_rbv().await?))
    }

    /// Current exposure time.
    pub async fn initial_acq_exposure(&self) -> AppResult<String> {
        Ok(format_double(self.ad_base()?.acq_exposure_rbv().await?))
    }

    /// Current acquire period.
    pub async fn initial_acq_period(&self) -> AppResult<String> {
        Ok(format_double(self.ad_base()?.acq_period_rbv().await?))
    }

    /// Current raw acquire state.
    pub async fn initial_acq_status(&self) -> AppResult<i16> {
        self.ad_base()?.acquire_state().await
    }

    /// Current file saver X dimension.
    pub async fn initial_file_saver_x(&self) -> AppResult<String> {
        Ok(format_int(self.file_saver()?.dim0_size().await?))
    }

    /// Current file saver Y dimension.
    pub async fn initial_file_saver_y(&self) -> AppResult<String> {
        Ok(format_int(self.file_saver()?.dim1_size().await?))
    }

    /// Current file saver timestamp, formatted.
    pub async fn initial_file_saver_timestamp(&self) -> AppResult<String> {
        format_epics_timestamp(self.file_saver()?.time_stamp().await?)
    }

    /// Current raw file saver capture state.
    pub async fn initial_file_saver_capture_status(&self) -> AppResult<i16> {
        self.file_saver()?.capture_state().await
    }

    /// Current MJPEG stream X dimension.
    pub async fn initial_mjpeg_x(&self) -> AppResult<String> {
        Ok(format_int(self.ff_mpeg()?.dim0_size().await?))
    }

    /// Current MJPEG stream Y dimension.
    pub async fn initial_mjpeg_y(&self) -> AppResult<String> {
        Ok(format_int(self.ff_mpeg()?.dim1_size().await?))
    }

    /// Current MJPEG stream timestamp, formatted.
    pub async fn initial_mjpeg_timestamp(&self) -> AppResult<String> {
        format_epics_timestamp(self.ff_mpeg()?.time_stamp().await?)
    }

    // -------------------------------------------------------------------------
    // Bulk refresh
    // -------------------------------------------------------------------------

    /// Re-read every tracked field and push it to the views, in the background.
    ///
    /// Fields are read and applied one at a time in a fixed order: exposure, period,
    /// acquire state, array counter, array rate, exposures, images, time remaining,
    /// data type, then capture state, timestamp, X and Y from the file saver.
    ///
    /// The first failed read aborts the refresh. Updates already pushed to views are
    /// not rolled back. The failure is logged and returned through the handle.
    pub fn update_all_fields(&self) -> RefreshHandle {
        let ad_base = self.ad_base_model.clone();
        let file_saver = self.file_saver_model.clone();
        let ad_base_updater = self.ad_base_updater.clone();
        let file_saver_updater = self.file_saver_updater.clone();

        let task = self.executor.spawn(
            async move {
                let result =
                    refresh_fields(ad_base, file_saver, &*ad_base_updater, &*file_saver_updater)
                        .await;
                if let Err(err) = &result {
                    if err.is_timeout() {
                        error!(error = %err, "IOC doesn't seem to be running");
                    } else {
                        error!(error = %err, "Problem with loading the channel");
                    }
                }
                result
            }
            .instrument(info_span!("bulk_refresh")),
        );

        RefreshHandle { task }
    }
}

async fn refresh_fields(
    ad_base: Option<Arc<dyn AdBaseModel>>,
    file_saver: Option<Arc<dyn FileSaverModel>>,
    ad_base_updater: &dyn AdBaseViewController,
    file_saver_updater: &dyn FileSaverViewController,
) -> AppResult<()> {
    let ad_base = ad_base.ok_or_else(|| missing_model("ad_base_model"))?;
    let file_saver = file_saver.ok_or_else(|| missing_model("file_saver_model"))?;

    ad_base_updater.update_acq_exposure(ad_base.acq_exposure_rbv().await?);
    ad_base_updater.update_acq_period(ad_base.acq_period_rbv().await?);
    ad_base_updater.update_acquire_state(ad_base.acquire_state().await?);
    ad_base_updater.update_array_counter(ad_base.array_counter_rbv().await?);
    ad_base_updater.update_array_rate(ad_base.array_rate_rbv().await?);
    ad_base_updater.update_number_of_exposures_counter(ad_base.num_exposures_counter_rbv().await?);
    ad_base_updater.update_number_of_images_counter(ad_base.num_images_counter_rbv().await?);
    ad_base_updater.update_time_remaining(ad_base.time_remaining_rbv().await?);
    ad_base_updater.update_detector_data_type(ad_base.data_type().await?);

    file_saver_updater.update_file_saver_capture_state(file_saver.capture_state().await?);
    file_saver_updater.update_file_save_time_stamp(file_saver.time_stamp().await?);
    file_saver_updater.update_file_save_x(file_saver.dim0_size().await?);
    file_saver_updater.update_file_save_y(file_saver.dim1_size().await?);

    debug!("Bulk refresh complete");
    Ok(())
}

fn missing_model(name: &str) -> StatusError {
    StatusError::Configuration(format!("{name} needs to be defined."))
}

// =============================================================================
// RefreshHandle
// =============================================================================

/// Completion handle of a bulk refresh.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<AppResult<()>>,
}

impl RefreshHandle {
    /// Wait for the refresh to finish.
    ///
    /// Returns the first read failure, or [`StatusError::RefreshTask`] if the task
    /// panicked or was aborted.
    pub async fn wait(self) -> AppResult<()> {
        self.task.await?
    }

    /// True once the refresh has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the refresh. Updates already applied stay applied.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Handle that can cancel the refresh after `self` has been consumed by [`wait`].
    ///
    /// [`wait`]: RefreshHandle::wait
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }
}

// =============================================================================
// ControllerBuilder
// =============================================================================

/// Wires the three models into a validated controller.
#[derive(Default)]
pub struct ControllerBuilder {
    ad_base_model: Option<Arc<dyn AdBaseModel>>,
    file_saver_model: Option<Arc<dyn FileSaverModel>>,
    ff_mpeg_model: Option<Arc<dyn FfMpegModel>>,
    executor: Option<Handle>,
}

impl ControllerBuilder {
    /// Area-detector base model.
    pub fn ad_base_model(mut self, model: Arc<dyn AdBaseModel>) -> Self {
        self.ad_base_model = Some(model);
        self
    }

    /// File-saver plugin model.
    pub fn file_saver_model(mut self, model: Arc<dyn FileSaverModel>) -> Self {
        self.file_saver_model = Some(model);
        self
    }

    /// MJPEG plugin model.
    pub fn ff_mpeg_model(mut self, model: Arc<dyn FfMpegModel>) -> Self {
        self.ff_mpeg_model = Some(model);
        self
    }

    /// Runtime for bulk refreshes. Defaults to the runtime `build` is called from.
    pub fn executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Register with the models and validate.
    pub fn build(self) -> AppResult<PixiumStatusController> {
        let executor = match self.executor {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                StatusError::Configuration(format!("no tokio runtime for refresh tasks: {e}"))
            })?,
        };

        let mut controller = PixiumStatusController::new(executor);
        if let Some(model) = self.ad_base_model {
            controller.set_ad_base_model(model);
        }
        if let Some(model) = self.file_saver_model {
            controller.set_file_saver_model(model);
        }
        if let Some(model) = self.ff_mpeg_model {
            controller.set_ff_mpeg_model(model);
        }
        controller.validate()?;
        Ok(controller)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epics::sim::{fields, FaultKind, SimAdBase, SimFfMpeg, SimFileSaver};
    use crate::view::SnapshotView;
    use tracing_test::traced_test;

    fn unconfigured() -> PixiumStatusController {
        PixiumStatusController::new(Handle::current())
    }

    #[tokio::test]
    async fn test_validate_requires_every_model() {
        let mut controller = unconfigured();
        let err = controller.validate().unwrap_err();
        assert!(err.to_string().contains("ad_base_model"));

        controller.set_ad_base_model(Arc::new(SimAdBase::default()));
        let err = controller.validate().unwrap_err();
        assert!(err.to_string().contains("file_saver_model"));

        controller.set_file_saver_model(Arc::new(SimFileSaver::default()));
        let err = controller.validate().unwrap_err();
        assert!(err.to_string().contains("ff_mpeg_model"));

        controller.set_ff_mpeg_model(Arc::new(SimFfMpeg::default()));
        assert!(controller.validate().is_ok());

        controller.clear_file_saver_model();
        assert!(matches!(
            controller.validate(),
            Err(StatusError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_setters_register_callback_tables() {
        let cam = Arc::new(SimAdBase::default());
        let hdf = Arc::new(SimFileSaver::default());
        let mut controller = unconfigured();

        controller.set_ad_base_model(cam.clone());
        controller.set_file_saver_model(hdf.clone());

        assert_eq!(cam.listener_count(), 1);
        assert_eq!(hdf.listener_count(), 1);
        assert!(controller.ad_base_model().is_some());
        assert!(controller.ff_mpeg_model().is_none());
    }

    #[tokio::test]
    async fn test_initial_value_without_model_is_configuration_error() {
        let controller = unconfigured();
        assert!(matches!(
            controller.initial_mjpeg_x().await,
            Err(StatusError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_without_runtime_fails() {
        let result = PixiumStatusController::builder()
            .ad_base_model(Arc::new(SimAdBase::default()))
            .file_saver_model(Arc::new(SimFileSaver::default()))
            .ff_mpeg_model(Arc::new(SimFfMpeg::default()))
            .build();
        assert!(matches!(result, Err(StatusError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_view_removed_by_identity() {
        let controller = unconfigured();
        let first: Arc<dyn PixiumView> = Arc::new(SnapshotView::new());
        let second: Arc<dyn PixiumView> = Arc::new(SnapshotView::new());

        controller.add_view(first.clone());
        controller.add_view(second.clone());
        controller.add_view(first.clone());
        assert_eq!(controller.view_count(), 3);

        assert!(controller.remove_view(&first));
        assert_eq!(controller.view_count(), 2);
        assert!(controller.remove_view(&first));
        assert!(!controller.remove_view(&first));
        assert_eq!(controller.view_count(), 1);
        assert!(controller.remove_view(&second));
        assert_eq!(controller.view_count(), 0);
    }

    #[tokio::test]
    async fn test_bulk_refresh_with_missing_model_fails() {
        let controller = unconfigured();
        let result = controller.update_all_fields().wait().await;
        assert!(matches!(result, Err(StatusError::Configuration(_))));
    }

    async fn wired() -> (PixiumStatusController, Arc<SimAdBase>, Arc<SimFileSaver>) {
        let cam = Arc::new(SimAdBase::new("TEST:CAM:"));
        let hdf = Arc::new(SimFileSaver::new("TEST:HDF:"));
        let controller = PixiumStatusController::builder()
            .ad_base_model(cam.clone())
            .file_saver_model(hdf.clone())
            .ff_mpeg_model(Arc::new(SimFfMpeg::new("TEST:MJPG:")))
            .build()
            .unwrap();
        (controller, cam, hdf)
    }

    #[tokio::test]
    #[traced_test]
    async fn refresh_timeout_is_logged_as_ioc_down() {
        let (controller, cam, _hdf) = wired().await;
        cam.fail_channel(fields::ACQUIRE_PERIOD, FaultKind::Timeout);

        let err = controller.update_all_fields().wait().await.unwrap_err();

        assert!(err.is_timeout());
        assert!(logs_contain("IOC doesn't seem to be running"));
        assert!(logs_contain("TEST:CAM:AcquirePeriod_RBV"));
    }

    #[tokio::test]
    #[traced_test]
    async fn refresh_channel_failure_is_logged() {
        let (controller, _cam, hdf) = wired().await;
        hdf.fail_channel(fields::ARRAY_SIZE_1, FaultKind::Disconnected);

        let err = controller.update_all_fields().wait().await.unwrap_err();

        assert_eq!(err.channel(), Some("TEST:HDF:ArraySize1_RBV"));
        assert!(logs_contain("Problem with loading the channel"));
        assert!(!logs_contain("IOC doesn't seem to be running"));
    }

    #[tokio::test]
    async fn test_refresh_handle_reports_completion() {
        let (controller, _cam, _hdf) = wired().await;
        let handle = controller.update_all_fields();
        handle.wait().await.unwrap();

        let handle = controller.update_all_fields();
        tokio::task::yield_now().await;
        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(handle.is_finished());
        assert!(handle.wait().await.is_ok());
    }

    struct PanickingView;

    impl PixiumView for PanickingView {
        fn set_array_counter(&self, _value: &str) {
            panic!("boom");
        }
        fn set_array_rate(&self, _value: &str) {}
        fn set_time(&self, _value: &str) {}
        fn set_exp(&self, _value: &str) {}
        fn set_img(&self, _value: &str) {}
        fn set_acquire_state(&self, _state: i16) {}
        fn set_acq_exposure(&self, _value: &str) {}
        fn set_acq_period(&self, _value: &str) {}
        fn set_file_saver_x(&self, _value: &str) {}
        fn set_file_saver_y(&self, _value: &str) {}
        fn set_file_saver_time_stamp(&self, _value: &str) {}
        fn set_file_saver_capture_state(&self, _state: i16) {}
    }

    #[tokio::test]
    async fn test_refresh_panic_becomes_task_error() {
        let (controller, _cam, _hdf) = wired().await;
        let view = Arc::new(SnapshotView::new());
        controller.add_view(view.clone());
        controller.add_view(Arc::new(PanickingView));

        let err = controller.update_all_fields().wait().await.unwrap_err();

        match err {
            StatusError::RefreshTask(message) => assert!(message.contains("panicked")),
            other => panic!("unexpected error: {other:?}"),
        }
        // Fields before the array counter were already applied
        assert_eq!(view.snapshot().acq_exposure.as_deref(), Some("0.5"));
    }

    #[tokio::test]
    async fn test_aborted_refresh_reports_cancellation() {
        let (controller, _cam, _hdf) = wired().await;
        let view = Arc::new(SnapshotView::new());
        controller.add_view(view.clone());

        // The current-thread runtime has not polled the task yet
        let handle = controller.update_all_fields();
        handle.abort();

        match handle.wait().await {
            Err(StatusError::RefreshTask(message)) => assert_eq!(message, "task was cancelled"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(view.update_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_handle_cancels_consumed_refresh() {
        let (controller, _cam, _hdf) = wired().await;
        let handle = controller.update_all_fields();
        let abort = handle.abort_handle();
        abort.abort();

        let result = handle.wait().await;
        assert!(matches!(result, Err(StatusError::RefreshTask(_))));
        assert!(abort.is_finished());
    }
}
