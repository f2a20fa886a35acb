//! EPICS Device-Model Contracts
//!
//! The status controller never talks channel access itself. It depends on three device
//! models, each an abstraction over a group of process variables served by an areaDetector
//! IOC:
//!
//! - [`AdBaseModel`]: the detector driver (`cam`) plugin. Acquisition settings, counters,
//!   acquire state.
//! - [`FileSaverModel`]: the file-writing plugin. Array dimensions, timestamp, capture state.
//! - [`FfMpegModel`]: the MJPEG streaming plugin. Array dimensions and timestamp only.
//!
//! Models push monitor updates into callback tables ([`AdBaseViewController`],
//! [`FileSaverViewController`]) registered with them, and expose async readbacks for
//! one-shot reads.
//!
//! # Contract
//!
//! - Getters are async and thread-safe (`Send + Sync`, `&self`)
//! - A getter performs one synchronous read of the PV; it does not cache
//! - Failures are reported as [`StatusError::ChannelTimeout`] or [`StatusError::Channel`]
//! - Callbacks may be invoked from any thread, in any order
//!
//! [`StatusError::ChannelTimeout`]: crate::error::StatusError::ChannelTimeout
//! [`StatusError::Channel`]: crate::error::StatusError::Channel

pub mod sim;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::AppResult;

// =============================================================================
// Callback tables
// =============================================================================

/// Receiver of monitor updates from an [`AdBaseModel`].
///
/// Every method defaults to a no-op so implementations only override the fields they
/// display.
pub trait AdBaseViewController: Send + Sync {
    /// `ArrayCounter_RBV` changed.
    fn update_array_counter(&self, _array_counter: i32) {}

    /// `ArrayRate_RBV` changed (frames per second).
    fn update_array_rate(&self, _array_rate: f64) {}

    /// `TimeRemaining_RBV` changed (seconds).
    fn update_time_remaining(&self, _time_remaining: f64) {}

    /// `NumExposuresCounter_RBV` changed.
    fn update_number_of_exposures_counter(&self, _num_exposures_counter: i32) {}

    /// `NumImagesCounter_RBV` changed.
    fn update_number_of_images_counter(&self, _num_images_counter: i32) {}

    /// `Acquire` changed. Raw enum value, see [`AcquireState`].
    fn update_acquire_state(&self, _acquire_state: i16) {}

    /// `AcquireTime_RBV` changed (seconds).
    fn update_acq_exposure(&self, _acq_exposure: f64) {}

    /// `AcquirePeriod_RBV` changed (seconds).
    fn update_acq_period(&self, _acq_period: f64) {}

    /// `DataType_RBV` changed. Raw enum value, see [`NdDataType`].
    fn update_detector_data_type(&self, _data_type: i16) {}
}

/// Receiver of monitor updates from a [`FileSaverModel`].
pub trait FileSaverViewController: Send + Sync {
    /// `ArraySize0_RBV` changed.
    fn update_file_save_x(&self, _file_saver_x: i32) {}

    /// `ArraySize1_RBV` changed.
    fn update_file_save_y(&self, _file_saver_y: i32) {}

    /// `TimeStamp_RBV` changed (seconds since the EPICS epoch, 1990-01-01).
    fn update_file_save_time_stamp(&self, _time_stamp: f64) {}

    /// `Capture_RBV` changed. Raw enum value, see [`CaptureState`].
    fn update_file_saver_capture_state(&self, _capture_state: i16) {}
}

// =============================================================================
// Device models
// =============================================================================

/// Area-detector base model (the driver's `cam` record set).
#[async_trait]
pub trait AdBaseModel: Send + Sync {
    /// Register a callback table for monitor updates.
    fn register_view_controller(&self, controller: Arc<dyn AdBaseViewController>);

    /// Read `ArrayCounter_RBV`.
    async fn array_counter_rbv(&self) -> AppResult<i32>;

    /// Read `ArrayRate_RBV`.
    async fn array_rate_rbv(&self) -> AppResult<f64>;

    /// Read `TimeRemaining_RBV`.
    async fn time_remaining_rbv(&self) -> AppResult<f64>;

    /// Read `NumExposuresCounter_RBV`.
    async fn num_exposures_counter_rbv(&self) -> AppResult<i32>;

    /// Read `NumImagesCounter_RBV`.
    async fn num_images_counter_rbv(&self) -> AppResult<i32>;

    /// Read `AcquireTime_RBV`.
    async fn acq_exposure_rbv(&self) -> AppResult<f64>;

    /// Read `AcquirePeriod_RBV`.
    async fn acq_period_rbv(&self) -> AppResult<f64>;

    /// Read `Acquire`.
    async fn acquire_state(&self) -> AppResult<i16>;

    /// Read `DataType_RBV`.
    async fn data_type(&self) -> AppResult<i16>;
}

/// File-saver plugin model (HDF/TIFF writer).
#[async_trait]
pub trait FileSaverModel: Send + Sync {
    /// Register a callback table for monitor updates.
    fn register_view_controller(&self, controller: Arc<dyn FileSaverViewController>);

    /// Read `ArraySize0_RBV`.
    async fn dim0_size(&self) -> AppResult<i32>;

    /// Read `ArraySize1_RBV`.
    async fn dim1_size(&self) -> AppResult<i32>;

    /// Read `TimeStamp_RBV` (EPICS epoch seconds).
    async fn time_stamp(&self) -> AppResult<f64>;

    /// Read `Capture_RBV`.
    async fn capture_state(&self) -> AppResult<i16>;
}

/// MJPEG streaming plugin model.
#[async_trait]
pub trait FfMpegModel: Send + Sync {
    /// Read `ArraySize0_RBV`.
    async fn dim0_size(&self) -> AppResult<i32>;

    /// Read `ArraySize1_RBV`.
    async fn dim1_size(&self) -> AppResult<i32>;

    /// Read `TimeStamp_RBV` (EPICS epoch seconds).
    async fn time_stamp(&self) -> AppResult<f64>;
}

// =============================================================================
// Enumerations
// =============================================================================

/// Error returned when a raw enum value has no known meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownEnumValue(pub i16);

impl fmt::Display for UnknownEnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown enum value {}", self.0)
    }
}

impl std::error::Error for UnknownEnumValue {}

/// Value of the ADBase `Acquire` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    /// Idle.
    Done = 0,
    /// Acquiring.
    Acquire = 1,
}

impl AcquireState {
    /// Display label as shown by the IOC.
    pub fn label(self) -> &'static str {
        match self {
            AcquireState::Done => "Done",
            AcquireState::Acquire => "Acquire",
        }
    }
}

impl TryFrom<i16> for AcquireState {
    type Error = UnknownEnumValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AcquireState::Done),
            1 => Ok(AcquireState::Acquire),
            other => Err(UnknownEnumValue(other)),
        }
    }
}

/// Value of the file plugin `Capture_RBV` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not capturing.
    Done = 0,
    /// Capture in progress.
    Capturing = 1,
}

impl CaptureState {
    /// Display label as shown by the IOC.
    pub fn label(self) -> &'static str {
        match self {
            CaptureState::Done => "Done",
            CaptureState::Capturing => "Capturing",
        }
    }
}

impl TryFrom<i16> for CaptureState {
    type Error = UnknownEnumValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CaptureState::Done),
            1 => Ok(CaptureState::Capturing),
            other => Err(UnknownEnumValue(other)),
        }
    }
}

/// NDArray element type (`DataType_RBV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdDataType {
    /// Signed 8-bit.
    Int8 = 0,
    /// Unsigned 8-bit.
    UInt8 = 1,
    /// Signed 16-bit.
    Int16 = 2,
    /// Unsigned 16-bit.
    UInt16 = 3,
    /// Signed 32-bit.
    Int32 = 4,
    /// Unsigned 32-bit.
    UInt32 = 5,
    /// 32-bit float.
    Float32 = 6,
    /// 64-bit float.
    Float64 = 7,
}

impl NdDataType {
    /// Display label as shown by the IOC.
    pub fn label(self) -> &'static str {
        match self {
            NdDataType::Int8 => "Int8",
            NdDataType::UInt8 => "UInt8",
            NdDataType::Int16 => "Int16",
            NdDataType::UInt16 => "UInt16",
            NdDataType::Int32 => "Int32",
            NdDataType::UInt32 => "UInt32",
            NdDataType::Float32 => "Float32",
            NdDataType::Float64 => "Float64",
        }
    }
}

impl TryFrom<i16> for NdDataType {
    type Error = UnknownEnumValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => NdDataType::Int8,
            1 => NdDataType::UInt8,
            2 => NdDataType::Int16,
            3 => NdDataType::UInt16,
            4 => NdDataType::Int32,
            5 => NdDataType::UInt32,
            6 => NdDataType::Float32,
            7 => NdDataType::Float64,
            other => return Err(UnknownEnumValue(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_state_decoding() {
        assert_eq!(AcquireState::try_from(0), Ok(AcquireState::Done));
        assert_eq!(AcquireState::try_from(1), Ok(AcquireState::Acquire));
        assert_eq!(AcquireState::try_from(2), Err(UnknownEnumValue(2)));
        assert_eq!(AcquireState::Acquire.label(), "Acquire");
    }

    #[test]
    fn test_capture_state_decoding() {
        assert_eq!(CaptureState::try_from(1), Ok(CaptureState::Capturing));
        assert!(CaptureState::try_from(-1).is_err());
    }

    #[test]
    fn test_data_type_round_trip_of_all_values() {
        for raw in 0..=7i16 {
            let decoded = NdDataType::try_from(raw).unwrap();
            assert_eq!(decoded as i16, raw);
        }
        assert_eq!(NdDataType::try_from(3).unwrap().label(), "UInt16");
        assert!(NdDataType::try_from(8).is_err());
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        struct Silent;
        impl AdBaseViewController for Silent {}
        impl FileSaverViewController for Silent {}

        let silent = Silent;
        silent.update_array_counter(1);
        silent.update_detector_data_type(7);
        silent.update_file_save_time_stamp(0.0);
    }
}
