//! # Pixium Status Library
//!
//! Status controller for a Pixium area detector on an EPICS beamline. It listens to three
//! device models (detector driver, file-saver plugin, MJPEG plugin), formats their field
//! updates for display, and fans them out to any number of status views.
//!
//! ## Crate Structure
//!
//! - **`controller`**: `PixiumStatusController`, the model-to-view adapter, with its view
//!   registry, initial-value reads and background bulk refresh.
//! - **`epics`**: the device-model traits and callback tables the controller depends on,
//!   plus simulated models under `epics::sim`.
//! - **`view`**: the `PixiumView` trait and the bundled snapshot and tracing views.
//! - **`display`**: number and EPICS timestamp formatting.
//! - **`config`**: figment-based configuration (TOML file + `PIXIUM_` environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the `StatusError` enum shared across the crate.

pub mod config;
pub mod controller;
pub mod display;
pub mod epics;
pub mod error;
pub mod logging;
pub mod view;

pub use controller::{ControllerBuilder, PixiumStatusController, RefreshHandle};
pub use error::{AppResult, StatusError};
pub use view::PixiumView;
