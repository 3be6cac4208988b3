//! Backtesting — replay resolved picks to tune the blend weight.

pub mod calibration;

pub use calibration::{CalibrationPoint, Calibrator, WeightScore};
