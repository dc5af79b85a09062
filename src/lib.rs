// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve control for Linux hwmon devices.
//!
//! Reads temperature sensors, evaluates per-fan curves with hysteresis and
//! response-time debounce, writes PWM duty values, and hands fans back to
//! their original mode on shutdown.

pub mod config;
pub mod control;
pub mod curve;
pub mod engine;
pub mod error;
pub mod fan;
pub mod hwmon;
pub mod sensor;
pub mod status;

#[cfg(test)]
pub(crate) mod test_utils;

pub use engine::{Engine, EngineState};
pub use error::{Error, Result};
