// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error taxonomy shared by the control engine and its collaborators.
//!
//! Startup errors ([`Error::Config`], resolution failures) are fatal.
//! Runtime errors ([`Error::Io`], [`Error::Parse`]) are isolated to the
//! sensor or fan that raised them for the current tick.

use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent configuration entry.
    #[error("invalid config entry '{entry}': {reason}")]
    Config { entry: String, reason: String },

    /// No hwmon device matched the driver (and bus qualifier).
    #[error("no hwmon device found for driver '{driver}'{}", bus_suffix(.bus))]
    NotFound { driver: String, bus: Option<String> },

    /// More than one hwmon device matched; the caller must add a qualifier.
    #[error(
        "driver '{driver}'{} is ambiguous, {} devices match: {}",
        bus_suffix(.bus),
        .matches.len(),
        join_paths(.matches)
    )]
    Ambiguous {
        driver: String,
        bus: Option<String>,
        matches: Vec<PathBuf>,
    },

    /// The resolved device lacks a required attribute (label, pwm file).
    #[error("{} has no attribute '{attribute}'", .device.display())]
    MissingAttribute { device: PathBuf, attribute: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("could not parse '{value}' from {} as a number", .path.display())]
    Parse { path: PathBuf, value: String },

    /// A composite sensor could not be computed because an input failed.
    #[error("sensor '{sensor}' has no reading from input '{input}' this tick")]
    Input { sensor: String, input: String },

    /// Startup failure attributed to the configuration entry that caused it.
    #[error("{entry}: {source}")]
    Init {
        entry: String,
        #[source]
        source: Box<Error>,
    },

    /// Engine operation attempted in the wrong lifecycle state.
    #[error("engine is {actual}, expected {expected}")]
    State {
        expected: &'static str,
        actual: &'static str,
    },
}

impl Error {
    pub fn config(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach the configuration entry being initialized.
    pub fn during(self, entry: impl Into<String>) -> Self {
        Error::Init {
            entry: entry.into(),
            source: Box::new(self),
        }
    }
}

fn bus_suffix(bus: &Option<String>) -> String {
    match bus {
        Some(b) => format!(" on bus '{b}'"),
        None => String::new(),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
