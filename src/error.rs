//! Marker error types distinguished via `anyhow::Error::downcast_ref`.
//!
//! Small `std::error::Error` structs that let a caller branch on *kind*
//! while most call sites just propagate an opaque `anyhow::Error`.

use std::fmt;

/// A child process could not be spawned.
#[derive(Debug)]
pub struct SpawnError {
    pub class_path: String,
    pub source: std::io::Error,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to spawn component {}: {}",
            self.class_path, self.source
        )
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The task queue's region name could not be resolved to anything usable.
///
/// Fatal at `TaskPoller` construction.
#[derive(Debug)]
pub struct UnknownRegion(pub String);

impl fmt::Display for UnknownRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region: {:?}", self.0)
    }
}

impl std::error::Error for UnknownRegion {}

/// The endpoint config file is missing a required key or could not be read.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}
