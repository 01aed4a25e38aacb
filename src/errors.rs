//! Error types for this crate.

use thiserror::Error;

/// Enum for errors in this crate
#[derive(Error, Debug)]
pub enum WhamError {
    /// Error returned when WhamBuilder.build() was called improperly
    #[error("Could not build Wham: {0}")]
    BuilderError(String),

    /// Error returned when the trajectory array is neither 2D nor 3D
    #[error("Trajectory array has {0} dimensions; expected (sims, samples) or (sims, samples, cvs)")]
    InvalidShape(usize),

    /// Error returned when spring constants or centres don't match the trajectories
    #[error("Restraint array of shape {found:?} is incorrect; shape should be {expected:?}")]
    RestraintShape {
        #[allow(missing_docs)]
        found: Vec<usize>,
        #[allow(missing_docs)]
        expected: (usize, usize),
    },

    /// Error returned when an array is the wrong length
    #[error("Array of length {0} is incorrect; length should be {1}")]
    ArrayLengthMismatch(usize, usize),

    /// Error returned when the temperature gives a non-positive or non-finite thermal energy
    #[error("Temperature {0} does not give a positive thermal energy")]
    InvalidTemperature(f64),

    /// Error returned when the burn-in skip leaves nothing to analyse
    #[error("No samples left after skipping {skipped} of {total} per simulation")]
    EmptyEnsemble {
        #[allow(missing_docs)]
        skipped: usize,
        #[allow(missing_docs)]
        total: usize,
    },

    /// Error returned when an operation needs trajectories but setup() was never called
    #[error("No trajectories loaded; call setup() before {0}")]
    NotSetUp(&'static str),

    /// Error returned when reweighting is requested without a free energy estimate
    #[error("No free energy estimate available; call converge() before {0}")]
    NotConverged(&'static str),

    /// Error returned when a test system distribution can't be constructed
    #[error("Invalid sampling distribution: {0}")]
    Distribution(#[from] rand_distr::NormalError),
}

impl From<String> for WhamError {
    fn from(s: String) -> Self {
        Self::BuilderError(s)
    }
}

/// Result type for the wham-rs crate
pub type Result<T> = std::result::Result<T, WhamError>;
