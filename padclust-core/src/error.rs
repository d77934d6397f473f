//! Error types for padclust-core.

use thiserror::Error;

/// Result type alias for padclust operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
///
/// Clustering errors are scoped to a single module: the event driver logs
/// them, skips the module and carries on with the rest of the event. A sink
/// failure ([`Error::Output`]) aborts the event instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No gain/noise calibration is available for a module.
    #[error("missing calibration for module {module}")]
    MissingCalibration { module: u16 },

    /// The geometry does not describe the requested module or row.
    #[error("unknown module/row: module {module}, row {row}")]
    UnknownModule { module: u16, row: u16 },

    /// A sample addresses a cell outside the module.
    #[error("sample out of range: module {module}, row {row}, pad {pad}, time bin {time_bin}")]
    SampleOutOfRange {
        module: u16,
        row: u16,
        pad: u16,
        time_bin: u16,
    },

    /// The row pipeline was driven out of order.
    #[error("invalid row state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Coordinate transform failure.
    #[error("transform error: {0}")]
    Transform(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output container failure.
    #[error("output error: {0}")]
    Output(String),
}

impl Error {
    /// Returns the module the error is scoped to, if any.
    #[must_use]
    pub fn module(&self) -> Option<u16> {
        match self {
            Error::MissingCalibration { module }
            | Error::UnknownModule { module, .. }
            | Error::SampleOutOfRange { module, .. } => Some(*module),
            _ => None,
        }
    }
}
