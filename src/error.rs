//! Unified error types for the control core.
//!
//! Cycle faults funnel into a single `Copy` enum so they can be latched by
//! the FSM, logged, and surfaced to the poll API without allocation. Each
//! kind carries a stable wire tag (the string the status endpoint reports).

use core::fmt;

// ---------------------------------------------------------------------------
// Cycle faults
// ---------------------------------------------------------------------------

/// Everything that can end (or refuse) a drink cycle.
///
/// The first three are `start()`-time rejections; the rest abort a running
/// cycle through safe-stop. All are terminal until the next successful
/// `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HAL not initialized when `start()` was called.
    NotReady,
    /// A cycle was already in flight.
    Busy,
    /// The order could not be decoded into a known recipe.
    BadMode,
    /// Cup absent during pre-run validation.
    NoCup,
    /// Cup removed after the cycle had committed.
    NoCupDuringRun,
    /// Internal heater exceeded its total run-time budget.
    HeatTimeout,
    /// Internal temperature above the absolute maximum (stuck or miswired probe).
    SensorFail,
    /// Both mixer limit switches asserted at mix start.
    LimitInvalid,
    /// Mixer carriage did not reach its limit switch in time.
    TimeoutLimit,
    /// Operator called `stop()`.
    Aborted,
}

impl ErrorKind {
    /// Stable tag reported by the status surface.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::Busy => "BUSY",
            Self::BadMode => "BAD_MODE",
            Self::NoCup => "NO_CUP",
            Self::NoCupDuringRun => "NO_CUP_DURING_RUN",
            Self::HeatTimeout => "HEAT_TIMEOUT",
            Self::SensorFail => "SENSOR_FAIL",
            Self::LimitInvalid => "LIMIT_INVALID",
            Self::TimeoutLimit => "TIMEOUT_LIMIT",
            Self::Aborted => "ABORTED",
        }
    }

    /// True for the categories a user can clear themselves (replace the cup,
    /// try again). Limit and sensor faults need external diagnosis.
    pub const fn user_recoverable(self) -> bool {
        matches!(
            self,
            Self::NoCup | Self::NoCupDuringRun | Self::HeatTimeout | Self::Busy | Self::Aborted
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::storage::StoragePort) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
