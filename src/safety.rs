//! Cross-cutting safety monitor.
//!
//! Runs **every tick before the FSM** on the fresh sensor snapshot. Two
//! interlocks live here because they apply across many states:
//!
//! 1. **Cup discipline** — every in-flight phase requires the cup. Absence
//!    during validation is the pre-run fault; absence later is the mid-run
//!    abort (the cycle never resumes — replace the cup and start again).
//! 2. **Absolute over-temperature** — if the internal probe reads above
//!    [`INTERNAL_HEATER_ABS_MAX_C`] during an internal-heat phase, the
//!    reading is treated as a stuck or miswired probe and the cycle aborts,
//!    whatever the configured target says. The check is unconditional in
//!    those phases — a runaway probe must fault even on a tick where the
//!    hysteresis loop already commanded the relay off.
//!
//! Phase-local budgets (heater run time, mixer travel) stay in their state
//! handlers.

use log::error;

use crate::error::ErrorKind;
use crate::machine::context::SensorSnapshot;
use crate::machine::StateId;

/// Hard ceiling for the internal thermocouple while heating.
pub const INTERNAL_HEATER_ABS_MAX_C: f32 = 110.0;

/// Stateless interlock evaluation; one instance per machine for symmetry
/// with the rest of the aggregate.
pub struct SafetyMonitor;

impl SafetyMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the interlocks for one in-flight tick.
    /// `None` means the FSM may proceed.
    pub fn check(&self, state: StateId, sensors: &SensorSnapshot) -> Option<ErrorKind> {
        if !sensors.cup_present {
            let kind = if state == StateId::Validate {
                ErrorKind::NoCup
            } else {
                ErrorKind::NoCupDuringRun
            };
            error!("cup absent in {}", state.name());
            return Some(kind);
        }

        if matches!(
            state,
            StateId::HeatInternalPreheat | StateId::HeatInternalActive
        ) {
            if let Some(temp) = sensors.internal_temp_c {
                if temp > INTERNAL_HEATER_ABS_MAX_C {
                    error!("internal temperature {temp:.1} °C above absolute maximum");
                    return Some(ErrorKind::SensorFail);
                }
            }
        }

        None
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new()
    }
}
