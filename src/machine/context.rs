//! Shared mutable context threaded through every state handler.
//!
//! `CycleContext` is the blackboard the handlers read from and write to:
//! the latest sensor snapshot, the desired relay set, the order and its
//! settings snapshot, and the per-cycle scratch. Handlers never touch the
//! HAL — the controller reads sensors before the FSM tick and applies the
//! relay set after it.

use crate::config::Settings;
use crate::control::BangBang;
use crate::error::ErrorKind;
use crate::hal::RelayChannel;
use crate::order::OrderParams;

use super::StateId;

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by the controller)
// ---------------------------------------------------------------------------

/// Point-in-time reading of every sensor the cycle consults.
#[derive(Debug, Clone, Copy)]
pub struct SensorSnapshot {
    /// Ultrasonic cup detection (false also on echo timeout).
    pub cup_present: bool,
    /// Internal thermocouple; `None` on sensor fault.
    pub internal_temp_c: Option<f32>,
    /// External thermocouple, telemetry only.
    pub external_temp_c: Option<f32>,
    /// Debounced upper limit switch.
    pub limit_upper: bool,
    /// Debounced lower limit switch.
    pub limit_lower: bool,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            cup_present: false,
            internal_temp_c: None,
            external_temp_c: None,
            limit_upper: false,
            limit_lower: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Desired relay set (written by state handlers; applied by the controller)
// ---------------------------------------------------------------------------

/// The set of channels a handler wants energized, as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCommands(u16);

impl RelayCommands {
    pub fn on(&mut self, ch: RelayChannel) {
        self.0 |= ch.mask();
    }

    pub fn off(&mut self, ch: RelayChannel) {
        self.0 &= !ch.mask();
    }

    pub fn set(&mut self, ch: RelayChannel, energized: bool) {
        if energized {
            self.on(ch);
        } else {
            self.off(ch);
        }
    }

    pub fn is_on(&self, ch: RelayChannel) -> bool {
        self.0 & ch.mask() != 0
    }

    /// Safe default: nothing energized.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

// ---------------------------------------------------------------------------
// CycleContext
// ---------------------------------------------------------------------------

/// The blackboard passed to every state handler.
pub struct CycleContext {
    // -- Timing --
    /// Monotonic wall clock, refreshed by the controller before each tick.
    pub now_ms: u64,
    /// Stamped by the engine whenever a state is entered.
    pub state_start_ms: u64,
    /// Set when the internal heater phase begins; spans preheat and active
    /// heating so the budget covers both.
    pub heater_start_ms: Option<u64>,

    // -- Per-cycle scratch --
    /// Preheat handoff threshold, derived from the target at cycle start.
    pub preheat_target_c: f32,
    /// Total pumping budget for the current liquid phase.
    pub pump_duration_ms: u64,
    /// Water share of a phased water-then-milk pour.
    pub water_duration_ms: u64,
    /// Milk share of a phased water-then-milk pour.
    pub milk_duration_ms: u64,
    /// Hysteresis regulator bound to this cycle's target temperature.
    pub heater: BangBang,

    // -- Inputs --
    /// The order being executed; `None` only before the first `start()`.
    pub order: Option<OrderParams>,
    /// Settings snapshot copied at `start()`; later edits don't reach a
    /// running cycle.
    pub cfg: Settings,
    /// Latest sensor readings.
    pub sensors: SensorSnapshot,

    // -- Outputs --
    /// Desired relay set, applied by the controller after each tick.
    pub relays: RelayCommands,
    /// Human-readable progress string for the status surface.
    pub step: &'static str,
    /// Latched fault; sticky until the next successful `start()`.
    pub error: Option<ErrorKind>,
}

impl CycleContext {
    pub fn new(cfg: Settings) -> Self {
        Self {
            now_ms: 0,
            state_start_ms: 0,
            heater_start_ms: None,
            preheat_target_c: 0.0,
            pump_duration_ms: 0,
            water_duration_ms: 0,
            milk_duration_ms: 0,
            heater: BangBang::new(cfg.int_heater_temp),
            order: None,
            cfg,
            sensors: SensorSnapshot::default(),
            relays: RelayCommands::default(),
            step: "",
            error: None,
        }
    }

    /// Reset the scratch for a fresh cycle.
    pub fn begin_cycle(&mut self, order: OrderParams, cfg: Settings, now_ms: u64) {
        self.now_ms = now_ms;
        self.state_start_ms = now_ms;
        self.heater_start_ms = None;
        self.preheat_target_c = 0.0;
        self.pump_duration_ms = 0;
        self.water_duration_ms = 0;
        self.milk_duration_ms = 0;
        self.heater = BangBang::new(cfg.int_heater_temp);
        self.order = Some(order);
        self.cfg = cfg;
        self.relays.clear();
        self.step = "";
        self.error = None;
    }

    /// Milliseconds since the current state was entered.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_start_ms)
    }

    /// Milliseconds the internal heater phase has been running.
    pub fn heater_elapsed_ms(&self) -> u64 {
        match self.heater_start_ms {
            Some(t0) => self.now_ms.saturating_sub(t0),
            None => 0,
        }
    }

    /// Latch a fault and route the FSM to `Error`.
    pub fn fail(&mut self, kind: ErrorKind) -> Option<StateId> {
        self.error = Some(kind);
        Some(StateId::Error)
    }
}
