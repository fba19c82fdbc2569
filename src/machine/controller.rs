//! Cycle controller — the owning orchestrator around the FSM.
//!
//! One `Machine` exists per appliance, created at boot. Each `tick()` runs
//! the fixed pipeline:
//!
//! ```text
//!   read sensors ──▶ safety monitor ──▶ FSM tick ──▶ apply relay set
//! ```
//!
//! The HAL and clock are passed in by the caller, so the whole controller
//! runs against mocks with an injected timeline. At most one cycle is in
//! flight; `start()` while busy is rejected without touching the running
//! cycle, and every abort path funnels through [`Machine::safe_stop`].

use heapless::Vec;
use log::{error, info, warn};

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::ErrorKind;
use crate::hal::{HalPort, RelayChannel};
use crate::order::OrderParams;
use crate::safety::SafetyMonitor;

use super::context::{CycleContext, SensorSnapshot};
use super::states::build_state_table;
use super::{Fsm, StateId};

/// Transitions retained for diagnostics.
const HISTORY_DEPTH: usize = 16;

/// One retained state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
    pub at_ms: u64,
    pub from: StateId,
    pub to: StateId,
}

/// The drink-cycle controller.
pub struct Machine {
    fsm: Fsm,
    ctx: CycleContext,
    safety: SafetyMonitor,
    history: Vec<TransitionRecord, HISTORY_DEPTH>,
}

impl Machine {
    pub fn new(cfg: Settings) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: CycleContext::new(cfg),
            safety: SafetyMonitor::new(),
            history: Vec::new(),
        }
    }

    // ── Entry points ──────────────────────────────────────────

    /// Begin a cycle. Copies the order and the settings snapshot, clears
    /// the scratch, and moves to `Validate`. Rejections record an error
    /// kind but never disturb a running cycle or energize anything.
    pub fn start(
        &mut self,
        order: OrderParams,
        hal: &mut impl HalPort,
        cfg: Settings,
        clock: &impl Clock,
    ) -> bool {
        if !hal.ready() {
            warn!("start refused: hardware not ready");
            self.ctx.error = Some(ErrorKind::NotReady);
            return false;
        }
        if self.busy() {
            warn!("start refused: cycle in flight");
            self.ctx.error = Some(ErrorKind::Busy);
            return false;
        }

        let prev = self.state();
        self.ctx.begin_cycle(order, cfg, clock.now_ms());
        self.fsm.force_transition(StateId::Validate, &mut self.ctx);
        self.record(prev, StateId::Validate);
        info!("cycle start: {:?}", order.recipe);
        true
    }

    /// Operator stop. Unconditional safe-stop; a cycle in flight is
    /// aborted and latched as `ABORTED` until the next `start()`.
    pub fn stop(&mut self, hal: &mut impl HalPort) {
        error!("emergency stop");
        if self.busy() {
            let prev = self.state();
            self.ctx.error = Some(ErrorKind::Aborted);
            self.fsm.force_transition(StateId::Error, &mut self.ctx);
            self.record(prev, StateId::Error);
        }
        self.safe_stop(hal);
    }

    /// Advance the cycle by one non-blocking tick. A no-op in `Idle` and
    /// `Error`; call at 400 ms or faster (faster improves the heater
    /// hysteresis).
    pub fn tick(&mut self, hal: &mut impl HalPort, clock: &impl Clock) {
        if !self.busy() {
            return;
        }

        self.ctx.now_ms = clock.now_ms();
        self.ctx.sensors = SensorSnapshot {
            cup_present: hal.cup_present(),
            internal_temp_c: hal.read_internal_temp(),
            external_temp_c: hal.read_external_temp(),
            limit_upper: hal.read_limit_upper(),
            limit_lower: hal.read_limit_lower(),
        };

        let prev = self.state();

        // Cross-cutting interlocks first; phase logic never sees a tick
        // that violates them.
        if let Some(kind) = self.safety.check(prev, &self.ctx.sensors) {
            self.ctx.error = Some(kind);
            self.fsm.force_transition(StateId::Error, &mut self.ctx);
            self.record(prev, StateId::Error);
            self.safe_stop(hal);
            return;
        }

        self.fsm.tick(&mut self.ctx);

        let state = self.state();
        if state != prev {
            self.record(prev, state);
        }

        if state == StateId::Error {
            // Handler-detected fault: exits already dropped the phase
            // actuators, safe-stop forces the rest.
            self.safe_stop(hal);
            return;
        }

        self.apply_relays(hal);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    /// Human-readable progress string ("Preheating", "Mixing", ...).
    pub fn step(&self) -> &'static str {
        self.ctx.step
    }

    /// Last fault, or `None` after a clean start.
    pub fn error(&self) -> Option<ErrorKind> {
        self.ctx.error
    }

    /// A cycle is in flight iff the state is neither `Idle` nor `Error`.
    pub fn busy(&self) -> bool {
        !matches!(self.state(), StateId::Idle | StateId::Error)
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    // ── Internal ──────────────────────────────────────────────

    /// Force every actuator off. Idempotent; every failure path ends here.
    fn safe_stop(&mut self, hal: &mut impl HalPort) {
        hal.all_relays_off();
        self.ctx.relays.clear();
        self.ctx.step = "Stopped";
    }

    /// Mirror the desired relay set to the hardware.
    fn apply_relays(&mut self, hal: &mut impl HalPort) {
        for ch in RelayChannel::ALL {
            if self.ctx.relays.is_on(ch) {
                hal.relay_on(ch);
            } else {
                hal.relay_off(ch);
            }
        }
    }

    fn record(&mut self, from: StateId, to: StateId) {
        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(TransitionRecord {
            at_ms: self.ctx.now_ms,
            from,
            to,
        });
    }
}
