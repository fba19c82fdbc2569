//! Table-driven finite-state machine for the drink cycle.
//!
//! Classic embedded FSM pattern: a fixed array of state descriptors, each a
//! set of plain `fn` pointers — no heap, no `dyn`.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  StateTable                                                │
//! │  ┌────────────────┬──────────┬─────────┬──────────────────┐│
//! │  │ StateId        │ on_enter │ on_exit │ on_update        ││
//! │  ├────────────────┼──────────┼─────────┼──────────────────┤│
//! │  │ Idle           │ fn(ctx)  │    —    │ fn(ctx)->Option  ││
//! │  │ Validate       │    —     │    —    │ fn(ctx)->Option  ││
//! │  │ DispenseSolids │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option  ││
//! │  │ ...            │          │         │                  ││
//! │  └────────────────┴──────────┴─────────┴──────────────────┘│
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the current state. A returned
//! `Some(next)` runs `on_exit(current)` → `on_enter(next)` and re-stamps the
//! state entry time. `on_exit` is where phases drop their actuators, so the
//! de-energize obligation holds on success and abort paths alike.

pub mod context;
pub mod controller;
pub mod states;

use context::CycleContext;
use log::info;

pub use controller::Machine;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every state of the drink cycle.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Validate = 1,
    DispenseSolids = 2,
    HeatInternalPreheat = 3,
    HeatInternalActive = 4,
    HeatExternal = 5,
    DispenseLiquid = 6,
    MixDown = 7,
    MixRun = 8,
    MixUp = 9,
    Done = 10,
    Error = 11,
}

impl StateId {
    /// Total number of states — sizes the table array.
    pub const COUNT: usize = 12;

    /// Display name for the status surface.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Validate => "Validate",
            Self::DispenseSolids => "DispenseSolids",
            Self::HeatInternalPreheat => "HeatInternalPreheat",
            Self::HeatInternalActive => "HeatInternalActive",
            Self::HeatExternal => "HeatExternal",
            Self::DispenseLiquid => "DispenseLiquid",
            Self::MixDown => "MixDown",
            Self::MixRun => "MixRun",
            Self::MixUp => "MixUp",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }

    /// Convert a table index back to a `StateId`. Panics on out-of-range in
    /// debug builds; returns `Error` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Validate,
            2 => Self::DispenseSolids,
            3 => Self::HeatInternalPreheat,
            4 => Self::HeatInternalActive,
            5 => Self::HeatExternal,
            6 => Self::DispenseLiquid,
            7 => Self::MixDown,
            8 => Self::MixRun,
            9 => Self::MixUp,
            10 => Self::Done,
            11 => Self::Error,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions; run once per transition.
pub type StateActionFn = fn(&mut CycleContext);

/// Per-tick update handler. `Some(next)` triggers a transition.
pub type StateUpdateFn = fn(&mut CycleContext) -> Option<StateId>;

/// Static descriptor for a single state — one row of the table.
pub struct StateDescriptor {
    pub id: StateId,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The state-table engine. Owns the descriptor array and the index of the
/// active state; all mutable cycle data lives in the [`CycleContext`]
/// threaded through each call.
pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Advance by one tick: run the current state's `on_update` and perform
    /// the transition it requests, if any.
    pub fn tick(&mut self, ctx: &mut CycleContext) {
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Immediate transition, bypassing `on_update` — used by the controller
    /// for `start()` and fault forcing.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut CycleContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut CycleContext) {
        let next_idx = next_id as usize;

        info!(
            "state: {} -> {}",
            self.table[self.current].id.name(),
            self.table[next_idx].id.name()
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        ctx.state_start_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
