//! State handlers and table builder for the drink cycle.
//!
//! Four recipes share one state pool; handlers branch on the order where
//! the graphs diverge:
//!
//! ```text
//!  Coffee:   Validate → DispenseSolids → DispenseLiquid → HeatExternal ─┐
//!  HotDrink: Validate → DispenseSolids → HeatPreheat → HeatActive ──────┤
//!  Instant:  Validate → DispenseSolids → HeatPreheat → HeatActive ──────┤
//!  Clean:    Validate → DispenseLiquid → Done                           │
//!                                                                       ▼
//!                                   MixDown → MixRun → MixUp → Done → Idle
//!
//!  Any fault ──▶ Error (sticky until the next start)
//! ```
//!
//! Relay-off obligations live in `on_exit`, so a phase drops its actuators
//! whether it completed or was aborted into `Error`.

use log::{info, warn};

use crate::hal::RelayChannel;
use crate::order::{BrewBase, HotLiquid, MilkRatio, OrderParams, Recipe};

use super::context::CycleContext;
use super::{StateDescriptor, StateId};
use crate::error::ErrorKind;

/// Mixer carriage must hit its limit switch within this budget.
pub const LIMIT_TIMEOUT_MS: u64 = 10_000;

/// Preheat hands over to active heating this far below the target.
pub const PREHEAT_DELTA_C: f32 = 5.0;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Idle,
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        StateDescriptor {
            id: StateId::Validate,
            on_enter: None,
            on_exit: None,
            on_update: validate_update,
        },
        StateDescriptor {
            id: StateId::DispenseSolids,
            on_enter: Some(dispense_solids_enter),
            on_exit: Some(dispense_solids_exit),
            on_update: dispense_solids_update,
        },
        StateDescriptor {
            id: StateId::HeatInternalPreheat,
            on_enter: Some(heat_preheat_enter),
            on_exit: None, // heater stays on into the active phase
            on_update: heat_preheat_update,
        },
        StateDescriptor {
            id: StateId::HeatInternalActive,
            on_enter: Some(heat_active_enter),
            on_exit: Some(heat_active_exit),
            on_update: heat_active_update,
        },
        StateDescriptor {
            id: StateId::HeatExternal,
            on_enter: Some(heat_external_enter),
            on_exit: Some(heat_external_exit),
            on_update: heat_external_update,
        },
        StateDescriptor {
            id: StateId::DispenseLiquid,
            on_enter: Some(dispense_liquid_enter),
            on_exit: Some(dispense_liquid_exit),
            on_update: dispense_liquid_update,
        },
        StateDescriptor {
            id: StateId::MixDown,
            on_enter: Some(mix_down_enter),
            on_exit: Some(mix_down_exit),
            on_update: mix_down_update,
        },
        StateDescriptor {
            id: StateId::MixRun,
            on_enter: Some(mix_run_enter),
            on_exit: Some(mix_run_exit),
            on_update: mix_run_update,
        },
        StateDescriptor {
            id: StateId::MixUp,
            on_enter: Some(mix_up_enter),
            on_exit: Some(mix_up_exit),
            on_update: mix_up_update,
        },
        StateDescriptor {
            id: StateId::Done,
            on_enter: Some(done_enter),
            on_exit: None,
            on_update: done_update,
        },
        StateDescriptor {
            id: StateId::Error,
            on_enter: Some(error_enter),
            on_exit: None,
            on_update: error_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut CycleContext) {
    // Steady state: nothing energized, scratch wiped. The fault latch is
    // scratch too — a rejection recorded mid-cycle (BUSY) must not outlive
    // the cycle that completed cleanly. Faulted cycles land in Error, not
    // here, so stickiness is unaffected.
    ctx.relays.clear();
    ctx.step = "";
    ctx.error = None;
    ctx.heater_start_ms = None;
    ctx.pump_duration_ms = 0;
    ctx.water_duration_ms = 0;
    ctx.milk_duration_ms = 0;
}

fn idle_update(_ctx: &mut CycleContext) -> Option<StateId> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  VALIDATE — cup confirmed by the safety monitor; route to the first phase
// ═══════════════════════════════════════════════════════════════════════════

fn validate_update(ctx: &mut CycleContext) -> Option<StateId> {
    let Some(order) = ctx.order else {
        return ctx.fail(ErrorKind::BadMode);
    };
    match order.recipe {
        Recipe::Clean => Some(StateId::DispenseLiquid),
        _ => Some(StateId::DispenseSolids),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISPENSE SOLIDS
// ═══════════════════════════════════════════════════════════════════════════

/// Aggregate dispense time: the tanks run together for the summed budget
/// rather than one after the other. Calibrated on the dosing augers as
/// built — do not "fix" into per-tank timers.
fn solids_duration_ms(order: &OrderParams, ctx: &CycleContext) -> u64 {
    let sugar = order.sugar.multiplier() * ctx.cfg.tank1_time as u64;
    match order.recipe {
        Recipe::Coffee => (sugar + order.size.multiplier() * ctx.cfg.tank2_time as u64) * 1000,
        Recipe::Instant => (sugar + order.size.multiplier() * ctx.cfg.tank3_time as u64) * 1000,
        _ => sugar * 1000,
    }
}

fn dispense_solids_enter(ctx: &mut CycleContext) {
    let Some(order) = ctx.order else { return };
    ctx.step = "Dispensing solids";
    match order.recipe {
        Recipe::Coffee => {
            ctx.relays.on(RelayChannel::Tank1Sugar);
            ctx.relays.on(RelayChannel::Tank2Coffee);
        }
        Recipe::Instant => {
            ctx.relays.on(RelayChannel::Tank1Sugar);
            ctx.relays.on(RelayChannel::Tank3Instant);
        }
        _ => ctx.relays.on(RelayChannel::Tank1Sugar),
    }
}

fn dispense_solids_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::Tank1Sugar);
    ctx.relays.off(RelayChannel::Tank2Coffee);
    ctx.relays.off(RelayChannel::Tank3Instant);
}

fn dispense_solids_update(ctx: &mut CycleContext) -> Option<StateId> {
    let Some(order) = ctx.order else {
        return ctx.fail(ErrorKind::BadMode);
    };
    if ctx.ms_in_state() > solids_duration_ms(&order, ctx) {
        return match order.recipe {
            Recipe::Coffee => Some(StateId::DispenseLiquid),
            _ => Some(StateId::HeatInternalPreheat),
        };
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEAT INTERNAL — preheat, then hold temperature while pumping
// ═══════════════════════════════════════════════════════════════════════════

fn heat_preheat_enter(ctx: &mut CycleContext) {
    ctx.step = "Preheating";
    ctx.heater_start_ms = Some(ctx.now_ms);
    ctx.preheat_target_c = ctx.cfg.int_heater_temp - PREHEAT_DELTA_C;
    ctx.relays.on(RelayChannel::HeaterInt);
}

fn heat_preheat_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.heater_elapsed_ms() > ctx.cfg.int_heater_time as u64 * 1000 {
        warn!("internal heater timed out during preheat");
        ctx.relays.off(RelayChannel::HeaterInt);
        return ctx.fail(ErrorKind::HeatTimeout);
    }

    match ctx.sensors.internal_temp_c {
        Some(temp) if temp >= ctx.preheat_target_c => Some(StateId::HeatInternalActive),
        _ => None,
    }
}

fn heat_active_enter(ctx: &mut CycleContext) {
    let Some(order) = ctx.order else { return };
    ctx.step = "Heating and pumping";

    let water_ms = order.size.multiplier() * ctx.cfg.water_pump_time as u64 * 1000;
    let milk_ms = order.size.multiplier() * ctx.cfg.milk_pump_time as u64 * 1000;

    match order.recipe {
        Recipe::HotDrink => {
            // One pump, chosen by the liquid option.
            ctx.pump_duration_ms = match order.hot_liquid {
                HotLiquid::Water => {
                    ctx.relays.on(RelayChannel::PumpWater);
                    water_ms
                }
                HotLiquid::MilkMedium => {
                    ctx.relays.on(RelayChannel::PumpMilk);
                    milk_ms
                }
                HotLiquid::MilkExtra => {
                    // Doubled milk time, independent of cup size.
                    ctx.relays.on(RelayChannel::PumpMilk);
                    order.size.multiplier() * ctx.cfg.milk_pump_time as u64 * 2000
                }
            };
            info!("hot drink pour: {:?}, {} ms", order.hot_liquid, ctx.pump_duration_ms);
        }
        Recipe::Instant => {
            // Phased pour: water first, then milk for the remainder.
            let (water, milk) = match order.milk_ratio {
                MilkRatio::None => (water_ms, 0),
                MilkRatio::Medium => (water_ms * 3 / 4, milk_ms / 4),
                MilkRatio::Extra => (water_ms / 2, milk_ms / 2),
            };
            ctx.water_duration_ms = water;
            ctx.milk_duration_ms = milk;
            ctx.pump_duration_ms = water + milk;
            ctx.relays.on(RelayChannel::PumpWater);
            info!("instant pour: water {water} ms, milk {milk} ms");
        }
        _ => {}
    }
}

fn heat_active_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::PumpWater);
    ctx.relays.off(RelayChannel::PumpMilk);
    ctx.relays.off(RelayChannel::HeaterInt);
    ctx.heater_start_ms = None;
}

fn heat_active_update(ctx: &mut CycleContext) -> Option<StateId> {
    let Some(order) = ctx.order else {
        return ctx.fail(ErrorKind::BadMode);
    };

    // Total heater budget covers preheat plus this phase.
    if ctx.heater_elapsed_ms() > ctx.cfg.int_heater_time as u64 * 1000 {
        warn!("internal heater timed out while pumping");
        return ctx.fail(ErrorKind::HeatTimeout);
    }

    // Hysteresis hold around the target; a faulted probe freezes the relay
    // (the safety monitor owns the absolute over-temperature cutoff).
    if let Some(temp) = ctx.sensors.internal_temp_c {
        let next = ctx.heater.command(temp, ctx.relays.is_on(RelayChannel::HeaterInt));
        ctx.relays.set(RelayChannel::HeaterInt, next);
    }

    // Water → milk handoff for the phased instant pour.
    if order.recipe == Recipe::Instant
        && ctx.milk_duration_ms > 0
        && ctx.ms_in_state() > ctx.water_duration_ms
    {
        ctx.relays.off(RelayChannel::PumpWater);
        ctx.relays.on(RelayChannel::PumpMilk);
    }

    if ctx.ms_in_state() >= ctx.pump_duration_ms {
        return Some(StateId::MixDown);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEAT EXTERNAL — cup warmer, timer only
// ═══════════════════════════════════════════════════════════════════════════

fn heat_external_enter(ctx: &mut CycleContext) {
    ctx.step = "Cup warming";
    ctx.relays.on(RelayChannel::HeaterExt);
    info!("cup warmer on for {} s", ctx.cfg.ext_heater_time);
}

fn heat_external_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::HeaterExt);
}

fn heat_external_update(ctx: &mut CycleContext) -> Option<StateId> {
    // Purely time-based; the warmer thermocouple is telemetry only.
    if ctx.ms_in_state() >= ctx.cfg.ext_heater_time as u64 * 1000 {
        return Some(StateId::MixDown);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISPENSE LIQUID — coffee pour, or the cleaning flush
// ═══════════════════════════════════════════════════════════════════════════

fn dispense_liquid_enter(ctx: &mut CycleContext) {
    let Some(order) = ctx.order else { return };
    match order.recipe {
        Recipe::Coffee => {
            ctx.step = "Dispensing liquid";
            ctx.pump_duration_ms = match order.brew_base {
                BrewBase::Water => {
                    ctx.relays.on(RelayChannel::PumpWater);
                    order.size.multiplier() * ctx.cfg.water_pump_time as u64 * 1000
                }
                BrewBase::Milk => {
                    ctx.relays.on(RelayChannel::PumpMilk);
                    order.size.multiplier() * ctx.cfg.milk_pump_time as u64 * 1000
                }
            };
        }
        Recipe::Clean => {
            ctx.step = "Cleaning";
            if order.clean_water {
                ctx.relays.on(RelayChannel::PumpWater);
            }
            if order.clean_milk {
                ctx.relays.on(RelayChannel::PumpMilk);
            }
            let water = if order.clean_water { ctx.cfg.water_pump_time as u64 } else { 0 };
            let milk = if order.clean_milk { ctx.cfg.milk_pump_time as u64 } else { 0 };
            ctx.pump_duration_ms = water.max(milk) * 1000;
        }
        _ => {}
    }
}

fn dispense_liquid_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::PumpWater);
    ctx.relays.off(RelayChannel::PumpMilk);
}

fn dispense_liquid_update(ctx: &mut CycleContext) -> Option<StateId> {
    let Some(order) = ctx.order else {
        return ctx.fail(ErrorKind::BadMode);
    };
    if ctx.ms_in_state() >= ctx.pump_duration_ms {
        return match order.recipe {
            Recipe::Coffee => Some(StateId::HeatExternal),
            // Cleaning skips the warmer and the mixer.
            _ => Some(StateId::Done),
        };
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  MIX DOWN / RUN / UP
// ═══════════════════════════════════════════════════════════════════════════

fn mix_down_enter(ctx: &mut CycleContext) {
    ctx.step = "Mixer moving down";
}

fn mix_down_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::MixerDown);
}

fn mix_down_update(ctx: &mut CycleContext) -> Option<StateId> {
    // First tick: sanity-check the switches before commanding travel. Two
    // opposing endpoints both asserted means a wiring or switch failure.
    if !ctx.relays.is_on(RelayChannel::MixerDown) {
        if ctx.sensors.limit_upper && ctx.sensors.limit_lower {
            warn!("both mixer limit switches asserted");
            return ctx.fail(ErrorKind::LimitInvalid);
        }
        ctx.relays.on(RelayChannel::MixerDown);
    }

    if ctx.sensors.limit_lower {
        return Some(StateId::MixRun);
    }
    if ctx.ms_in_state() > LIMIT_TIMEOUT_MS {
        warn!("mixer never reached the lower limit");
        return ctx.fail(ErrorKind::TimeoutLimit);
    }
    None
}

fn mix_run_enter(ctx: &mut CycleContext) {
    ctx.step = "Mixing";
    ctx.relays.on(RelayChannel::MixerRotate);
}

fn mix_run_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::MixerRotate);
}

fn mix_run_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.ms_in_state() >= ctx.cfg.mixer_time as u64 * 1000 {
        return Some(StateId::MixUp);
    }
    None
}

fn mix_up_enter(ctx: &mut CycleContext) {
    ctx.step = "Mixer moving up";
    ctx.relays.on(RelayChannel::MixerUp);
}

fn mix_up_exit(ctx: &mut CycleContext) {
    ctx.relays.off(RelayChannel::MixerUp);
}

fn mix_up_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.sensors.limit_upper {
        return Some(StateId::Done);
    }
    if ctx.ms_in_state() > LIMIT_TIMEOUT_MS {
        warn!("mixer never reached the upper limit");
        return ctx.fail(ErrorKind::TimeoutLimit);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DONE / ERROR
// ═══════════════════════════════════════════════════════════════════════════

fn done_enter(ctx: &mut CycleContext) {
    ctx.relays.clear();
}

fn done_update(ctx: &mut CycleContext) -> Option<StateId> {
    if let Some(order) = ctx.order {
        info!("{:?} cycle complete", order.recipe);
    }
    Some(StateId::Idle)
}

fn error_enter(ctx: &mut CycleContext) {
    // Kill everything immediately; the controller mirrors this to the HAL.
    ctx.relays.clear();
    ctx.step = "Stopped";
    warn!(
        "cycle fault: {}",
        ctx.error.map(|e| e.as_str()).unwrap_or("unknown")
    );
}

fn error_update(_ctx: &mut CycleContext) -> Option<StateId> {
    // Sticky: only a fresh start() leaves Error.
    None
}
