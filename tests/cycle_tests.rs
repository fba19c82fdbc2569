//! End-to-end drink-cycle scenarios against the simulated HAL.
//!
//! These run on the host and drive the controller exactly the way the
//! appliance main loop does: advance the injected clock, optionally step
//! the simulated plant, tick. Error-path scenarios pin sensor values
//! instead of stepping physics so faults land on exact ticks.

use brewbot::clock::ManualClock;
use brewbot::config::Settings;
use brewbot::error::ErrorKind;
use brewbot::hal::{RelayChannel, SimHal};
use brewbot::machine::{Machine, StateId};
use brewbot::order::{BrewBase, HotLiquid, MilkRatio, OrderParams, Recipe, Size, Sugar};

const TICK_MS: u64 = 100;

struct Rig {
    machine: Machine,
    hal: SimHal,
    clock: ManualClock,
    /// Step the simulated plant between ticks (off for pinned-sensor tests).
    physics: bool,
}

impl Rig {
    fn new() -> Self {
        Self {
            machine: Machine::new(Settings::default()),
            hal: SimHal::new(),
            clock: ManualClock::new(),
            physics: true,
        }
    }

    fn pinned() -> Self {
        let mut rig = Self::new();
        rig.physics = false;
        rig
    }

    fn start(&mut self, order: OrderParams) -> bool {
        self.start_with(order, Settings::default())
    }

    fn start_with(&mut self, order: OrderParams, cfg: Settings) -> bool {
        self.machine.start(order, &mut self.hal, cfg, &self.clock)
    }

    /// Advance time by `ms`, then run one tick.
    fn tick_after(&mut self, ms: u64) {
        self.clock.advance(ms);
        if self.physics {
            self.hal.step(ms);
        }
        self.machine.tick(&mut self.hal, &self.clock);
    }

    /// Tick at the standard cadence until `state` is reached.
    fn run_until(&mut self, state: StateId, max_ms: u64) {
        let mut elapsed = 0;
        while self.machine.state() != state {
            assert!(
                elapsed <= max_ms,
                "never reached {state:?}; stuck in {:?} ({})",
                self.machine.state(),
                self.machine
                    .error()
                    .map(|e| e.as_str())
                    .unwrap_or("no error")
            );
            self.tick_after(TICK_MS);
            elapsed += TICK_MS;
        }
    }

    fn on(&self, ch: RelayChannel) -> bool {
        self.hal.relay_is_on(ch)
    }

    /// Timestamp of the `from -> to` transition, from the diagnostics log.
    fn transition_at(&self, from: StateId, to: StateId) -> u64 {
        self.machine
            .history()
            .iter()
            .find(|t| t.from == from && t.to == to)
            .unwrap_or_else(|| panic!("no {from:?} -> {to:?} transition recorded"))
            .at_ms
    }
}

// ── Scenario: coffee, single, medium sugar, water base ────────

#[test]
fn coffee_happy_path() {
    let mut rig = Rig::new();
    let mut order = OrderParams::new(Recipe::Coffee);
    order.sugar = Sugar::Medium;
    order.brew_base = BrewBase::Water;
    assert!(rig.start(order));
    assert_eq!(rig.machine.state(), StateId::Validate);

    rig.run_until(StateId::DispenseSolids, 1_000);
    assert!(rig.on(RelayChannel::Tank1Sugar));
    assert!(rig.on(RelayChannel::Tank2Coffee));
    assert!(!rig.on(RelayChannel::Tank3Instant));
    assert!(!rig.on(RelayChannel::PumpWater));

    rig.run_until(StateId::DispenseLiquid, 10_000);
    assert!(!rig.on(RelayChannel::Tank1Sugar));
    assert!(!rig.on(RelayChannel::Tank2Coffee));
    assert!(rig.on(RelayChannel::PumpWater));
    assert!(!rig.on(RelayChannel::PumpMilk));

    rig.run_until(StateId::HeatExternal, 10_000);
    assert!(!rig.on(RelayChannel::PumpWater));
    assert!(rig.on(RelayChannel::HeaterExt));

    rig.run_until(StateId::MixDown, 50_000);
    assert!(!rig.on(RelayChannel::HeaterExt));

    rig.run_until(StateId::MixRun, 15_000);
    assert!(!rig.on(RelayChannel::MixerDown));
    assert!(rig.on(RelayChannel::MixerRotate));

    rig.run_until(StateId::MixUp, 15_000);
    rig.run_until(StateId::Idle, 15_000);

    assert!(rig.hal.all_off(), "idle must leave every relay off");
    assert_eq!(rig.machine.error(), None);
    assert_eq!(rig.machine.step(), "");

    // Phase budgets: (2·2 + 1·3) s of solids, 5 s pour, 45 s cup warmer.
    let solids_entry = rig.transition_at(StateId::Validate, StateId::DispenseSolids);
    let pour_entry = rig.transition_at(StateId::DispenseSolids, StateId::DispenseLiquid);
    let warm_entry = rig.transition_at(StateId::DispenseLiquid, StateId::HeatExternal);
    let mix_entry = rig.transition_at(StateId::HeatExternal, StateId::MixDown);
    assert_eq!(pour_entry - solids_entry, 7_000 + TICK_MS);
    assert_eq!(warm_entry - pour_entry, 5_000);
    assert_eq!(mix_entry - warm_entry, 45_000);
}

// ── Scenario: hot drink, double, high sugar, extra milk ──────

#[test]
fn hot_drink_double_high_milk_extra() {
    let mut rig = Rig::pinned();
    rig.hal.set_internal_temp(Some(95.0)); // preheat hands over immediately
    let mut order = OrderParams::new(Recipe::HotDrink);
    order.size = Size::Double;
    order.sugar = Sugar::High;
    order.hot_liquid = HotLiquid::MilkExtra;
    assert!(rig.start(order));

    rig.run_until(StateId::DispenseSolids, 1_000);
    assert!(rig.on(RelayChannel::Tank1Sugar));
    assert!(!rig.on(RelayChannel::Tank2Coffee));
    assert!(!rig.on(RelayChannel::Tank3Instant));

    rig.run_until(StateId::HeatInternalActive, 10_000);
    assert!(rig.on(RelayChannel::PumpMilk), "extra milk uses the milk pump");
    assert!(!rig.on(RelayChannel::PumpWater));

    // 4·2 s of sugar dispensing (tank 1 only).
    let solids_entry = rig.transition_at(StateId::Validate, StateId::DispenseSolids);
    let preheat_entry = rig.transition_at(StateId::DispenseSolids, StateId::HeatInternalPreheat);
    assert_eq!(preheat_entry - solids_entry, 8_000 + TICK_MS);

    // Hysteresis: outside the band the relay moves, inside it holds.
    rig.hal.set_internal_temp(Some(92.9));
    rig.tick_after(TICK_MS);
    assert!(rig.on(RelayChannel::HeaterInt), "below band must heat");
    rig.hal.set_internal_temp(Some(95.0));
    rig.tick_after(TICK_MS);
    assert!(rig.on(RelayChannel::HeaterInt), "in band must hold ON");
    rig.hal.set_internal_temp(Some(97.1));
    rig.tick_after(TICK_MS);
    assert!(!rig.on(RelayChannel::HeaterInt), "above band must stop heating");
    rig.hal.set_internal_temp(Some(96.0));
    rig.tick_after(TICK_MS);
    assert!(!rig.on(RelayChannel::HeaterInt), "in band must hold OFF");
    rig.hal.set_internal_temp(Some(95.0));

    // Doubled milk pour: 2 · 4 s · 2 = 16 s.
    rig.run_until(StateId::MixDown, 20_000);
    let active_entry = rig.transition_at(StateId::HeatInternalPreheat, StateId::HeatInternalActive);
    let mix_entry = rig.transition_at(StateId::HeatInternalActive, StateId::MixDown);
    assert_eq!(mix_entry - active_entry, 16_000);
    assert!(!rig.on(RelayChannel::PumpMilk));
    assert!(!rig.on(RelayChannel::HeaterInt));

    // Walk the mixer through by hand (no physics in pinned mode).
    rig.hal.set_limit_raw(false, false);
    for _ in 0..3 {
        rig.tick_after(TICK_MS);
    }
    rig.hal.set_limit_raw(false, true);
    rig.run_until(StateId::MixRun, 2_000);
    rig.hal.set_limit_raw(false, false);
    rig.run_until(StateId::MixUp, 15_000);
    rig.hal.set_limit_raw(true, false);
    rig.run_until(StateId::Idle, 2_000);

    assert!(rig.hal.all_off());
    assert_eq!(rig.machine.error(), None);
}

// ── Scenario: instant, single, low sugar, medium milk ratio ──

#[test]
fn instant_phased_water_then_milk() {
    let mut rig = Rig::pinned();
    rig.hal.set_internal_temp(Some(95.0));
    let mut order = OrderParams::new(Recipe::Instant);
    order.milk_ratio = MilkRatio::Medium;
    assert!(rig.start(order));

    rig.run_until(StateId::DispenseSolids, 1_000);
    assert!(rig.on(RelayChannel::Tank1Sugar));
    assert!(rig.on(RelayChannel::Tank3Instant));

    // (1·2 + 1·3) s of solids.
    rig.run_until(StateId::HeatInternalActive, 10_000);
    let solids_entry = rig.transition_at(StateId::Validate, StateId::DispenseSolids);
    let preheat_entry = rig.transition_at(StateId::DispenseSolids, StateId::HeatInternalPreheat);
    assert_eq!(preheat_entry - solids_entry, 5_000 + TICK_MS);

    let active_entry = rig.transition_at(StateId::HeatInternalPreheat, StateId::HeatInternalActive);
    assert!(rig.on(RelayChannel::PumpWater));
    assert!(!rig.on(RelayChannel::PumpMilk));

    // Water share runs 0.75 · 5 s = 3750 ms; not a tick earlier.
    let water_end = active_entry + 3_750;
    rig.clock.advance(water_end - rig.clock_now());
    rig.machine.tick(&mut rig.hal, &rig.clock);
    assert!(rig.on(RelayChannel::PumpWater), "handoff is strictly after the water share");
    assert!(!rig.on(RelayChannel::PumpMilk));

    rig.tick_after(1);
    assert!(!rig.on(RelayChannel::PumpWater));
    assert!(rig.on(RelayChannel::PumpMilk));

    // Total pour 3750 + 1000 ms, then everything off and into the mixer.
    rig.clock.advance(active_entry + 4_750 - rig.clock_now());
    rig.machine.tick(&mut rig.hal, &rig.clock);
    assert_eq!(rig.machine.state(), StateId::MixDown);
    assert!(!rig.on(RelayChannel::PumpWater));
    assert!(!rig.on(RelayChannel::PumpMilk));
    assert!(!rig.on(RelayChannel::HeaterInt));
}

// ── Scenario: cup removed mid-heat ────────────────────────────

#[test]
fn cup_removed_during_heat_aborts() {
    let mut rig = Rig::pinned();
    rig.hal.set_internal_temp(Some(95.0));
    assert!(rig.start(OrderParams::new(Recipe::HotDrink)));
    rig.run_until(StateId::HeatInternalActive, 10_000);

    rig.hal.set_cup(false);
    rig.tick_after(TICK_MS);

    assert_eq!(rig.machine.state(), StateId::Error);
    assert_eq!(rig.machine.error(), Some(ErrorKind::NoCupDuringRun));
    assert!(rig.hal.all_off(), "heater and pumps must be off");
}

#[test]
fn missing_cup_at_validation_is_the_pre_run_fault() {
    let mut rig = Rig::pinned();
    rig.hal.set_cup(false);
    assert!(rig.start(OrderParams::new(Recipe::Coffee)));
    rig.tick_after(TICK_MS);
    assert_eq!(rig.machine.error(), Some(ErrorKind::NoCup));
    assert_eq!(rig.machine.state(), StateId::Error);
}

// ── Scenario: runaway temperature reading ─────────────────────

#[test]
fn absolute_over_temperature_is_a_sensor_fault() {
    let mut rig = Rig::pinned();
    rig.hal.set_internal_temp(Some(95.0));
    assert!(rig.start(OrderParams::new(Recipe::HotDrink)));
    rig.run_until(StateId::HeatInternalActive, 10_000);

    rig.hal.set_internal_temp(Some(112.0));
    rig.tick_after(TICK_MS);

    assert_eq!(rig.machine.state(), StateId::Error);
    assert_eq!(rig.machine.error(), Some(ErrorKind::SensorFail));
    assert!(rig.hal.all_off());
}

#[test]
fn gradual_runaway_probe_faults_after_hysteresis_cutoff() {
    // A drifting probe crosses the bang-bang off-threshold first, so the
    // heater is already commanded off when the reading passes the absolute
    // ceiling. The fault must fire anyway.
    let mut rig = Rig::pinned();
    rig.hal.set_internal_temp(Some(95.0));
    assert!(rig.start(OrderParams::new(Recipe::HotDrink)));
    rig.run_until(StateId::HeatInternalActive, 10_000);

    rig.hal.set_internal_temp(Some(98.0));
    rig.tick_after(TICK_MS);
    assert!(
        !rig.on(RelayChannel::HeaterInt),
        "above the band the heater must be commanded off"
    );

    rig.hal.set_internal_temp(Some(111.0));
    rig.tick_after(TICK_MS);
    assert_eq!(rig.machine.state(), StateId::Error);
    assert_eq!(rig.machine.error(), Some(ErrorKind::SensorFail));
    assert!(rig.hal.all_off());
}

// ── Scenario: mixer never reaches the lower limit ─────────────

#[test]
fn mixer_travel_timeout() {
    let mut rig = Rig::pinned();
    // Shorten the run-up: no solids, instant pour, minimum cup warmer.
    let cfg = Settings {
        tank1_time: 0,
        tank2_time: 0,
        water_pump_time: 0,
        ext_heater_time: 10,
        ..Settings::default()
    };
    assert!(rig.start_with(OrderParams::new(Recipe::Coffee), cfg));
    rig.run_until(StateId::MixDown, 30_000);

    let mix_entry = rig.transition_at(StateId::HeatExternal, StateId::MixDown);
    rig.run_until(StateId::Error, 11_000);
    let fault_at = rig.transition_at(StateId::MixDown, StateId::Error);

    assert_eq!(rig.machine.error(), Some(ErrorKind::TimeoutLimit));
    assert!(fault_at - mix_entry > 10_000);
    assert!(rig.hal.all_off(), "mixer relays must be off after the fault");
}

// ── Scenario: water-only cleaning cycle ───────────────────────

#[test]
fn clean_water_only_skips_the_mixer() {
    let mut rig = Rig::pinned();
    let mut order = OrderParams::new(Recipe::Clean);
    order.clean_water = true;
    assert!(rig.start(order));

    rig.run_until(StateId::DispenseLiquid, 1_000);
    assert!(rig.on(RelayChannel::PumpWater));
    assert!(!rig.on(RelayChannel::PumpMilk));
    assert_eq!(rig.machine.step(), "Cleaning");

    // 5 s flush straight to Done; the mixer must never move.
    rig.run_until(StateId::Idle, 10_000);
    assert!(rig.hal.all_off());
    assert_eq!(rig.machine.error(), None);
    for t in rig.machine.history() {
        assert!(
            !matches!(t.to, StateId::MixDown | StateId::MixRun | StateId::MixUp),
            "cleaning must not mix (saw {t:?})"
        );
    }
}

// ── Cross-cutting invariants ──────────────────────────────────

#[test]
fn rejected_start_keeps_relays_cold() {
    let mut rig = Rig::pinned();
    let mut order = OrderParams::new(Recipe::Clean);
    order.clean_water = true;
    assert!(rig.start(order));
    rig.run_until(StateId::DispenseLiquid, 1_000);

    assert!(!rig.start(OrderParams::new(Recipe::Coffee)));
    assert_eq!(rig.machine.state(), StateId::DispenseLiquid);
    assert!(rig.on(RelayChannel::PumpWater), "running cycle must be untouched");
    assert_eq!(rig.machine.error(), Some(ErrorKind::Busy));

    // The rejection tag is per-cycle scratch: a clean finish must not
    // report a phantom BUSY from idle.
    rig.run_until(StateId::Idle, 10_000);
    assert_eq!(rig.machine.error(), None);
    assert!(rig.hal.all_off());
}

#[test]
fn error_is_sticky_until_the_next_start() {
    let mut rig = Rig::pinned();
    rig.hal.set_cup(false);
    assert!(rig.start(OrderParams::new(Recipe::Coffee)));
    rig.tick_after(TICK_MS);
    assert_eq!(rig.machine.state(), StateId::Error);

    for _ in 0..20 {
        rig.tick_after(TICK_MS);
    }
    assert_eq!(rig.machine.state(), StateId::Error);
    assert!(rig.hal.all_off());

    rig.hal.set_cup(true);
    assert!(rig.start(OrderParams::new(Recipe::Coffee)));
    assert_eq!(rig.machine.state(), StateId::Validate);
    assert_eq!(rig.machine.error(), None);
}

impl Rig {
    fn clock_now(&self) -> u64 {
        use brewbot::clock::Clock;
        self.clock.now_ms()
    }
}
