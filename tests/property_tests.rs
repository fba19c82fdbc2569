//! Property tests for the core invariants: debounce behavior, heater
//! hysteresis, settings persistence, and the "faults always land in Error
//! with everything off" guarantee under arbitrary sensor streams.

use proptest::prelude::*;

use brewbot::clock::ManualClock;
use brewbot::config::{Settings, SettingsStore};
use brewbot::control::BangBang;
use brewbot::hal::debounce::{DebouncedInput, DEBOUNCE_READS};
use brewbot::hal::SimHal;
use brewbot::machine::{Machine, StateId};
use brewbot::order::{OrderParams, Recipe};
use brewbot::storage::MemStorage;

// ── Debounce: inverse until stable, raw afterwards ────────────

proptest! {
    #[test]
    fn debounce_monotonicity(samples in proptest::collection::vec(any::<bool>(), 1..200)) {
        let mut deb = DebouncedInput::new();
        let mut run = 0usize;
        let mut prev: Option<bool> = None;

        for &raw in &samples {
            run = if prev == Some(raw) { run + 1 } else { 1 };
            prev = Some(raw);

            let out = deb.sample(raw);
            if run >= DEBOUNCE_READS as usize {
                prop_assert_eq!(out, raw, "stable level must be reported as-is");
            } else {
                prop_assert_eq!(out, !raw, "unstable level must be inverted");
            }
        }
    }
}

// ── Bang-bang: hysteresis band holds the previous command ─────

proptest! {
    #[test]
    fn hysteresis_band_never_chatters(
        target in 60.0f32..=100.0,
        temp in -10.0f32..=150.0,
        prior in any::<bool>(),
    ) {
        let bb = BangBang::new(target);
        let cmd = bb.command(temp, prior);

        if temp < target - 2.0 {
            prop_assert!(cmd);
        } else if temp > target + 2.0 {
            prop_assert!(!cmd);
        } else {
            prop_assert_eq!(cmd, prior, "inside the band the command must hold");
        }
    }
}

// ── Settings: any valid set survives a save/reload ────────────

fn arb_settings() -> impl Strategy<Value = Settings> {
    (
        0u32..=30,
        0u32..=30,
        0u32..=30,
        0u32..=60,
        0u32..=60,
        10u32..=120,
        60.0f32..=100.0,
        10u32..=180,
        60.0f32..=100.0,
        5u32..=60,
    )
        .prop_map(
            |(t1, t2, t3, water, milk, heat_time, heat_temp, ext_time, ext_temp, mix)| Settings {
                tank1_time: t1,
                tank2_time: t2,
                tank3_time: t3,
                water_pump_time: water,
                milk_pump_time: milk,
                int_heater_time: heat_time,
                int_heater_temp: heat_temp,
                ext_heater_time: ext_time,
                ext_heater_temp: ext_temp,
                mixer_time: mix,
            },
        )
}

proptest! {
    #[test]
    fn valid_settings_round_trip(settings in arb_settings()) {
        prop_assert!(settings.validate());
        let mut store = SettingsStore::new(MemStorage::new());
        prop_assert!(store.save(settings));
        prop_assert_eq!(store.get(), settings);
    }
}

// ── Machine: arbitrary sensor streams never violate safe-off ──

#[derive(Debug, Clone, Copy)]
struct SensorEvent {
    cup: bool,
    temp: Option<f32>,
    dt_ms: u64,
}

fn arb_event() -> impl Strategy<Value = SensorEvent> {
    (
        prop::bool::weighted(0.9),
        prop::option::weighted(0.9, 0.0f32..130.0),
        50u64..500,
    )
        .prop_map(|(cup, temp, dt_ms)| SensorEvent { cup, temp, dt_ms })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn faults_always_land_safe(events in proptest::collection::vec(arb_event(), 1..80)) {
        let mut machine = Machine::new(Settings::default());
        let mut hal = SimHal::new();
        let clock = ManualClock::new();
        machine.start(OrderParams::new(Recipe::HotDrink), &mut hal, Settings::default(), &clock);

        for ev in events {
            hal.set_cup(ev.cup);
            hal.set_internal_temp(ev.temp);
            clock.advance(ev.dt_ms);

            let was_busy = machine.busy();
            machine.tick(&mut hal, &clock);

            if matches!(machine.state(), StateId::Idle | StateId::Error) {
                prop_assert!(hal.all_off(), "terminal states must de-energize everything");
            }
            if was_busy && !ev.cup {
                prop_assert_eq!(machine.state(), StateId::Error, "cup loss must abort");
                prop_assert!(machine.error().is_some());
            }
        }
    }
}
