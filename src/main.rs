//! Host simulator — runs complete drink cycles against the simulated HAL.
//!
//! Useful for watching the cycle sequence without hardware: the manual
//! clock is advanced in lock-step with the simulated plant, so a full
//! coffee (solids → pour → cup warmer → mix) plays out in a few wall-clock
//! seconds.

use anyhow::Result;
use log::info;

use brewbot::api::{Command, ControlSurface};
use brewbot::clock::ManualClock;
use brewbot::config::SettingsStore;
use brewbot::hal::SimHal;
use brewbot::order::{OrderParams, Recipe, Sugar};
use brewbot::storage::MemStorage;

/// Simulated control-loop period.
const TICK_MS: u64 = 100;
/// Runaway guard for the simulation loop.
const MAX_TICKS: u32 = 20_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt().compact().init();
    info!("brewbot simulator starting");

    let settings = SettingsStore::new(MemStorage::new());
    let mut surface = ControlSurface::new(SimHal::new(), ManualClock::new(), settings);

    let mut coffee = OrderParams::new(Recipe::Coffee);
    coffee.sugar = Sugar::Medium;
    run_cycle(&mut surface, coffee)?;

    // Exercises preheat and the hysteresis hold.
    run_cycle(&mut surface, OrderParams::new(Recipe::HotDrink))?;

    let mut clean = OrderParams::new(Recipe::Clean);
    clean.clean_water = true;
    run_cycle(&mut surface, clean)?;

    info!("simulation finished");
    Ok(())
}

fn run_cycle(
    surface: &mut ControlSurface<SimHal, ManualClock, MemStorage>,
    order: OrderParams,
) -> Result<()> {
    anyhow::ensure!(
        surface.submit(Command::Start(order)),
        "command mailbox occupied"
    );

    let mut last_step = "";
    for _ in 0..MAX_TICKS {
        surface.tick();
        surface.hal_mut().step(TICK_MS);
        surface.clock().advance(TICK_MS);

        let status = surface.status();
        if status.step != last_step && !status.step.is_empty() {
            info!("[{}] {}", status.state, status.step);
            last_step = status.step;
        }
        if !status.busy {
            anyhow::ensure!(
                status.error.is_empty(),
                "cycle ended in error: {}",
                status.error
            );
            info!("cycle finished, machine idle");
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    anyhow::bail!("simulation did not finish within {MAX_TICKS} ticks")
}
