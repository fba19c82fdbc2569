//! Host simulation adapter.
//!
//! Implements [`HalPort`] entirely in memory so the control loop, the
//! integration suite, and the demo binary run full cycles on a laptop.
//! Sensor values are settable from the outside; an optional physics step
//! models heater thermal response and mixer carriage travel so relay
//! commands feed back into the sensors the way the real plumbing does.

use super::debounce::DebouncedInput;
use super::{HalPort, RelayChannel};

/// Heater thermal response, °C per second while energized.
const HEAT_RATE_C_PER_S: f32 = 4.0;
/// Passive cooling toward ambient, °C per second.
const COOL_RATE_C_PER_S: f32 = 0.2;
/// Full mixer travel, top to bottom, in milliseconds of drive time.
const MIXER_TRAVEL_MS: i64 = 1200;

/// Simulated hardware: relay latch, cup sensor, thermocouples, limit
/// switches with real debouncing.
pub struct SimHal {
    ready: bool,
    relays: u16,
    /// Count of actual line transitions, for idempotence assertions.
    toggles: u32,

    cup: bool,
    internal_temp: Option<f32>,
    external_temp: Option<f32>,
    ambient_c: f32,

    /// Carriage position in drive-milliseconds; 0 = top, travel = bottom.
    mixer_pos_ms: i64,
    limit_upper_raw: bool,
    limit_lower_raw: bool,
    deb_upper: DebouncedInput,
    deb_lower: DebouncedInput,
}

impl SimHal {
    /// A ready machine: cup in place, tank at ambient, carriage parked at
    /// the top of its travel.
    pub fn new() -> Self {
        Self {
            ready: true,
            relays: 0,
            toggles: 0,
            cup: true,
            internal_temp: Some(25.0),
            external_temp: Some(25.0),
            ambient_c: 25.0,
            mixer_pos_ms: 0,
            limit_upper_raw: true,
            limit_lower_raw: false,
            deb_upper: DebouncedInput::new(),
            deb_lower: DebouncedInput::new(),
        }
    }

    // ── Test / scenario hooks ─────────────────────────────────

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_cup(&mut self, present: bool) {
        self.cup = present;
    }

    pub fn set_internal_temp(&mut self, temp: Option<f32>) {
        self.internal_temp = temp;
    }

    pub fn set_external_temp(&mut self, temp: Option<f32>) {
        self.external_temp = temp;
    }

    /// Raw (pre-debounce) limit switch levels.
    pub fn set_limit_raw(&mut self, upper: bool, lower: bool) {
        self.limit_upper_raw = upper;
        self.limit_lower_raw = lower;
    }

    pub fn relay_is_on(&self, ch: RelayChannel) -> bool {
        self.relays & ch.mask() != 0
    }

    /// True iff no channel is energized.
    pub fn all_off(&self) -> bool {
        self.relays == 0
    }

    /// Line transitions so far (a redundant off command moves nothing).
    pub fn toggle_count(&self) -> u32 {
        self.toggles
    }

    // ── Physics ───────────────────────────────────────────────

    /// Advance the simulated plant by `dt_ms`. Call between control ticks
    /// when thermal/travel feedback is wanted; scenario tests that pin
    /// sensor values simply skip it.
    pub fn step(&mut self, dt_ms: u64) {
        let dt_s = dt_ms as f32 / 1000.0;

        if let Some(temp) = self.internal_temp {
            let next = if self.relay_is_on(RelayChannel::HeaterInt) {
                temp + HEAT_RATE_C_PER_S * dt_s
            } else {
                (temp - COOL_RATE_C_PER_S * dt_s).max(self.ambient_c)
            };
            self.internal_temp = Some(next);
        }

        if self.relay_is_on(RelayChannel::MixerDown) {
            self.mixer_pos_ms = (self.mixer_pos_ms + dt_ms as i64).min(MIXER_TRAVEL_MS);
        }
        if self.relay_is_on(RelayChannel::MixerUp) {
            self.mixer_pos_ms = (self.mixer_pos_ms - dt_ms as i64).max(0);
        }
        self.limit_upper_raw = self.mixer_pos_ms == 0;
        self.limit_lower_raw = self.mixer_pos_ms == MIXER_TRAVEL_MS;
    }

    fn set_line(&mut self, ch: RelayChannel, on: bool) {
        // The relay board ignores writes until initialization finished.
        if !self.ready {
            return;
        }
        let before = self.relays;
        if on {
            self.relays |= ch.mask();
        } else {
            self.relays &= !ch.mask();
        }
        if self.relays != before {
            self.toggles += 1;
        }
    }
}

impl Default for SimHal {
    fn default() -> Self {
        Self::new()
    }
}

impl HalPort for SimHal {
    fn ready(&self) -> bool {
        self.ready
    }

    fn relay_on(&mut self, ch: RelayChannel) {
        self.set_line(ch, true);
    }

    fn relay_off(&mut self, ch: RelayChannel) {
        self.set_line(ch, false);
    }

    fn all_relays_off(&mut self) {
        for ch in RelayChannel::ALL {
            self.set_line(ch, false);
        }
    }

    fn cup_present(&mut self) -> bool {
        self.cup
    }

    fn read_internal_temp(&mut self) -> Option<f32> {
        self.internal_temp
    }

    fn read_external_temp(&mut self) -> Option<f32> {
        self.external_temp
    }

    fn read_limit_upper(&mut self) -> bool {
        self.deb_upper.sample(self.limit_upper_raw)
    }

    fn read_limit_lower(&mut self) -> bool {
        self.deb_lower.sample(self.limit_lower_raw)
    }
}
