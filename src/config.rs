//! Recipe timing and temperature parameters.
//!
//! All tunable parameters for a drink cycle, adjustable from the service
//! menu and persisted in non-volatile storage. The controller copies a
//! snapshot at `start()`, so edits never affect a cycle already in flight.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::storage::StoragePort;

/// Storage namespace for the persisted settings keys.
const NAMESPACE: &str = "machine";

/// Per-cycle configuration. Durations in seconds, temperatures in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Sugar tank dispense base time.
    pub tank1_time: u32,
    /// Ground-coffee tank dispense base time.
    pub tank2_time: u32,
    /// Instant-coffee tank dispense base time.
    pub tank3_time: u32,
    /// Water pump base duration.
    pub water_pump_time: u32,
    /// Milk pump base duration.
    pub milk_pump_time: u32,
    /// Total time budget for the internal heater per cycle.
    pub int_heater_time: u32,
    /// Internal heater target for the hysteresis loop.
    pub int_heater_temp: f32,
    /// Cup-warmer run time (the warmer is timer-only).
    pub ext_heater_time: u32,
    /// Accepted and persisted for the cup warmer, but the warm phase never
    /// consults it — kept for settings-page compatibility.
    pub ext_heater_temp: f32,
    /// Mixer rotation duration.
    pub mixer_time: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tank1_time: 2,
            tank2_time: 3,
            tank3_time: 3,
            water_pump_time: 5,
            milk_pump_time: 4,
            int_heater_time: 30,
            int_heater_temp: 95.0,
            ext_heater_time: 45,
            ext_heater_temp: 90.0,
            mixer_time: 10,
        }
    }
}

impl Settings {
    /// Range-check every field. Out-of-range settings are rejected, never
    /// clamped — a compromised control channel must not be able to stretch
    /// heater budgets by feeding extremes.
    pub fn validate(&self) -> bool {
        self.tank1_time <= 30
            && self.tank2_time <= 30
            && self.tank3_time <= 30
            && self.water_pump_time <= 60
            && self.milk_pump_time <= 60
            && (10..=120).contains(&self.int_heater_time)
            && (60.0..=100.0).contains(&self.int_heater_temp)
            && (10..=180).contains(&self.ext_heater_time)
            && (60.0..=100.0).contains(&self.ext_heater_temp)
            && (5..=60).contains(&self.mixer_time)
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

const U32_KEYS: [&str; 8] = [
    "tank1_time",
    "tank2_time",
    "tank3_time",
    "water_pump_time",
    "milk_pump_time",
    "int_heater_time",
    "ext_heater_time",
    "mixer_time",
];
const F32_KEYS: [&str; 2] = ["int_heater_temp", "ext_heater_temp"];

/// Settings store: a validated in-RAM copy plus its persistent backing.
///
/// `get()` is a cheap snapshot; `save()` validates and persists; the keys in
/// storage carry the field names above so the service UI and this firmware
/// agree on the layout.
pub struct SettingsStore<S: StoragePort> {
    store: S,
    current: Settings,
}

impl<S: StoragePort> SettingsStore<S> {
    /// Open the store, loading persisted values or writing defaults on
    /// first boot.
    pub fn new(store: S) -> Self {
        let mut this = Self {
            store,
            current: Settings::default(),
        };
        if this.store.exists(NAMESPACE, U32_KEYS[0]) {
            match this.load() {
                Some(s) if s.validate() => {
                    info!("settings loaded from storage");
                    this.current = s;
                }
                _ => {
                    warn!("stored settings unreadable or out of range, restoring defaults");
                    this.set_defaults();
                }
            }
        } else {
            info!("no saved settings, writing defaults");
            this.set_defaults();
        }
        this
    }

    /// Snapshot of the live settings.
    pub fn get(&self) -> Settings {
        self.current
    }

    /// Validate and persist. Returns false (and changes nothing) if any
    /// field is out of range or the backend rejects a write.
    pub fn save(&mut self, s: Settings) -> bool {
        if !s.validate() {
            warn!("settings rejected: field out of range");
            return false;
        }
        if let Err(e) = self.persist(&s) {
            warn!("settings persist failed: {e}");
            return false;
        }
        self.current = s;
        info!("settings saved");
        true
    }

    /// Restore and persist factory defaults.
    pub fn set_defaults(&mut self) {
        self.current = Settings::default();
        if let Err(e) = self.persist(&Settings::default()) {
            warn!("default settings persist failed: {e}");
        }
    }

    fn persist(&mut self, s: &Settings) -> Result<(), crate::error::StorageError> {
        for (key, value) in U32_KEYS.iter().zip(Self::u32_fields(s)) {
            self.store.write(NAMESPACE, key, &value.to_le_bytes())?;
        }
        for (key, value) in F32_KEYS.iter().zip([s.int_heater_temp, s.ext_heater_temp]) {
            self.store.write(NAMESPACE, key, &value.to_le_bytes())?;
        }
        Ok(())
    }

    fn load(&self) -> Option<Settings> {
        let mut u = [0u32; 8];
        for (key, slot) in U32_KEYS.iter().zip(u.iter_mut()) {
            *slot = u32::from_le_bytes(self.read_exact(key)?);
        }
        let mut f = [0f32; 2];
        for (key, slot) in F32_KEYS.iter().zip(f.iter_mut()) {
            *slot = f32::from_le_bytes(self.read_exact(key)?);
        }
        Some(Settings {
            tank1_time: u[0],
            tank2_time: u[1],
            tank3_time: u[2],
            water_pump_time: u[3],
            milk_pump_time: u[4],
            int_heater_time: u[5],
            ext_heater_time: u[6],
            mixer_time: u[7],
            int_heater_temp: f[0],
            ext_heater_temp: f[1],
        })
    }

    fn read_exact(&self, key: &str) -> Option<[u8; 4]> {
        let mut buf = [0u8; 4];
        match self.store.read(NAMESPACE, key, &mut buf) {
            Ok(4) => Some(buf),
            _ => None,
        }
    }

    fn u32_fields(s: &Settings) -> [u32; 8] {
        [
            s.tank1_time,
            s.tank2_time,
            s.tank3_time,
            s.water_pump_time,
            s.milk_pump_time,
            s.int_heater_time,
            s.ext_heater_time,
            s.mixer_time,
        ]
    }
}
