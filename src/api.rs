//! Command/query surface.
//!
//! The network layer (HTTP/JSON on the appliance, a terminal on the host)
//! talks to the core through this module and nothing else: JSON orders are
//! decoded here into the typed model, commands go into a one-deep mailbox
//! drained at the top of the next tick, and state is observed through a
//! serializable [`StatusReport`] snapshot polled at [`STATUS_POLL_MS`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{Settings, SettingsStore};
use crate::error::ErrorKind;
use crate::hal::HalPort;
use crate::machine::Machine;
use crate::order::OrderParams;
use crate::storage::StoragePort;

/// Poll cadence the external command source uses; also the coarsest tick
/// rate the cycle is designed for.
pub const STATUS_POLL_MS: u64 = 400;

/// Commands external adapters can send into the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Begin a drink or cleaning cycle.
    Start(OrderParams),
    /// Abort whatever is running; safe-stop everything.
    Stop,
    /// Validate and persist new settings.
    SaveSettings(Settings),
    /// Restore factory settings.
    ResetSettings,
}

/// Poll payload for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: &'static str,
    pub step: &'static str,
    /// Last error tag, empty when none.
    pub error: &'static str,
    pub busy: bool,
}

/// Decode a JSON order, mapping any malformed or unknown field to the
/// `BAD_MODE` rejection. The only place in the crate that parses strings
/// into the order model.
pub fn decode_order(json: &str) -> Result<OrderParams, ErrorKind> {
    serde_json::from_str(json).map_err(|e| {
        warn!("order rejected: {e}");
        ErrorKind::BadMode
    })
}

/// The owning aggregate: HAL, clock, settings store, and machine,
/// constructed at boot and moved into the tick loop. Everything the
/// outside world does goes through [`submit`](Self::submit) and
/// [`status`](Self::status).
pub struct ControlSurface<H: HalPort, C: Clock, S: StoragePort> {
    hal: H,
    clock: C,
    settings: SettingsStore<S>,
    machine: Machine,
    mailbox: Option<Command>,
}

impl<H: HalPort, C: Clock, S: StoragePort> ControlSurface<H, C, S> {
    pub fn new(hal: H, clock: C, settings: SettingsStore<S>) -> Self {
        let machine = Machine::new(settings.get());
        Self {
            hal,
            clock,
            settings,
            machine,
            mailbox: None,
        }
    }

    /// Queue a command for the next tick. Commands queue at most one deep;
    /// returns false (caller should retry after a poll) when occupied.
    pub fn submit(&mut self, cmd: Command) -> bool {
        if self.mailbox.is_some() {
            warn!("command mailbox occupied, rejecting");
            return false;
        }
        self.mailbox = Some(cmd);
        true
    }

    /// Drain the mailbox, then advance the machine one tick.
    pub fn tick(&mut self) {
        if let Some(cmd) = self.mailbox.take() {
            self.dispatch(cmd);
        }
        self.machine.tick(&mut self.hal, &self.clock);
    }

    /// Snapshot for the poll endpoint.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.machine.state_name(),
            step: self.machine.step(),
            error: self.machine.error().map(ErrorKind::as_str).unwrap_or(""),
            busy: self.machine.busy(),
        }
    }

    /// Live settings snapshot (for the settings page).
    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Mutable HAL access for simulation stepping and tests.
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Start(order) => {
                let cfg = self.settings.get();
                self.machine.start(order, &mut self.hal, cfg, &self.clock);
            }
            Command::Stop => self.machine.stop(&mut self.hal),
            Command::SaveSettings(s) => {
                self.settings.save(s);
            }
            Command::ResetSettings => self.settings.set_defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hal::SimHal;
    use crate::order::Recipe;
    use crate::storage::MemStorage;

    fn surface() -> ControlSurface<SimHal, ManualClock, MemStorage> {
        ControlSurface::new(
            SimHal::new(),
            ManualClock::new(),
            SettingsStore::new(MemStorage::new()),
        )
    }

    #[test]
    fn mailbox_is_one_deep() {
        let mut s = surface();
        assert!(s.submit(Command::Stop));
        assert!(!s.submit(Command::Stop), "second command must be rejected");
        s.tick();
        assert!(s.submit(Command::Stop), "drained after a tick");
    }

    #[test]
    fn start_command_reaches_the_machine() {
        let mut s = surface();
        s.submit(Command::Start(OrderParams::new(Recipe::Coffee)));
        s.tick();
        assert!(s.status().busy);
        assert_eq!(s.status().error, "");
    }

    #[test]
    fn malformed_order_maps_to_bad_mode() {
        assert_eq!(
            decode_order(r#"{"recipe":"tea"}"#).unwrap_err(),
            ErrorKind::BadMode
        );
        assert_eq!(decode_order("not json").unwrap_err(), ErrorKind::BadMode);
    }

    #[test]
    fn well_formed_order_decodes() {
        let order = decode_order(
            r#"{"recipe":"instant","size":"Double","sugar":"Medium","milk_ratio":"extra"}"#,
        )
        .unwrap();
        assert_eq!(order.recipe, Recipe::Instant);
    }

    #[test]
    fn save_settings_round_trips_through_the_surface() {
        let mut s = surface();
        let custom = Settings {
            mixer_time: 20,
            ..Settings::default()
        };
        s.submit(Command::SaveSettings(custom));
        s.tick();
        assert_eq!(s.settings(), custom);
    }

    #[test]
    fn status_serializes_for_the_poll_endpoint() {
        let s = surface();
        let json = serde_json::to_string(&s.status()).unwrap();
        assert!(json.contains("\"state\":\"Idle\""));
        assert!(json.contains("\"busy\":false"));
    }
}
