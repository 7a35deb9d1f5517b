//! Control dispatcher: text messages in, actuator commands out.
//!
//! Every complete text message goes through [`parse_command`]; a valid
//! command is applied to the [`HBridge`] immediately, an invalid one is
//! logged and dropped. There is no queue: whatever arrives last wins.

use crate::actuator::{HBridge, OutputChange};
use crate::command::{parse_command, Command};
use crate::server::{Dispatch, DispatchOutcome};
use crate::traits::BridgePins;
use log::{debug, info, warn};

/// Routes parsed commands to an [`HBridge`] and keeps simple counters.
#[derive(Clone, Debug, Default)]
pub struct ControlDispatcher {
    /// Commands that were parsed and accepted by the driver.
    pub applied: u32,
    /// Messages with no valid command.
    pub discarded: u32,
    /// Commands the driver failed to apply.
    pub actuator_errors: u32,
    last_command: Option<Command>,
}

impl ControlDispatcher {
    /// A dispatcher with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent command the driver accepted.
    pub fn last_command(&self) -> Option<Command> {
        self.last_command
    }
}

impl<P: BridgePins> Dispatch<HBridge<P>> for ControlDispatcher {
    fn dispatch(&mut self, payload: &str, bridge: &mut HBridge<P>) -> DispatchOutcome {
        let command = match parse_command(payload) {
            Ok(command) => command,
            Err(e) => {
                debug!("[CTRL] Discarding {payload:?}: {e}");
                self.discarded += 1;
                return DispatchOutcome::Discarded;
            }
        };

        match bridge.set_output(command.magnitude, command.polarity) {
            Ok(change) => {
                self.applied += 1;
                self.last_command = Some(command);
                if change == OutputChange::Unchanged {
                    DispatchOutcome::Unchanged
                } else {
                    info!("[CTRL] Output {command}");
                    DispatchOutcome::Applied
                }
            }
            Err(e) => {
                warn!("[CTRL] Failed to apply {command}: {e}");
                self.actuator_errors += 1;
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::BridgeLines;
    use crate::config::ActuatorConfig;
    use crate::hal::MockPins;
    use crate::traits::Polarity;

    fn bridge() -> HBridge<MockPins> {
        let config = ActuatorConfig::default();
        HBridge::new(MockPins::watching(BridgeLines::from(&config)), &config).unwrap()
    }

    #[test]
    fn valid_command_applied() {
        let mut ctrl = ControlDispatcher::new();
        let mut b = bridge();
        assert_eq!(ctrl.dispatch("40 1\n", &mut b), DispatchOutcome::Applied);
        assert_eq!(b.state().polarity, Some(Polarity::Reverse));
        assert_eq!(b.state().magnitude, 40.0);
        assert_eq!(ctrl.applied, 1);
        assert_eq!(
            ctrl.last_command(),
            Some(Command {
                magnitude: 40.0,
                polarity: Polarity::Reverse
            })
        );
    }

    #[test]
    fn repeat_command_unchanged() {
        let mut ctrl = ControlDispatcher::new();
        let mut b = bridge();
        ctrl.dispatch("40 1\n", &mut b);
        let writes = b.pins().writes.len();
        assert_eq!(ctrl.dispatch("40 1\n", &mut b), DispatchOutcome::Unchanged);
        assert_eq!(b.pins().writes.len(), writes);
    }

    #[test]
    fn invalid_command_leaves_output_alone() {
        let mut ctrl = ControlDispatcher::new();
        let mut b = bridge();
        ctrl.dispatch("25 0\n", &mut b);
        let before = b.state();
        let writes = b.pins().writes.len();

        assert_eq!(ctrl.dispatch("5 0\n3\n", &mut b), DispatchOutcome::Discarded);
        assert_eq!(ctrl.dispatch("hello", &mut b), DispatchOutcome::Discarded);
        assert_eq!(b.state(), before);
        assert_eq!(b.pins().writes.len(), writes);
        assert_eq!(ctrl.discarded, 2);
        assert_eq!(ctrl.applied, 1);
    }

    #[test]
    fn driver_failure_counted() {
        let config = ActuatorConfig::default();
        // 6 construction writes, then fail the first write of the next command
        let pins = MockPins::new().fail_on_write(6);
        let mut b = HBridge::new(pins, &config).unwrap();
        let mut ctrl = ControlDispatcher::new();
        assert_eq!(ctrl.dispatch("10 0\n", &mut b), DispatchOutcome::Failed);
        assert_eq!(ctrl.actuator_errors, 1);
        assert_eq!(ctrl.last_command(), None);
    }
}
