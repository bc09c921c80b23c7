use super::admin::AdminCommand;
use super::protocol::Command;

/// An event produced by the codec for the processing stage to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GearmanEvent {
    /// A binary-protocol command.
    Command(Command),
    /// A text-admin-dialect command, decoded from a single `\n`-terminated
    /// line (spec §4.1: "switching is per-packet, not per-connection").
    Admin(AdminCommand),
}
