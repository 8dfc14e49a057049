//! State enum and transition table (§4.6): a `matches!` over `(from,
//! event)` pairs, with tests enumerating every legal and illegal
//! transition.

use std::fmt;

use fleet_core::FleetError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Off,
    Stopped,
    Starting,
    Running,
    Restarting,
    DelayedShutdown,
    Suspending,
    Suspended,
    Unknown,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmState::Off => "off",
            VmState::Stopped => "stopped",
            VmState::Starting => "starting",
            VmState::Running => "running",
            VmState::Restarting => "restarting",
            VmState::DelayedShutdown => "delayed_shutdown",
            VmState::Suspending => "suspending",
            VmState::Suspended => "suspended",
            VmState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// How long to wait before actually stopping (§4.6's `stop(delay)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDelay {
    Immediate,
    After(std::time::Duration),
}

/// Events that drive §4.6's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmEventKind {
    Start,
    Stop(StopDelayTag),
    CancelStop,
    Suspend,
    Reboot,
    ForceStop,
}

/// Transition-table-relevant subset of `StopDelay` (whether it's zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDelayTag {
    Zero,
    Positive,
}

impl From<StopDelay> for StopDelayTag {
    fn from(d: StopDelay) -> Self {
        match d {
            StopDelay::Immediate => StopDelayTag::Zero,
            StopDelay::After(d) if d.is_zero() => StopDelayTag::Zero,
            StopDelay::After(_) => StopDelayTag::Positive,
        }
    }
}

/// A state-change notification (§9: `VMStatusMonitor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmEvent {
    pub from: VmState,
    pub to: VmState,
}

/// Validate and resolve a transition. Returns the *immediately entered*
/// state — for multi-step transitions like `starting → running` the
/// caller (the orchestrator) is responsible for driving the second half
/// once the backend reports readiness; this function only validates that
/// the event is legal from `from` and returns the first hop.
pub fn validate_transition(from: VmState, event: VmEventKind) -> Result<VmState, FleetError> {
    use VmEventKind::*;
    use VmState::*;

    let to = match (from, event) {
        (Stopped | Off, Start) => Starting,
        (Running, Stop(StopDelayTag::Zero)) => Stopped,
        (Running, Stop(StopDelayTag::Positive)) => DelayedShutdown,
        (DelayedShutdown, CancelStop) => Running,
        (DelayedShutdown, Stop(StopDelayTag::Zero)) => Stopped,
        (Running, Suspend) => Suspended,
        (Suspended, Start) => Running,
        (Running, Reboot) => Running,
        (_, ForceStop) => Stopped,
        _ => {
            return Err(FleetError::InstanceSettings {
                message: format!("cannot apply {:?} from state {}", event, from),
            });
        }
    };
    Ok(to)
}
