//! The NMT state machine
//!
//! ```text
//!              boot-up sent
//!   Boot-up ----------------> Pre-operational <--> Operational
//!      ^                           ^   |               ^  |
//!      | reset node / comm         |   v               |  v
//!      +------- (any state)        +-- Stopped <--------+--+
//! ```
use canstack_common::{
    messages::{NmtCommandSpecifier, NmtState},
    AtomicCell,
};

/// What a node must do in response to an NMT command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtAction {
    /// Move to the given state
    Enter(NmtState),
    /// Re-initialize the application and communication, then boot
    ResetNode,
    /// Re-initialize communication, then boot
    ResetComm,
    /// Nothing to do
    Ignore,
}

/// Decide the action for command `cs` received in `state`
///
/// Start, stop and pre-operational commands are ignored until boot-up has completed.
pub fn command_action(state: NmtState, cs: NmtCommandSpecifier) -> NmtAction {
    match cs {
        NmtCommandSpecifier::ResetNode => NmtAction::ResetNode,
        NmtCommandSpecifier::ResetComm => NmtAction::ResetComm,
        _ if state == NmtState::Bootup => NmtAction::Ignore,
        NmtCommandSpecifier::Start => NmtAction::Enter(NmtState::Operational),
        NmtCommandSpecifier::Stop => NmtAction::Enter(NmtState::Stopped),
        NmtCommandSpecifier::EnterPreOp => NmtAction::Enter(NmtState::PreOperational),
    }
}

/// Holds the current NMT state
#[derive(Debug)]
pub struct NmtStateMachine {
    state: AtomicCell<NmtState>,
}

impl Default for NmtStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl NmtStateMachine {
    /// Create a state machine in Boot-up
    pub const fn new() -> Self {
        Self {
            state: AtomicCell::new(NmtState::Bootup),
        }
    }

    /// The current state
    pub fn state(&self) -> NmtState {
        self.state.load()
    }

    /// Move to `new`, returning the previous state if it changed
    pub fn transition(&self, new: NmtState) -> Option<NmtState> {
        let old = self.state.swap(new);
        (old != new).then_some(old)
    }

    /// Leave Boot-up for Pre-operational
    ///
    /// Returns false, changing nothing, when not in Boot-up.
    pub fn complete_boot(&self) -> bool {
        self.state
            .fetch_update(|s| (s == NmtState::Bootup).then_some(NmtState::PreOperational))
            .is_ok()
    }
}
