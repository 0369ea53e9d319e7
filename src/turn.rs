//! Turn/identity tracking.
//!
//! Each role (user, agent) owns at most one open transcript bubble at a time.
//! New data either lands in that open bubble or, when the role is closed,
//! opens a fresh one. The per-role lifecycle is an explicit two-state machine:
//!
//! ```text
//!   Closed --Open(id)--> Open(id)
//!   Open   --TurnComplete | Superseded | Disconnect | Finalized--> Closed
//! ```
//!
//! Close events on an already closed role are no-ops. Opening a role that is
//! already open is rejected, so a caller can never silently lose track of a
//! live bubble.

use thiserror::Error;

use crate::transcript::BubbleId;

/// Who authored a bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// Lifecycle state of one role's bubble.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoleState {
    #[default]
    Closed,
    Open(BubbleId),
}

/// Why an open bubble is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The server signalled `turn_complete`.
    TurnComplete,
    /// The other role started speaking.
    Superseded,
    /// The connection closed.
    Disconnect,
    /// A final response (image, gallery, submitted text) ended the bubble.
    Finalized,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("{role} bubble {open} is already open")]
    AlreadyOpen { role: Role, open: BubbleId },
}

/// Holds the open/closed state for both roles.
#[derive(Debug, Clone, Default)]
pub struct TurnTracker {
    user: RoleState,
    agent: RoleState,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, role: Role) -> &RoleState {
        match role {
            Role::User => &self.user,
            Role::Agent => &self.agent,
        }
    }

    /// The open bubble for `role`, if any.
    pub fn current(&self, role: Role) -> Option<&BubbleId> {
        match self.state(role) {
            RoleState::Open(id) => Some(id),
            RoleState::Closed => None,
        }
    }

    pub fn is_open(&self, role: Role) -> bool {
        self.current(role).is_some()
    }

    /// `Closed -> Open(id)`.
    pub fn open(&mut self, role: Role, id: BubbleId) -> Result<(), TurnError> {
        let slot = self.slot_mut(role);
        if let RoleState::Open(open) = slot {
            return Err(TurnError::AlreadyOpen {
                role,
                open: open.clone(),
            });
        }
        tracing::trace!(%role, %id, "bubble opened");
        *slot = RoleState::Open(id);
        Ok(())
    }

    /// `Open(id) -> Closed`. Returns the id that was open, or `None` if the
    /// role was already closed.
    pub fn close(&mut self, role: Role, reason: CloseReason) -> Option<BubbleId> {
        match std::mem::take(self.slot_mut(role)) {
            RoleState::Open(id) => {
                tracing::trace!(%role, %id, ?reason, "bubble closed");
                Some(id)
            }
            RoleState::Closed => None,
        }
    }

    /// Close both roles, e.g. on `turn_complete` or disconnect.
    pub fn reset(&mut self, reason: CloseReason) {
        self.close(Role::User, reason);
        self.close(Role::Agent, reason);
    }

    fn slot_mut(&mut self, role: Role) -> &mut RoleState {
        match role {
            Role::User => &mut self.user,
            Role::Agent => &mut self.agent,
        }
    }
}
