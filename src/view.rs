//! Everything the user can see, bundled so the router and encoder can be
//! exercised without a session or a network.

use crate::status::{Affordances, StatusIndicator};
use crate::transcript::Transcript;
use crate::turn::TurnTracker;

#[derive(Debug, Default)]
pub struct ChatView {
    pub turns: TurnTracker,
    pub transcript: Transcript,
    pub status: StatusIndicator,
    pub controls: Affordances,
    /// Pending text in the message input.
    pub input: String,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }
}
