//! Cart states.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The state of a shopping cart in its lifecycle.
///
/// State transitions:
/// ```text
/// Initial ──► Active ──┬──► Ordered
///               ▲  │   └──► Expired
///               └──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CartState {
    /// No event has been applied yet.
    #[default]
    Initial,

    /// Items are being added; an expiry is pending.
    Active,

    /// The cart was turned into an order (terminal state).
    Ordered,

    /// The cart timed out before an order was submitted (terminal state).
    Expired,
}

impl CartState {
    /// Every state, in declaration order.
    pub const ALL: [CartState; 4] = [
        CartState::Initial,
        CartState::Active,
        CartState::Ordered,
        CartState::Expired,
    ];

    /// Returns the state name as stored in the saga table.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartState::Initial => "Initial",
            CartState::Active => "Active",
            CartState::Ordered => "Ordered",
            CartState::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for CartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for a state name outside the declared set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cart state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for CartState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CartState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}
