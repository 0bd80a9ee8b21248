//! State machine definition and the shopping-cart transition table.

use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::Duration;

use common::CorrelationId;
use saga_store::SagaRecord;
use uuid::Uuid;

use crate::events::CartEvent;
use crate::state::CartState;

/// Side effect requested by a transition, dispatched after the new state is saved.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Noop,
    /// Deliver `payload` to `destination` after `delay`, replacing any
    /// pending delivery with the same token.
    Schedule {
        token: String,
        destination: String,
        payload: serde_json::Value,
        delay: Duration,
    },
    /// Drop the pending delivery for `token`, if any.
    Cancel { token: String },
}

/// Outcome of looking up `(state, event)` in a transition table.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<S> {
    Next { state: S, effects: Vec<Effect> },
    /// No entry for the pair; the event is acknowledged and ignored.
    Unhandled,
    /// The pair is explicitly forbidden.
    Disallowed,
}

impl<S> Transition<S> {
    pub fn to(state: S) -> Self {
        Transition::Next {
            state,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(state: S, effect: Effect) -> Self {
        Transition::Next {
            state,
            effects: vec![effect],
        }
    }
}

/// A closed set of states and events with a pure transition function.
pub trait StateMachine: Send + Sync {
    type State: Copy + Eq + Debug + Display + FromStr + Send + Sync;
    type Event: Debug + Send + Sync;

    fn initial_state(&self) -> Self::State;

    /// Looks up the transition for `event` in `state`.
    ///
    /// Must not depend on anything but its arguments.
    fn transition(
        &self,
        correlation_id: CorrelationId,
        state: Self::State,
        event: &Self::Event,
    ) -> Transition<Self::State>;

    /// Copies pass-through attributes from an accepted event onto the instance.
    fn apply(&self, _instance: &mut SagaRecord, _event: &Self::Event) {}

    fn event_name(&self, event: &Self::Event) -> &'static str;
}

/// Namespace for expiration tokens derived from cart ids.
pub const EXPIRATION_NAMESPACE: Uuid = Uuid::from_u128(0x6b1e_2c4a_8f3d_4e7b_9a05_d2c1_f0e3_a7b4);

/// Default time a cart may sit idle before it expires.
pub const DEFAULT_CART_EXPIRY: Duration = Duration::from_secs(600);

/// Default queue carrying cart events.
pub const DEFAULT_CART_STATE_QUEUE: &str = "cart_state";

/// The shopping-cart lifecycle.
///
/// | state   | ItemAdded                | OrderSubmitted            | CartExpired |
/// |---------|--------------------------|---------------------------|-------------|
/// | Initial | Active, schedule expiry  | disallowed                | unhandled   |
/// | Active  | Active, schedule expiry  | Ordered, cancel expiry    | Expired     |
/// | Ordered | disallowed               | unhandled                 | unhandled   |
/// | Expired | disallowed               | unhandled                 | unhandled   |
///
/// Every ItemAdded reschedules the same token, so the expiry slides.
#[derive(Debug, Clone)]
pub struct ShoppingCartMachine {
    expiry: Duration,
    destination: String,
}

impl ShoppingCartMachine {
    pub fn new(expiry: Duration, destination: impl Into<String>) -> Self {
        Self {
            expiry,
            destination: destination.into(),
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The expiration id of a cart; also the scheduler token for its expiry.
    pub fn expiration_id(correlation_id: CorrelationId) -> Uuid {
        correlation_id.derive(&EXPIRATION_NAMESPACE)
    }

    fn schedule_expiry(&self, correlation_id: CorrelationId) -> Effect {
        Effect::Schedule {
            token: Self::expiration_id(correlation_id).to_string(),
            destination: self.destination.clone(),
            payload: serde_json::json!({
                "correlation_id": correlation_id,
                "event": { "type": "CartExpired" },
            }),
            delay: self.expiry,
        }
    }

    fn cancel_expiry(correlation_id: CorrelationId) -> Effect {
        Effect::Cancel {
            token: Self::expiration_id(correlation_id).to_string(),
        }
    }
}

impl Default for ShoppingCartMachine {
    fn default() -> Self {
        Self::new(DEFAULT_CART_EXPIRY, DEFAULT_CART_STATE_QUEUE)
    }
}

impl StateMachine for ShoppingCartMachine {
    type State = CartState;
    type Event = CartEvent;

    fn initial_state(&self) -> CartState {
        CartState::Initial
    }

    fn transition(
        &self,
        correlation_id: CorrelationId,
        state: CartState,
        event: &CartEvent,
    ) -> Transition<CartState> {
        use CartState::*;

        match (state, event) {
            (Initial | Active, CartEvent::ItemAdded(_)) => {
                Transition::with_effect(Active, self.schedule_expiry(correlation_id))
            }
            (Ordered | Expired, CartEvent::ItemAdded(_)) => Transition::Disallowed,

            (Active, CartEvent::OrderSubmitted(_)) => {
                Transition::with_effect(Ordered, Self::cancel_expiry(correlation_id))
            }
            (Initial, CartEvent::OrderSubmitted(_)) => Transition::Disallowed,
            (Ordered | Expired, CartEvent::OrderSubmitted(_)) => Transition::Unhandled,

            (Active, CartEvent::CartExpired) => Transition::to(Expired),
            (Initial | Ordered | Expired, CartEvent::CartExpired) => Transition::Unhandled,
        }
    }

    fn apply(&self, instance: &mut SagaRecord, event: &CartEvent) {
        match event {
            CartEvent::ItemAdded(data) => {
                instance.user_name = Some(data.user_name.clone());
                instance.expiration_id = Some(Self::expiration_id(instance.correlation_id));
            }
            CartEvent::OrderSubmitted(data) => {
                instance.order_id = Some(data.order_id);
            }
            CartEvent::CartExpired => {}
        }
    }

    fn event_name(&self, event: &CartEvent) -> &'static str {
        event.event_type()
    }
}
