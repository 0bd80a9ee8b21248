//! Shopping-cart saga.
//!
//! A cart advances through `Initial → Active → Ordered | Expired` as events
//! arrive. [`StateMachineRuntime`] serializes events per cart, loads or
//! creates the instance from the saga store, applies the pure transition
//! table of a [`StateMachine`], persists the result, and only then dispatches
//! the resulting [`Effect`]s (expiry scheduling and cancellation) to an
//! [`EffectDispatcher`], normally the scheduler bridge.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod machine;
pub mod runtime;
pub mod state;

pub use dispatch::{EffectDispatcher, RecordingDispatcher};
pub use error::{Result, SagaError};
pub use events::{CartEnvelope, CartEvent, ItemAddedData, OrderSubmittedData};
pub use machine::{Effect, ShoppingCartMachine, StateMachine, Transition};
pub use runtime::{HandleOutcome, StateMachineRuntime};
pub use state::CartState;
