//! Ordered interception chains ("hooks") for named events.
//!
//! A [`Hook`] is a mutable registry of uniquely identified, priority-ordered
//! handlers for one event type, dispatched as a chain of responsibility:
//! each handler receives the event and a [`Next`] continuation, and decides
//! whether the rest of the chain runs. A [`TaggedHook`] is a filtering view
//! over a shared hook whose handlers only fire when the event's tags match.
//!
//! Hooks are synchronous-per-call: links run one at a time, in
//! `(priority, insertion order)` order, within the triggering task.

pub mod hook;
pub mod tagged;

pub use hook::{Handler, HandlerFunc, Hook, Next, handler_fn};
pub use tagged::{Tagged, TaggedHook};
