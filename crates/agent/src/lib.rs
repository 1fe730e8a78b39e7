//! The turn pipeline behind every author reply.
//!
//! A turn follows a **Fan out → Synthesize → Commit** cycle:
//!
//! 1. **Resolve** the author the user addressed and load the conversation
//! 2. **Dispatch** the query to every book of that author concurrently
//! 3. **Aggregate** whatever answered in time into one reply
//! 4. **Commit** the user message and the reply to the conversation
//!
//! Books that fail or run past their timeout are dropped from the turn. A
//! turn that fails at any step leaves the stored conversation as it was.

pub mod aggregator;
pub mod conversation;
pub mod dispatcher;
pub mod engine;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use aggregator::Aggregator;
pub use conversation::{ConversationManager, TurnLocks};
pub use dispatcher::Dispatcher;
pub use engine::LlmEngine;
