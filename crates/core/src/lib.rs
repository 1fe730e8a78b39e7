//! # authorchat core
//!
//! Domain types, capability traits, and error definitions for the
//! authorchat persona runtime. This crate has **no framework dependencies**;
//! it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here (content store,
//! conversation store, generation engine, LLM provider, messaging channel).
//! Implementations live in their respective crates, so the turn pipeline
//! can be exercised with in-memory stores and scripted engines.

pub mod error;
pub mod message;
pub mod source;
pub mod provider;
pub mod engine;
pub mod store;
pub mod channel;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ConversationContext, ConversationId, Message, MessageKind};
pub use source::{Author, ContentSource};
pub use provider::{ChatMessage, Provider, ProviderRequest, ProviderResponse, Role, Usage};
pub use engine::{GeneratedResponse, GenerationEngine};
pub use store::{ContentSourceStore, ConversationStore};
pub use channel::{Channel, DeliveryStatus, InboundMessage, OutboundMessage};
