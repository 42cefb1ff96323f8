//! Completion API client and types
//!
//! Supports OpenAI-compatible APIs and the Anthropic messages API behind
//! the [`CompletionGateway`] trait.

mod client;
mod gateway;
mod types;

pub use client::LlmClient;
pub use gateway::CompletionGateway;
pub use types::*;
