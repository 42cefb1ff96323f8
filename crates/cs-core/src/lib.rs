//! cs-core: Customer Support Agent Core Library
//!
//! Conversation session store, prompt assembly, the completion gateway
//! client and the chat turn orchestration that ties them together.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod session;

pub use chat::{ChatReply, ChatService, ChatSettings};
pub use config::{ApiConfig, ChatConfig, Config, FailurePolicy, LlmConfig, LlmProvider, PromptConfig, SessionConfig};
pub use error::{Error, GatewayError, Result};
pub use llm::{ChatMessage, CompletionGateway, LlmClient};
pub use prompt::{PromptAssembler, PromptProfile};
pub use session::{Role, Session, SessionHandle, SessionLimits, SessionStore, Turn};
