//! Prompt assembly
//!
//! Every completion request is built from two fixed instruction strings
//! followed by the full turn history of the session. The instruction strings
//! are never stored in the session log.

use std::sync::Arc;

use crate::llm::ChatMessage;
use crate::session::Turn;

const STOREFRONT_RULES: &str = "
You are a professional customer support AI agent.

Rules:
- Answer only business-related questions
- Be polite, clear, and helpful
- Do NOT invent prices or policies
- If unsure, escalate to human support
";

const STOREFRONT_CONTEXT: &str = "
Business Type: Demo E-commerce Store (Portfolio Project)

Shipping:
- Nationwide delivery available
- Delivery time: 3–5 business days

Payment:
- Cash on Delivery (COD) available
- Online payments coming soon

Returns:
- Returns accepted within 7 days
- Item must be unused and original
- Refund approval handled by human support

Support Rule:
- If question is unclear or sensitive, say:
  \"Please contact our human support team for assistance.\"
";

const COD_POLICY_RULES: &str = "
You are a professional customer support agent for this business.

Rules:
- Answer only using the business information provided
- Be polite, clear, and professional
- Do NOT invent information
- If something is not available, suggest contacting human support
";

const COD_POLICY_CONTEXT: &str = "
Business Information:
- The business offers Cash on Delivery (COD)
- COD is available nationwide
- Delivery time is 3–5 working days
- Product prices are fixed and shown on the product page
- Refunds are accepted within 7 days of delivery
- For complex issues, customers should contact human support
";

/// The two instruction strings sent ahead of every conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptProfile {
    /// Behavioral rules for the assistant
    pub system_rules: String,
    /// Business policy facts the assistant may rely on
    pub business_context: String,
}

impl PromptProfile {
    /// Names accepted by [`PromptProfile::from_name`]
    pub const NAMES: &'static [&'static str] = &["storefront", "cod-policy"];

    pub fn new(system_rules: impl Into<String>, business_context: impl Into<String>) -> Self {
        Self {
            system_rules: system_rules.into(),
            business_context: business_context.into(),
        }
    }

    /// Demo e-commerce store with shipping, payment and return sections
    pub fn storefront() -> Self {
        Self::new(STOREFRONT_RULES, STOREFRONT_CONTEXT)
    }

    /// Cash-on-delivery business answering strictly from its fact sheet
    pub fn cod_policy() -> Self {
        Self::new(COD_POLICY_RULES, COD_POLICY_CONTEXT)
    }

    /// Look up a built-in profile by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "storefront" | "default" => Some(Self::storefront()),
            "cod-policy" | "cod_policy" | "cod" => Some(Self::cod_policy()),
            _ => None,
        }
    }
}

impl Default for PromptProfile {
    fn default() -> Self {
        Self::storefront()
    }
}

/// Builds completion prompts from a fixed profile and a session log
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    profile: Arc<PromptProfile>,
}

impl PromptAssembler {
    pub fn new(profile: PromptProfile) -> Self {
        Self {
            profile: Arc::new(profile),
        }
    }

    pub fn profile(&self) -> &PromptProfile {
        &self.profile
    }

    /// Assemble the prompt: system rules, business context, then every turn
    /// in stored order.
    pub fn build_prompt(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(ChatMessage::system(&self.profile.system_rules));
        messages.push(ChatMessage::system(&self.profile.business_context));
        messages.extend(turns.iter().map(ChatMessage::from));
        messages
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(PromptProfile::default())
    }
}
