//! Chat turn orchestration
//!
//! One call to [`ChatService::handle_turn`] appends the user message, sends
//! the assembled prompt to the completion gateway and records the reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{Config, FailurePolicy};
use crate::error::{Error, GatewayError, Result};
use crate::llm::{ChatMessage, CompletionGateway};
use crate::prompt::PromptAssembler;
use crate::session::{Session, SessionHandle, SessionLimits, SessionStore, Turn};

/// Per-turn behavior of the chat service
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Model identifier passed to the gateway
    pub model: String,
    /// Upper bound on a single completion call
    pub timeout: Duration,
    /// Longest accepted user message in characters (0 = unlimited)
    pub max_input_chars: usize,
    /// What to do when the gateway fails
    pub on_failure: FailurePolicy,
    /// Reply used by [`FailurePolicy::Fallback`]
    pub fallback_reply: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ChatSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.llm.model.clone(),
            timeout: Duration::from_secs(config.llm.timeout_secs),
            max_input_chars: config.chat.max_input_chars,
            on_failure: config.chat.on_failure,
            fallback_reply: config.chat.fallback_reply.clone(),
        }
    }
}

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: String,
    /// True when the reply is the fallback text rather than model output
    pub fallback: bool,
}

/// Session store + prompt assembler + completion gateway
pub struct ChatService {
    store: Arc<SessionStore>,
    assembler: PromptAssembler,
    gateway: Arc<dyn CompletionGateway>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<SessionStore>,
        assembler: PromptAssembler,
        gateway: Arc<dyn CompletionGateway>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            assembler,
            gateway,
            settings,
        }
    }

    /// Wire a service from configuration around the given gateway
    pub fn from_config(config: &Config, gateway: Arc<dyn CompletionGateway>) -> Result<Self> {
        let profile = config.prompt.resolve()?;
        let store = SessionStore::new(SessionLimits::from(&config.session));

        Ok(Self::new(
            Arc::new(store),
            PromptAssembler::new(profile),
            gateway,
            ChatSettings::from(config),
        ))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn validate(&self, session_id: &str, user_input: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(Error::InvalidInput("session_id must not be empty".to_string()));
        }
        if user_input.trim().is_empty() {
            return Err(Error::InvalidInput("user_input must not be empty".to_string()));
        }

        let max = self.settings.max_input_chars;
        if max > 0 && user_input.chars().count() > max {
            return Err(Error::InvalidInput(format!(
                "user_input exceeds {} characters",
                max
            )));
        }

        Ok(())
    }

    /// Run one chat turn for a session
    pub async fn handle_turn(&self, session_id: &str, user_input: &str) -> Result<ChatReply> {
        self.validate(session_id, user_input)?;

        let handle = self.store.get_or_create(session_id);
        let _turn = handle.begin_turn().await;

        let prompt = {
            let mut session = handle.lock().await;
            self.record(&mut session, Turn::user(user_input));
            self.assembler.build_prompt(&session.turns)
        };

        debug!(
            "Session {}: sending {} prompt messages to {}",
            session_id,
            prompt.len(),
            self.settings.model
        );

        match self.complete(&prompt).await {
            Ok(reply) => {
                self.record(&mut *handle.lock().await, Turn::assistant(reply.clone()));
                info!("Session {}: reply of {} chars", session_id, reply.len());

                Ok(ChatReply {
                    reply,
                    session_id: session_id.to_string(),
                    fallback: false,
                })
            }
            Err(e) => self.handle_failure(&handle, session_id, user_input, e).await,
        }
    }

    /// Append a turn and apply the per-session turn limit
    fn record(&self, session: &mut Session, turn: Turn) {
        session.push(turn);
        let trimmed = session.enforce_limit(self.store.limits().max_turns);
        if trimmed > 0 {
            debug!("Trimmed {} old turns from session {}", trimmed, session.id);
        }
    }

    async fn complete(&self, prompt: &[ChatMessage]) -> std::result::Result<String, GatewayError> {
        let reply = tokio::time::timeout(
            self.settings.timeout,
            self.gateway.complete(&self.settings.model, prompt),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.settings.timeout))??;

        if reply.trim().is_empty() {
            return Err(GatewayError::EmptyReply);
        }

        Ok(reply)
    }

    async fn handle_failure(
        &self,
        handle: &SessionHandle,
        session_id: &str,
        user_input: &str,
        e: GatewayError,
    ) -> Result<ChatReply> {
        match self.settings.on_failure {
            FailurePolicy::Error => {
                error!(
                    "Session {}: completion failed ({}): {}",
                    session_id,
                    e.kind(),
                    e
                );
                Err(Error::Gateway(e))
            }
            FailurePolicy::Fallback => {
                warn!(
                    "Session {}: completion failed ({}), answering with fallback: {}",
                    session_id,
                    e.kind(),
                    e
                );
                handle.lock().await.rollback_user_turn(user_input);

                Ok(ChatReply {
                    reply: self.settings.fallback_reply.clone(),
                    session_id: session_id.to_string(),
                    fallback: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptProfile;
    use crate::session::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Gateway that answers from a script and records every prompt
    #[derive(Default)]
    struct ScriptedGateway {
        replies: Mutex<VecDeque<std::result::Result<String, GatewayError>>>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
        delay: Option<Duration>,
    }

    impl ScriptedGateway {
        fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                ..Default::default()
            }
        }

        fn failing(error: GatewayError) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(error)])),
                ..Default::default()
            }
        }

        fn prompts(&self) -> Vec<Vec<ChatMessage>> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn complete(
            &self,
            _model: &str,
            messages: &[ChatMessage],
        ) -> std::result::Result<String, GatewayError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(format!("reply to {}", messages.len())))
        }
    }

    fn service(gateway: Arc<ScriptedGateway>, settings: ChatSettings) -> ChatService {
        ChatService::new(
            Arc::new(SessionStore::unbounded()),
            PromptAssembler::new(PromptProfile::storefront()),
            gateway,
            settings,
        )
    }

    #[tokio::test]
    async fn test_return_policy_scenario() {
        let gateway = Arc::new(ScriptedGateway::replying(&["Returns within 7 days."]));
        let chat = service(gateway.clone(), ChatSettings::default());

        let reply = chat.handle_turn("s1", "What is your return policy?").await.unwrap();

        assert_eq!(reply.reply, "Returns within 7 days.");
        assert_eq!(reply.session_id, "s1");
        assert!(!reply.fallback);

        let history = chat.store().history("s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                Turn::user("What is your return policy?"),
                Turn::assistant("Returns within 7 days."),
            ]
        );
    }

    #[tokio::test]
    async fn test_n_turns_alternate() {
        let gateway = Arc::new(ScriptedGateway::default());
        let chat = service(gateway, ChatSettings::default());

        for i in 0..5 {
            chat.handle_turn("s1", &format!("message {}", i)).await.unwrap();
        }

        let history = chat.store().history("s1").await.unwrap();
        assert_eq!(history.len(), 10);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
    }

    #[tokio::test]
    async fn test_second_prompt_includes_first_exchange() {
        let gateway = Arc::new(ScriptedGateway::replying(&["first reply", "second reply"]));
        let chat = service(gateway.clone(), ChatSettings::default());

        chat.handle_turn("s1", "first question").await.unwrap();
        chat.handle_turn("s1", "second question").await.unwrap();

        let prompts = gateway.prompts();
        assert_eq!(prompts[0].len(), 3);
        assert_eq!(prompts[1].len(), 5);
        assert_eq!(prompts[1][2], ChatMessage::user("first question"));
        assert_eq!(prompts[1][3], ChatMessage::assistant("first reply"));
        assert_eq!(prompts[1][4], ChatMessage::user("second question"));
        // Headers are identical on every request
        assert_eq!(prompts[0][..2], prompts[1][..2]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let gateway = Arc::new(ScriptedGateway::default());
        let chat = service(gateway.clone(), ChatSettings::default());

        chat.handle_turn("a", "hello from a").await.unwrap();
        chat.handle_turn("b", "hello from b").await.unwrap();

        let prompts = gateway.prompts();
        assert_eq!(prompts[1].len(), 3);
        assert_eq!(prompts[1][2], ChatMessage::user("hello from b"));
    }

    #[tokio::test]
    async fn test_failure_leaves_user_turn_under_error_policy() {
        let gateway = Arc::new(ScriptedGateway::failing(GatewayError::Network(
            "connection refused".to_string(),
        )));
        let chat = service(gateway, ChatSettings::default());

        let err = chat.handle_turn("s1", "Hello?").await.unwrap_err();

        assert!(matches!(err, Error::Gateway(GatewayError::Network(_))));
        assert_eq!(chat.store().history("s1").await.unwrap(), vec![Turn::user("Hello?")]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_under_fallback_policy() {
        let gateway = Arc::new(ScriptedGateway::failing(GatewayError::RateLimited(
            "quota".to_string(),
        )));
        let settings = ChatSettings {
            on_failure: FailurePolicy::Fallback,
            ..Default::default()
        };
        let chat = service(gateway, settings);

        let reply = chat.handle_turn("s1", "Hello?").await.unwrap();

        assert!(reply.fallback);
        assert_eq!(reply.reply, "Please contact our human support team for assistance.");
        assert!(chat.store().history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_failure() {
        let gateway = Arc::new(ScriptedGateway::replying(&["   "]));
        let chat = service(gateway, ChatSettings::default());

        let err = chat.handle_turn("s1", "Hello?").await.unwrap_err();

        assert!(matches!(err, Error::Gateway(GatewayError::EmptyReply)));
        assert_eq!(chat.store().history("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let gateway = Arc::new(ScriptedGateway {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let settings = ChatSettings {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let chat = service(gateway, settings);

        let err = chat.handle_turn("s1", "Hello?").await.unwrap_err();

        assert!(matches!(err, Error::Gateway(GatewayError::Timeout(_))));
        let history = chat.store().history("s1").await.unwrap();
        assert!(history.iter().all(|t| t.role == Role::User));
    }

    #[tokio::test]
    async fn test_validation_rejects_without_touching_state() {
        let gateway = Arc::new(ScriptedGateway::default());
        let settings = ChatSettings {
            max_input_chars: 10,
            ..Default::default()
        };
        let chat = service(gateway.clone(), settings);

        for (session_id, input) in [("s1", ""), ("s1", "   \n"), ("", "hi"), ("s1", "way too long input")] {
            let err = chat.handle_turn(session_id, input).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "accepted {:?}/{:?}", session_id, input);
        }

        assert!(chat.store().is_empty());
        assert!(gateway.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_turns_do_not_interleave() {
        let gateway = Arc::new(ScriptedGateway {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        let chat = Arc::new(service(gateway, ChatSettings::default()));

        let tasks = (0..8).map(|i| {
            let chat = Arc::clone(&chat);
            async move { chat.handle_turn("shared", &format!("message {}", i)).await }
        });
        let results = futures::future::join_all(tasks).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let history = chat.store().history("shared").await.unwrap();
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }

    #[tokio::test]
    async fn test_odd_turn_limit_is_respected_after_reply() {
        let gateway = Arc::new(ScriptedGateway::default());
        let chat = ChatService::new(
            Arc::new(SessionStore::new(SessionLimits {
                max_turns: 3,
                ..Default::default()
            })),
            PromptAssembler::default(),
            gateway.clone(),
            ChatSettings::default(),
        );

        for i in 0..4 {
            chat.handle_turn("s1", &format!("message {}", i)).await.unwrap();

            let history = chat.store().history("s1").await.unwrap();
            assert!(history.len() <= 3, "turn {} left {} entries", i, history.len());
            assert_eq!(history[0].role, Role::User);
            assert_eq!(history.last().unwrap().role, Role::Assistant);
        }

        // Prompt for the last turn still carried the previous exchange
        let last_prompt = gateway.prompts().pop().unwrap();
        assert_eq!(last_prompt.len(), 2 + 3);
        assert_eq!(last_prompt[4], ChatMessage::user("message 3"));
    }

    #[tokio::test]
    async fn test_from_config() {
        let mut config = Config::default();
        config.prompt.profile = "cod-policy".to_string();
        config.session.max_turns = 2;

        let gateway = Arc::new(ScriptedGateway::default());
        let chat = ChatService::from_config(&config, gateway).unwrap();

        assert_eq!(chat.assembler().profile(), &PromptProfile::cod_policy());
        assert_eq!(chat.store().limits().max_turns, 2);
        assert_eq!(chat.settings().model, "gpt-4o-mini");

        chat.handle_turn("s1", "one").await.unwrap();
        chat.handle_turn("s1", "two").await.unwrap();
        assert_eq!(chat.store().history("s1").await.unwrap().len(), 2);
    }
}
