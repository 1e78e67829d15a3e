//! The `llm_session` module encapsulates a conversational session with a Language Learning Model (LLM).
//! It provides the foundational tools necessary for real-time, back-and-forth interactions with the LLM,
//! ensuring that both the user's queries and the LLM's responses are managed and tracked efficiently within
//! specified token limits to comply with model constraints.
//!
//! At its core is the `LLMSession` structure, responsible for maintaining a running dialogue history
//! while adhering to the token limitations of the LLM. This allows for contextualized exchanges that build
//! upon previous interactions without exceeding the model's capacity.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ori::clients::openai::{Model, OpenAIClient};
//! use ori::LLMSession;
//! use ori::client_wrapper::Role;
//!
//! # async {
//! let client = OpenAIClient::new_with_model_enum("YOUR_OPENAI_SECRET_KEY", Model::GPT41Nano);
//! let mut session = LLMSession::new(client, "You are an AI assistant.".to_string(), 8_000);
//! let reply = session.send_message(Role::User, "Hello!".to_string(), None).await.unwrap();
//! println!("{}", reply.content);
//! # };
//! ```

use std::sync::Arc;

use crate::ori::client_wrapper::{ClientWrapper, Message, Role, ToolDefinition};

/// A conversational session wrapping a single [`ClientWrapper`] implementation.
///
/// Maintains a system prompt plus a rolling message history, trimming the
/// oldest non-system messages once the session's token budget is exceeded.
/// Token accounting is an approximation (see [`count_tokens`]) — good enough
/// to keep requests under a provider's context window without round-tripping
/// through a real tokenizer.
pub struct LLMSession<T: ClientWrapper> {
    client: Arc<T>,
    system_prompt: Message,
    conversation_history: Vec<Message>,
    max_tokens: usize,
    token_count: usize,
}

impl<T: ClientWrapper> LLMSession<T> {
    /// Creates a new `LLMSession` with the given client and system prompt.
    pub fn new(client: T, system_prompt: String, max_tokens: usize) -> Self {
        let system_prompt_message = Message {
            role: Role::System,
            content: Arc::from(system_prompt.as_str()),
            tool_calls: Vec::new(),
        };
        let system_prompt_tokens = count_message_tokens(&system_prompt_message);
        LLMSession {
            client: Arc::new(client),
            system_prompt: system_prompt_message,
            conversation_history: Vec::new(),
            max_tokens,
            token_count: system_prompt_tokens,
        }
    }

    /// Borrow the underlying client, e.g. to share the provider connection
    /// with a freshly constructed session or agent.
    pub fn client(&self) -> &Arc<T> {
        &self.client
    }

    /// The session's configured token budget.
    pub fn get_max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// The current system prompt text.
    pub fn system_prompt_text(&self) -> &str {
        &self.system_prompt.content
    }

    /// A read-only view of the conversation history (system prompt excluded).
    pub fn get_conversation_history(&self) -> &[Message] {
        &self.conversation_history
    }

    /// Append a message to the history without round-tripping to the LLM.
    /// Used to seed a session with prior turns (e.g. a tool result, or a
    /// message authored by another agent) before the next `send_message`.
    pub fn inject_message(&mut self, role: Role, content: String) {
        let message = Message {
            role,
            content: Arc::from(content.as_str()),
            tool_calls: Vec::new(),
        };
        self.token_count += count_message_tokens(&message);
        self.conversation_history.push(message);
        self.trim_conversation_history();
    }

    /// Sends a message to the LLM and updates the conversation history.
    ///
    /// Maintains the conversation history within the specified token limit,
    /// prepending the system prompt for the duration of the request. `tools`
    /// carries native [`ToolDefinition`]s forwarded to the provider's
    /// function-calling API; pass `None` for a plain chat turn.
    pub async fn send_message(
        &mut self,
        role: Role,
        content: String,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let message = Message {
            role,
            content: Arc::from(content.as_str()),
            tool_calls: Vec::new(),
        };
        self.token_count += count_message_tokens(&message);
        self.conversation_history.push(message);
        self.trim_conversation_history();

        let mut outgoing = Vec::with_capacity(self.conversation_history.len() + 1);
        outgoing.push(self.system_prompt.clone());
        outgoing.extend(self.conversation_history.iter().cloned());

        let response = self.client.send_message(&outgoing, tools).await?;

        self.token_count += count_message_tokens(&response);
        self.conversation_history.push(response.clone());
        self.trim_conversation_history();

        Ok(response)
    }

    /// Sets a new system prompt for the session.
    pub fn set_system_prompt(&mut self, prompt: String) {
        let old_prompt_tokens = count_message_tokens(&self.system_prompt);
        self.system_prompt = Message {
            role: Role::System,
            content: Arc::from(prompt.as_str()),
            tool_calls: Vec::new(),
        };
        let new_prompt_tokens = count_message_tokens(&self.system_prompt);
        self.token_count = self.token_count - old_prompt_tokens + new_prompt_tokens;
    }

    /// Trims the conversation history to ensure the total token count does not exceed max_tokens.
    fn trim_conversation_history(&mut self) {
        while self.token_count > self.max_tokens {
            if !self.conversation_history.is_empty() {
                let removed_message = self.conversation_history.remove(0);
                let removed_tokens = count_message_tokens(&removed_message);
                self.token_count = self.token_count.saturating_sub(removed_tokens);
            } else {
                break;
            }
        }
    }
}

/// Estimates the number of tokens in a string (roughly one token per 4 characters).
fn count_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Estimates the number of tokens in a Message, including a small fixed overhead for the role.
fn count_message_tokens(message: &Message) -> usize {
    let role_token_count = 1;
    role_token_count + count_tokens(&message.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::error::Error;
    use tokio::sync::Mutex;

    struct EchoClient;

    #[async_trait]
    impl ClientWrapper for EchoClient {
        async fn send_message(
            &self,
            messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error>> {
            let last = messages.last().map(|m| m.content.to_string()).unwrap_or_default();
            Ok(Message {
                role: Role::Assistant,
                content: Arc::from(format!("echo: {last}").as_str()),
                tool_calls: Vec::new(),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<crate::ori::client_wrapper::TokenUsage>>> {
            None
        }
    }

    #[tokio::test]
    async fn round_trip_appends_user_and_assistant_messages() {
        let mut session = LLMSession::new(EchoClient, "system".to_string(), 10_000);
        let reply = session
            .send_message(Role::User, "hi".to_string(), None)
            .await
            .unwrap();
        assert_eq!(&*reply.content, "echo: hi");
        assert_eq!(session.get_conversation_history().len(), 2);
    }

    #[tokio::test]
    async fn trims_oldest_messages_once_budget_exceeded() {
        let mut session = LLMSession::new(EchoClient, "system".to_string(), 20);
        for i in 0..10 {
            session
                .send_message(Role::User, format!("message number {i}"), None)
                .await
                .ok();
        }
        // trimming keeps the history from growing without bound
        assert!(session.get_conversation_history().len() < 20);
    }
}
