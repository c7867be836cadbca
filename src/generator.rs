//! Turns a natural-language instruction into candidate shell commands.
//!
//! The generator assembles the prompt (machine context plus instruction),
//! sends it through the backend chain, and hands the raw reply to the
//! extractor. A single-option invocation asks for a bare command; a
//! multi-option invocation asks for a JSON object with a `commands` array.

use crate::backend::{ChatMessage, ChatRequest, ChatResponse};
use crate::chain::BackendChain;
use crate::config::Policy;
use crate::context::ContextBundle;
use crate::error::CognateError;
use crate::extractor;
use tracing::debug;

const SINGLE_SYSTEM_PROMPT: &str = "You are a helpful assistant that converts natural language \
instructions into executable shell commands. Respond with ONLY the command, no explanations or \
markdown.";

/// An ordered, non-empty set of candidate commands. The first entry is the
/// primary candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    candidates: Vec<String>,
}

impl CommandSet {
    /// Candidates must be non-empty; the extractor guarantees this for
    /// backend replies.
    pub fn new(candidates: Vec<String>) -> Result<Self, CognateError> {
        if candidates.is_empty() {
            return Err(CognateError::EmptyResponse);
        }
        Ok(Self { candidates })
    }

    pub fn primary(&self) -> &str {
        &self.candidates[0]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.candidates.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.candidates
    }
}

/// Generates command candidates through a backend chain.
pub struct CommandGenerator {
    chain: BackendChain,
}

impl CommandGenerator {
    pub fn new(chain: BackendChain) -> Self {
        Self { chain }
    }

    /// Generate candidates for `instruction` under `policy`.
    ///
    /// Rejects instructions that are empty after trimming before any
    /// backend traffic happens.
    pub async fn generate(
        &self,
        instruction: &str,
        context: &ContextBundle,
        policy: &Policy,
    ) -> Result<CommandSet, CognateError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(CognateError::EmptyInstruction);
        }

        let multi = policy.num_options > 1;
        let prompt = build_prompt(context, instruction);
        let request = if multi {
            build_multi_chat_request(prompt, policy.num_options, policy.model.clone())
        } else {
            build_chat_request(prompt, policy.model.clone())
        };

        if let Ok(dump) = serde_json::to_string_pretty(&request) {
            debug!(request = %dump, "chat request");
        }

        let response: ChatResponse = self.chain.complete(request).await?;
        debug!(content = %response.content, "chat response");

        let candidates = extractor::extract(&response.content, multi)?;
        CommandSet::new(candidates)
    }
}

// ============================================================================
// Prompt construction
// ============================================================================

/// Context block followed by the instruction. Pure string assembly.
pub fn build_prompt(context: &ContextBundle, instruction: &str) -> String {
    let mut prompt = context.render();
    prompt.push_str("\nUser Instruction: ");
    prompt.push_str(instruction);
    prompt.push('\n');
    prompt
}

fn build_chat_request(prompt: String, model: Option<String>) -> ChatRequest {
    let messages = vec![
        ChatMessage::system(SINGLE_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ];
    let mut request = ChatRequest::new(messages);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    request
}

fn build_multi_chat_request(prompt: String, num_options: u8, model: Option<String>) -> ChatRequest {
    let system_prompt = format!(
        r#"You are a helpful assistant that converts natural language instructions into executable shell commands.

Generate exactly {n} different command options that accomplish the user's goal.
Each command should be a valid, executable shell command.
Provide alternatives that vary in approach, verbosity, or options used.

IMPORTANT: Respond ONLY with a valid JSON object in this exact format:
{{"commands": ["command1", "command2", "command3"]}}

Rules:
- Return exactly {n} commands in the "commands" array
- Each command must be a single string (escape quotes properly)
- No explanations, comments, or markdown - just the JSON object
- Commands should be practical alternatives, not duplicates
- Order from simplest/most common to more advanced/specific"#,
        n = num_options
    );

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(prompt),
    ];
    let mut request = ChatRequest::new(messages);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MockBackend, Role};
    use crate::chain::BackendChain;

    fn mock_generator() -> CommandGenerator {
        let chain =
            BackendChain::with_backends(vec![("mock".to_string(), Backend::Mock(MockBackend::new()))]);
        CommandGenerator::new(chain)
    }

    #[test]
    fn test_command_set_rejects_empty() {
        assert!(matches!(
            CommandSet::new(Vec::new()),
            Err(CognateError::EmptyResponse)
        ));
    }

    #[test]
    fn test_command_set_primary_is_first() {
        let set = CommandSet::new(vec!["ls".to_string(), "ls -la".to_string()]).unwrap();
        assert_eq!(set.primary(), "ls");
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert_eq!(set.get(1), Some("ls -la"));
        assert_eq!(set.get(2), None);
    }

    #[test]
    fn test_build_prompt_contains_context_and_instruction() {
        let context = ContextBundle::with_stdin(None);
        let prompt = build_prompt(&context, "list files");
        assert!(prompt.contains("System Context:"));
        assert!(prompt.contains("User Instruction: list files"));
    }

    #[test]
    fn test_single_request_shape() {
        let request = build_chat_request("prompt body".to_string(), Some("test/model".to_string()));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "prompt body");
        assert_eq!(request.model.as_deref(), Some("test/model"));
    }

    #[test]
    fn test_multi_request_names_count_and_format() {
        let request = build_multi_chat_request("prompt body".to_string(), 5, None);
        let system = &request.messages[0].content;
        assert!(system.contains("exactly 5 different command options"));
        assert!(system.contains(r#"{"commands":"#));
        assert!(request.model.is_none());
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_instruction() {
        let generator = mock_generator();
        let context = ContextBundle::with_stdin(None);
        let policy = Policy::default();

        let err = generator.generate("   ", &context, &policy).await.unwrap_err();
        assert!(matches!(err, CognateError::EmptyInstruction));
    }

    #[tokio::test]
    async fn test_generate_single_option() {
        let generator = mock_generator();
        let context = ContextBundle::with_stdin(None);
        let policy = Policy {
            num_options: 1,
            ..Policy::default()
        };

        let set = generator
            .generate("list all files", &context, &policy)
            .await
            .unwrap();
        assert_eq!(set.len(), 1);
        assert!(!set.primary().is_empty());
    }

    #[tokio::test]
    async fn test_generate_multi_option() {
        let generator = mock_generator();
        let context = ContextBundle::with_stdin(None);
        let policy = Policy {
            num_options: 3,
            ..Policy::default()
        };

        let set = generator
            .generate("list all files", &context, &policy)
            .await
            .unwrap();
        assert!(set.len() > 1);
        for candidate in set.iter() {
            assert!(!candidate.trim().is_empty());
        }
    }
}
