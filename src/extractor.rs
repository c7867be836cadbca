//! Extraction of command strings from raw AI response text.
//!
//! The upstream model is not contractually guaranteed to honor formatting
//! instructions, so extraction degrades through a chain of strategies instead
//! of failing on the first deviation: outer code fences are stripped, then
//! (when multiple commands were requested) progressively looser JSON parses
//! are attempted, and finally the whole cleaned text is taken as a single
//! command. The only failure is a response that reduces to nothing.

use crate::error::CognateError;
use serde::Deserialize;
use tracing::debug;

/// Expected multi-command payload: `{"commands": ["...", "..."]}`.
#[derive(Debug, Deserialize)]
struct CommandsPayload {
    commands: Vec<String>,
}

/// Convert raw response text into an ordered, non-empty list of command
/// strings.
///
/// `multi` indicates whether multiple commands were requested; when false the
/// JSON strategies are skipped entirely and the cleaned text is the command.
///
/// # Errors
///
/// [`CognateError::EmptyResponse`] when the text trims or strips down to
/// nothing. This is the only failure; any non-empty text yields at least one
/// candidate.
pub fn extract(response: &str, multi: bool) -> Result<Vec<String>, CognateError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(CognateError::EmptyResponse);
    }

    let cleaned = strip_outer_fence(trimmed);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(CognateError::EmptyResponse);
    }

    if multi {
        if let Some(commands) = parse_multi(cleaned) {
            return Ok(commands);
        }
        debug!("no multi-command parse succeeded, falling back to single command");
    }

    Ok(vec![cleaned.to_string()])
}

/// Strip a single outer fenced block (```lang ... ``` or single-line
/// ```cmd```). Text that does not begin with a fence is returned untouched;
/// inner fences are never touched.
fn strip_outer_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    match rest.find('\n') {
        // Opening delimiter line (with optional language tag), then the body,
        // then a closing delimiter line.
        Some(newline) => {
            let body = &rest[newline + 1..];
            if let Some(end) = body.rfind("\n```") {
                &body[..end]
            } else if let Some(inner) = body.strip_suffix("```") {
                inner
            } else {
                body
            }
        }
        // Single-line form: ```cmd```
        None => rest.strip_suffix("```").unwrap_or(rest),
    }
}

/// Try the multi-command strategies in order; a strategy only counts as a
/// success when it leaves at least one non-blank command after trimming.
fn parse_multi(cleaned: &str) -> Option<Vec<String>> {
    // Strategy a: a JSON object with a "commands" array.
    if let Ok(payload) = serde_json::from_str::<CommandsPayload>(cleaned) {
        if let Some(commands) = normalize(payload.commands) {
            return Some(commands);
        }
    }

    // Strategy b: a bare JSON array of strings.
    if let Ok(arr) = serde_json::from_str::<Vec<String>>(cleaned) {
        if let Some(commands) = normalize(arr) {
            return Some(commands);
        }
    }

    // Strategy c: a {..."commands"...} object embedded in surrounding prose.
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(payload) = serde_json::from_str::<CommandsPayload>(&cleaned[start..=end]) {
                if let Some(commands) = normalize(payload.commands) {
                    return Some(commands);
                }
            }
        }
    }

    // Strategy d: a [...] array embedded in surrounding prose.
    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) {
        if start < end {
            if let Ok(arr) = serde_json::from_str::<Vec<String>>(&cleaned[start..=end]) {
                if let Some(commands) = normalize(arr) {
                    return Some(commands);
                }
            }
        }
    }

    None
}

/// Trim entries and drop blanks; `None` when nothing survives.
fn normalize(commands: Vec<String>) -> Option<Vec<String>> {
    let commands: Vec<String> = commands
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if commands.is_empty() { None } else { Some(commands) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_with_bash_fence() {
        let commands = extract("```bash\nls -la\n```", false).unwrap();
        assert_eq!(commands, vec!["ls -la"]);
    }

    #[test]
    fn test_single_with_plain_fence() {
        let commands = extract("```\nfind . -name '*.rs'\n```", false).unwrap();
        assert_eq!(commands, vec!["find . -name '*.rs'"]);
    }

    #[test]
    fn test_single_line_fence() {
        let commands = extract("```ls -la```", false).unwrap();
        assert_eq!(commands, vec!["ls -la"]);
    }

    #[test]
    fn test_multiline_command_survives() {
        let commands = extract("```sh\nfor i in 1 2 3; do\n  echo $i\ndone\n```", false).unwrap();
        assert_eq!(commands, vec!["for i in 1 2 3; do\n  echo $i\ndone"]);
    }

    #[test]
    fn test_no_fence_passthrough() {
        let commands = extract("  ls -la  ", false).unwrap();
        assert_eq!(commands, vec!["ls -la"]);
    }

    #[test]
    fn test_empty_response_fails() {
        assert!(matches!(
            extract("", false),
            Err(CognateError::EmptyResponse)
        ));
        assert!(matches!(
            extract("   \n  ", true),
            Err(CognateError::EmptyResponse)
        ));
    }

    #[test]
    fn test_fence_around_nothing_fails() {
        assert!(matches!(
            extract("```bash\n\n```", false),
            Err(CognateError::EmptyResponse)
        ));
        assert!(matches!(
            extract("``````", false),
            Err(CognateError::EmptyResponse)
        ));
    }

    #[test]
    fn test_multi_commands_object() {
        let commands = extract(r#"{"commands": ["ls", "ls -la", "ls -lah"]}"#, true).unwrap();
        assert_eq!(commands, vec!["ls", "ls -la", "ls -lah"]);
    }

    #[test]
    fn test_multi_blanks_filtered() {
        let commands = extract(r#"{"commands":["a","","b"]}"#, true).unwrap();
        assert_eq!(commands, vec!["a", "b"]);
    }

    #[test]
    fn test_multi_entries_trimmed() {
        let commands = extract(r#"{"commands": ["  ls -la  ", " df -h "]}"#, true).unwrap();
        assert_eq!(commands, vec!["ls -la", "df -h"]);
    }

    #[test]
    fn test_multi_bare_array() {
        let commands = extract(r#"["ls -la", "ls -lah"]"#, true).unwrap();
        assert_eq!(commands, vec!["ls -la", "ls -lah"]);
    }

    #[test]
    fn test_multi_fenced_json() {
        let commands =
            extract("```json\n{\"commands\": [\"ls -la\", \"ls -lah\"]}\n```", true).unwrap();
        assert_eq!(commands, vec!["ls -la", "ls -lah"]);
    }

    #[test]
    fn test_multi_object_embedded_in_prose() {
        let response = r#"Here you go: {"commands": ["ls -la", "dir"]} Hope this helps!"#;
        let commands = extract(response, true).unwrap();
        assert_eq!(commands, vec!["ls -la", "dir"]);
    }

    #[test]
    fn test_multi_array_embedded_in_prose() {
        let response = r#"Options: ["du -sh *", "ncdu"] pick one"#;
        let commands = extract(response, true).unwrap();
        assert_eq!(commands, vec!["du -sh *", "ncdu"]);
    }

    #[test]
    fn test_multi_unstructured_falls_back_to_single() {
        let commands = extract("no structure at all", true).unwrap();
        assert_eq!(commands, vec!["no structure at all"]);
    }

    #[test]
    fn test_multi_all_blank_array_falls_back() {
        // A parse that only yields blanks is not a success; the raw text
        // becomes the single candidate.
        let commands = extract(r#"{"commands": ["", "  "]}"#, true).unwrap();
        assert_eq!(commands, vec![r#"{"commands": ["", "  "]}"#]);
    }

    #[test]
    fn test_single_request_ignores_json_shape() {
        let response = r#"{"commands": ["ls"]}"#;
        let commands = extract(response, false).unwrap();
        assert_eq!(commands, vec![response]);
    }
}
