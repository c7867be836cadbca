//! Danger detection for generated commands.
//!
//! A [`PatternMatcher`] compiles the configured danger patterns (or the
//! built-in defaults) and records per-pattern validity instead of aborting on
//! the first bad entry. The matcher is fail-safe: if *any* pattern failed to
//! compile, every command is reported dangerous. A broken security
//! configuration must never silently grant more permission than intended.
//!
//! A [`SafetyGate`] combines the matcher's verdict with invocation policy to
//! decide whether the operator must confirm before anything happens.

use crate::config::Policy;
use crate::error::CognateError;
use regex::Regex;
use tracing::warn;

/// Built-in danger patterns: destructive filesystem operations, raw device
/// writes, filesystem formatting, privileged deletion, forced git history
/// rewrites, and the classic fork bomb.
fn default_danger_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/".to_string(),
        r"sudo\s+rm\s+-rf".to_string(),
        r"dd\s+if=.*\bof=/dev/".to_string(),
        r"mkfs\.\w+\s+/dev/".to_string(),
        r">\s*/dev/sd".to_string(),
        r"git\s+push\s+.*--force".to_string(),
        r"git\s+filter-branch".to_string(),
        r":\(\)\s*\{\s*:\|:&\s*\}\s*;\s*:".to_string(),
    ]
}

/// One textual pattern and its compilation result.
#[derive(Debug)]
pub struct DangerPattern {
    pub source: String,
    matcher: Option<Regex>,
}

impl DangerPattern {
    fn compile(source: String) -> Self {
        let matcher = match Regex::new(&source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %source, error = %e, "danger pattern failed to compile");
                None
            }
        };
        Self { source, matcher }
    }

    pub fn is_valid(&self) -> bool {
        self.matcher.is_some()
    }
}

/// Compiled set of danger patterns with the fail-safe rule applied.
#[derive(Debug)]
pub struct PatternMatcher {
    patterns: Vec<DangerPattern>,
    all_valid: bool,
}

impl PatternMatcher {
    /// Compile the given patterns; an empty list selects the built-in
    /// defaults.
    pub fn new(sources: Vec<String>) -> Self {
        let sources = if sources.is_empty() {
            default_danger_patterns()
        } else {
            sources
        };
        let patterns: Vec<DangerPattern> =
            sources.into_iter().map(DangerPattern::compile).collect();
        let all_valid = patterns.iter().all(DangerPattern::is_valid);
        Self {
            patterns,
            all_valid,
        }
    }

    /// Whether every configured pattern compiled.
    pub fn is_valid(&self) -> bool {
        self.all_valid
    }

    /// The broken security configuration, reportable but never fatal.
    pub fn config_error(&self) -> Option<CognateError> {
        if self.all_valid {
            return None;
        }
        let bad: Vec<&str> = self
            .patterns
            .iter()
            .filter(|p| !p.is_valid())
            .map(|p| p.source.as_str())
            .collect();
        Some(CognateError::InvalidSecurityConfig(bad.join(", ")))
    }

    /// Classify a command.
    ///
    /// An empty (trimmed) command is always safe. With any invalid pattern in
    /// the set, every non-empty command is dangerous regardless of content.
    pub fn is_dangerous(&self, command: &str) -> bool {
        if command.trim().is_empty() {
            return false;
        }
        if !self.all_valid {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| p.matcher.as_ref().is_some_and(|r| r.is_match(command)))
    }

    /// First pattern matching the command, for diagnostics. `None` when the
    /// set is invalid (the verdict then comes from the fail-safe rule, not a
    /// pattern).
    pub fn matching_pattern(&self, command: &str) -> Option<&str> {
        if !self.all_valid || command.trim().is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|p| p.matcher.as_ref().is_some_and(|r| r.is_match(command)))
            .map(|p| p.source.as_str())
    }
}

/// Dangerous/prompt-required classification for one candidate, computed once
/// per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub is_dangerous: bool,
    pub should_prompt: bool,
}

/// Combines pattern matching with invocation policy.
pub struct SafetyGate {
    matcher: PatternMatcher,
}

impl SafetyGate {
    pub fn new(policy: &Policy) -> Self {
        let matcher = PatternMatcher::new(policy.dangerous_patterns.clone());
        if let Some(err) = matcher.config_error() {
            warn!(error = %err, "treating every command as dangerous");
        }
        Self { matcher }
    }

    /// Decide whether the command is dangerous and whether confirmation is
    /// required.
    ///
    /// Prompting requires all of: a dangerous verdict, the confirm-dangerous
    /// policy flag, no force override, and a fully interactive session
    /// (`interactive_tty`: both the command source and destination are live
    /// terminals). When the verdict is dangerous but any condition fails, the
    /// caller must still surface a non-blocking warning.
    pub fn evaluate(&self, command: &str, policy: &Policy, interactive_tty: bool) -> SafetyVerdict {
        let is_dangerous = self.matcher.is_dangerous(command);
        let should_prompt =
            is_dangerous && policy.confirm_dangerous && !policy.force && interactive_tty;
        SafetyVerdict {
            is_dangerous,
            should_prompt,
        }
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }
}
