//! End-to-end pipeline: instruction in, decided outcome out.
//!
//! The orchestrator wires generation, safety gating, and selection together
//! and reduces every invocation to one [`Outcome`]. It owns the ordering
//! rules: the interrupt flag is checked between stages, dry-run short-circuits
//! before any terminal interaction, and the safety verdict is derived from the
//! primary candidate before any session runs. A dangerous primary is routed to
//! the one-line confirmation prompt; the cycling session is reached only for
//! a safe primary.

use crate::config::Policy;
use crate::context::ContextBundle;
use crate::error::CognateError;
use crate::generator::{CommandGenerator, CommandSet};
use crate::safety::SafetyGate;
use crate::session::{self, Action, ConfirmChoice, SelectionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// What the invocation resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Execute the command through the shell.
    Run(String),
    /// Print the command to stdout without executing.
    Emit(String),
    /// Dry run: print every candidate, execute nothing.
    Preview(Vec<String>),
    /// The user declined, cancelled, or timed out.
    Aborted,
}

pub struct Orchestrator {
    generator: CommandGenerator,
    gate: SafetyGate,
}

impl Orchestrator {
    pub fn new(generator: CommandGenerator, gate: SafetyGate) -> Self {
        Self { generator, gate }
    }

    /// Run the pipeline for one instruction.
    ///
    /// `interrupt` is observed between stages; once set, the invocation stops
    /// at the next boundary with [`CognateError::Interrupted`]. A stage
    /// already in flight is not torn down mid-way.
    pub async fn run(
        &self,
        instruction: &str,
        context: &ContextBundle,
        policy: &Policy,
        interrupt: &AtomicBool,
    ) -> Result<Outcome, CognateError> {
        let interactive_tty = session::is_fully_interactive();
        self.run_with_io(
            instruction,
            context,
            policy,
            interrupt,
            interactive_tty,
            |commands, dangerous, policy| {
                session::select_interactive(commands.as_slice(), dangerous, policy.selection_timeout)
            },
            |command, pattern| {
                let mut stdin = std::io::stdin().lock();
                let mut stderr = std::io::stderr();
                session::confirm_dangerous(&mut stdin, &mut stderr, command, pattern)
                    .unwrap_or(ConfirmChoice::Cancel)
            },
        )
        .await
    }

    /// Pipeline body with the terminal endpoints injected, so the stage
    /// ordering is testable without a live terminal.
    ///
    /// The safety verdict is computed over the primary candidate before any
    /// session: a dangerous primary goes to the confirmation prompt (or is
    /// downgraded to output when prompting is off), and only a safe primary
    /// reaches the cycling selection.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_with_io<S, C>(
        &self,
        instruction: &str,
        context: &ContextBundle,
        policy: &Policy,
        interrupt: &AtomicBool,
        interactive_tty: bool,
        selector: S,
        confirmer: C,
    ) -> Result<Outcome, CognateError>
    where
        S: FnOnce(&CommandSet, bool, &Policy) -> Result<SelectionOutcome, CognateError>,
        C: FnOnce(&str, Option<&str>) -> ConfirmChoice,
    {
        check_interrupt(interrupt)?;

        let commands = self.generator.generate(instruction, context, policy).await?;
        debug!(candidates = commands.len(), "generation finished");

        check_interrupt(interrupt)?;

        if policy.dry_run {
            return Ok(Outcome::Preview(
                commands.iter().map(str::to_string).collect(),
            ));
        }

        let primary = commands.primary();
        let verdict = self.gate.evaluate(primary, policy, interactive_tty);

        if verdict.should_prompt {
            let pattern = self.gate.matcher().matching_pattern(primary);
            // Neither choice executes a dangerous command; "accept" and
            // "output" both print it so the user runs it deliberately.
            return Ok(match confirmer(primary, pattern) {
                ConfirmChoice::Accept | ConfirmChoice::Output => {
                    Outcome::Emit(primary.to_string())
                }
                ConfirmChoice::Cancel => Outcome::Aborted,
            });
        }

        if verdict.is_dangerous {
            // Prompting is off (forced, piped, or disabled). The command is
            // still never executed without an explicit confirmation.
            match self.gate.matcher().matching_pattern(primary) {
                Some(pattern) => {
                    warn!(command = %primary, %pattern, "dangerous command, printing instead of executing")
                }
                None => {
                    warn!(command = %primary, "dangerous command (invalid safety patterns), printing instead of executing")
                }
            }
            return Ok(Outcome::Emit(primary.to_string()));
        }

        check_interrupt(interrupt)?;

        if policy.interactive && commands.len() > 1 && interactive_tty {
            let outcome = selector(&commands, verdict.is_dangerous, policy)?;
            if outcome.action == Action::Abort {
                return Ok(Outcome::Aborted);
            }
            let chosen = commands
                .get(outcome.chosen_index)
                .unwrap_or(primary)
                .to_string();
            return Ok(Outcome::Run(chosen));
        }

        Ok(Outcome::Emit(primary.to_string()))
    }
}

fn check_interrupt(interrupt: &AtomicBool) -> Result<(), CognateError> {
    if interrupt.load(Ordering::SeqCst) {
        return Err(CognateError::Interrupted);
    }
    Ok(())
}
