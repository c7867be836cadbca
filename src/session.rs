//! Interactive selection over generated command candidates.
//!
//! Selection is modeled as a small state machine (`SelectionSession`) that is
//! pure and fully testable, plus a thin crossterm runner that feeds it key
//! events. The session moves `Idle -> Active -> Completed` and a completed
//! session never transitions again. The auto-abort timer is armed once when
//! the session starts; user activity does not reset it.
//!
//! When the destination is not a live terminal there is nothing to select
//! with, so the session completes immediately with the primary candidate.

use crate::error::CognateError;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{BufRead, IsTerminal, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// What the operator chose to do with the selected candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Execute,
    Abort,
}

/// Final verdict of a selection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub action: Action,
    pub chosen_index: usize,
}

/// Session lifecycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active { index: usize, action: Action },
    Completed(SelectionOutcome),
}

/// Inputs the session reacts to. `TimerFired` is the auto-abort deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    CycleNext,
    CyclePrev,
    ToggleAction,
    Confirm,
    Cancel,
    TimerFired,
}

/// Pure selection state machine over `len` candidates.
#[derive(Debug)]
pub struct SelectionSession {
    len: usize,
    state: SessionState,
}

impl SelectionSession {
    /// A session over `len` candidates, not yet started. `len` must be at
    /// least 1; sessions are only created for non-empty command sets.
    pub fn new(len: usize) -> Self {
        debug_assert!(len >= 1);
        Self {
            len,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Arm the session: first candidate selected, pending action `Execute`.
    /// Starting an already started session is a no-op.
    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Active {
                index: 0,
                action: Action::Execute,
            };
        }
    }

    /// Apply one event and return the new state. Events reaching a terminal
    /// or idle session are ignored.
    pub fn apply(&mut self, event: SessionEvent) -> SessionState {
        if let SessionState::Active { index, action } = self.state {
            self.state = match event {
                SessionEvent::CycleNext => SessionState::Active {
                    index: (index + 1) % self.len,
                    action,
                },
                SessionEvent::CyclePrev => SessionState::Active {
                    index: (index + self.len - 1) % self.len,
                    action,
                },
                SessionEvent::ToggleAction => SessionState::Active {
                    index,
                    action: match action {
                        Action::Execute => Action::Abort,
                        Action::Abort => Action::Execute,
                    },
                },
                SessionEvent::Confirm => SessionState::Completed(SelectionOutcome {
                    action,
                    chosen_index: index,
                }),
                SessionEvent::Cancel | SessionEvent::TimerFired => {
                    SessionState::Completed(SelectionOutcome {
                        action: Action::Abort,
                        chosen_index: index,
                    })
                }
            };
        }
        self.state
    }
}

// ============================================================================
// Terminal runner
// ============================================================================

/// Whether both ends of the conversation are live terminals.
pub fn is_fully_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Restores cooked mode even when the runner errors or panics.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, CognateError> {
        terminal::enable_raw_mode()
            .map_err(|e| CognateError::Config(format!("failed to enter raw mode: {e}")))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Run an interactive selection session over `commands`.
///
/// Tab/arrow keys cycle, Space flips the pending action, Enter confirms,
/// Esc or Ctrl+C cancels. `dangerous` only changes how the confirm action is
/// labeled: "run" for a dangerous candidate, "output" otherwise. `timeout` is
/// measured from this call; when it elapses the session aborts regardless of
/// activity in between.
///
/// With a non-terminal stdout the primary candidate is chosen immediately.
pub fn select_interactive(
    commands: &[String],
    dangerous: bool,
    timeout: Option<Duration>,
) -> Result<SelectionOutcome, CognateError> {
    if !std::io::stdout().is_terminal() {
        debug!("stdout is not a terminal, selecting primary candidate");
        return Ok(SelectionOutcome {
            action: Action::Execute,
            chosen_index: 0,
        });
    }

    let mut session = SelectionSession::new(commands.len());
    session.start();

    let deadline = timeout.map(|t| Instant::now() + t);
    let _guard = RawModeGuard::enable()?;
    let mut stderr = std::io::stderr();

    loop {
        let SessionState::Active { index, action } = session.state() else {
            break;
        };
        render_selection(&mut stderr, commands, index, action, dangerous)
            .map_err(|e| CognateError::Config(format!("terminal write failed: {e}")))?;

        let event = next_event(deadline)
            .map_err(|e| CognateError::Config(format!("terminal read failed: {e}")))?;
        session.apply(event);
    }

    let _ = write!(stderr, "\r\n");
    match session.state() {
        SessionState::Completed(outcome) => Ok(outcome),
        _ => unreachable!("loop exits only on completion"),
    }
}

/// Block until a key maps to a session event or the deadline passes.
fn next_event(deadline: Option<Instant>) -> std::io::Result<SessionEvent> {
    loop {
        let wait = match deadline {
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    return Ok(SessionEvent::TimerFired);
                }
                d - now
            }
            None => Duration::from_secs(1),
        };

        if !event::poll(wait)? {
            continue;
        }
        if let Some(mapped) = map_event(&event::read()?) {
            return Ok(mapped);
        }
    }
}

/// Translate a terminal event into a session event. Only key presses count;
/// terminals that report releases and repeats would otherwise fire twice per
/// keystroke.
fn map_event(event: &Event) -> Option<SessionEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => map_key(*key),
        _ => None,
    }
}

fn map_key(key: KeyEvent) -> Option<SessionEvent> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(SessionEvent::Cancel);
    }
    match key.code {
        KeyCode::Tab | KeyCode::Down | KeyCode::Right => Some(SessionEvent::CycleNext),
        KeyCode::BackTab | KeyCode::Up | KeyCode::Left => Some(SessionEvent::CyclePrev),
        KeyCode::Char(' ') => Some(SessionEvent::ToggleAction),
        KeyCode::Enter => Some(SessionEvent::Confirm),
        KeyCode::Esc | KeyCode::Char('q') => Some(SessionEvent::Cancel),
        _ => None,
    }
}

fn render_selection<W: Write>(
    out: &mut W,
    commands: &[String],
    index: usize,
    action: Action,
    dangerous: bool,
) -> std::io::Result<()> {
    let label = match action {
        Action::Execute if dangerous => "run",
        Action::Execute => "output",
        Action::Abort => "cancel",
    };
    write!(
        out,
        "\r\x1b[2K[{}/{}] {}  ({}: Enter, Tab: next, Space: toggle, Esc: quit)",
        index + 1,
        commands.len(),
        commands[index],
        label,
    )?;
    out.flush()
}

// ============================================================================
// Dangerous-command confirmation
// ============================================================================

/// Operator's choice at the dangerous-command prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    /// Accept: proceed with the command.
    Accept,
    /// Output: print the command without running it.
    Output,
    /// Cancel: abort the invocation.
    Cancel,
}

/// Prompt for confirmation of a dangerous command and read one reply line.
///
/// The first non-whitespace character decides, case-insensitively: `a`
/// accepts, `o` outputs. Anything else, an empty line, and EOF all cancel.
/// Refusal is the only failure mode this prompt cannot produce: unreadable
/// input cancels too.
pub fn confirm_dangerous<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    command: &str,
    pattern: Option<&str>,
) -> std::io::Result<ConfirmChoice> {
    writeln!(output, "⚠️  This command looks dangerous:")?;
    writeln!(output, "    {}", command)?;
    if let Some(pattern) = pattern {
        writeln!(output, "    (matched pattern: {})", pattern)?;
    }
    write!(output, "[A]ccept / [O]utput only / [C]ancel? ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).is_err() {
        return Ok(ConfirmChoice::Cancel);
    }

    let choice = match line.trim().chars().next() {
        Some('a') | Some('A') => ConfirmChoice::Accept,
        Some('o') | Some('O') => ConfirmChoice::Output,
        _ => ConfirmChoice::Cancel,
    };
    Ok(choice)
}
