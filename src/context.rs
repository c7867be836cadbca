//! Machine context gathered once per invocation.
//!
//! The prompt sent to a backend includes a snapshot of the environment:
//! system facts, the working directory and its first entries, and the tail of
//! the shell history. Each piece is collected lazily through `OnceCell` so an
//! invocation that fails before prompt construction never touches the
//! filesystem, and collected at most once after that.
//!
//! Every collector degrades to empty data on failure. Missing history or an
//! unreadable directory must never abort command generation.

use once_cell::unsync::OnceCell;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, IsTerminal, Read, Seek, SeekFrom};
use std::path::PathBuf;

const MAX_DIR_ENTRIES: usize = 10;
const MAX_HISTORY_LINES: usize = 3;
const MAX_PATH_CHARS: usize = 80;
const MAX_STDIN_BYTES: usize = 10 * 1024;
const HISTORY_TAIL_BYTES: u64 = 4096;

/// Static facts about the host, taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFacts {
    pub os: String,
    pub arch: String,
    pub shell: String,
    pub user: String,
}

impl SystemFacts {
    fn collect() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            shell: detect_shell(),
            user: env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

/// Shell name from `$SHELL`, basename only.
pub fn detect_shell() -> String {
    env::var("SHELL")
        .unwrap_or_else(|_| "unknown".to_string())
        .split('/')
        .next_back()
        .unwrap_or("unknown")
        .to_string()
}

/// Lazily gathered environment snapshot for one invocation.
pub struct ContextBundle {
    system: OnceCell<SystemFacts>,
    cwd: OnceCell<String>,
    files: OnceCell<Vec<String>>,
    history: OnceCell<Vec<String>>,
    stdin: Option<String>,
}

impl ContextBundle {
    /// Build a bundle without touching the environment yet. Piped stdin is
    /// the exception: it must be drained up front, before any interactive
    /// prompt could contend for it.
    pub fn new() -> Self {
        Self {
            system: OnceCell::new(),
            cwd: OnceCell::new(),
            files: OnceCell::new(),
            history: OnceCell::new(),
            stdin: read_piped_stdin(MAX_STDIN_BYTES),
        }
    }

    #[cfg(test)]
    pub fn with_stdin(stdin: Option<String>) -> Self {
        Self {
            system: OnceCell::new(),
            cwd: OnceCell::new(),
            files: OnceCell::new(),
            history: OnceCell::new(),
            stdin,
        }
    }

    pub fn system(&self) -> &SystemFacts {
        self.system.get_or_init(SystemFacts::collect)
    }

    pub fn cwd(&self) -> &str {
        self.cwd.get_or_init(|| {
            env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
    }

    pub fn files(&self) -> &[String] {
        self.files.get_or_init(|| scan_directory(MAX_DIR_ENTRIES))
    }

    pub fn history(&self) -> &[String] {
        self.history
            .get_or_init(|| shell_history_tail(MAX_HISTORY_LINES))
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Render the snapshot as the context block of a prompt. Empty sections
    /// are omitted.
    pub fn render(&self) -> String {
        let system = self.system();
        let mut out = String::new();

        out.push_str("System Context:\n");
        out.push_str(&format!("- OS: {} ({})\n", system.os, system.arch));
        out.push_str(&format!("- Shell: {}\n", system.shell));
        out.push_str(&format!("- User: {}\n", system.user));
        out.push_str(&format!("- Working directory: {}\n", self.cwd()));

        let files = self.files();
        if !files.is_empty() {
            out.push_str("\nDirectory Context:\n");
            for file in files {
                out.push_str(&format!("- {}\n", file));
            }
        }

        let history = self.history();
        if !history.is_empty() {
            out.push_str("\nRecent Shell History:\n");
            for entry in history {
                out.push_str(&format!("- {}\n", entry));
            }
        }

        if let Some(stdin) = self.stdin() {
            if !stdin.trim().is_empty() {
                out.push_str("\nPiped Input:\n");
                out.push_str(stdin);
                if !stdin.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        out
    }
}

impl Default for ContextBundle {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Collectors
// ============================================================================

/// First entries of the working directory, sorted by name. Long paths shrink
/// to their basename so the prompt stays compact.
fn scan_directory(max_entries: usize) -> Vec<String> {
    let cwd = match env::current_dir() {
        Ok(path) => path,
        Err(_) => return Vec::new(),
    };
    let entries = match std::fs::read_dir(&cwd) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    names
        .into_iter()
        .take(max_entries)
        .map(|name| truncate_path(&name, MAX_PATH_CHARS))
        .collect()
}

fn truncate_path(path: &str, max_chars: usize) -> String {
    if path.chars().count() <= max_chars {
        return path.to_string();
    }
    PathBuf::from(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.to_string())
}

fn history_path(shell: &str) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    match shell {
        "bash" => Some(home.join(".bash_history")),
        "zsh" => Some(home.join(".zsh_history")),
        "fish" => Some(home.join(".local/share/fish/fish_history")),
        _ => None,
    }
}

/// Last `max_lines` of the shell history file. Seeks near the end first so
/// multi-megabyte history files are never read whole.
fn read_history_tail(path: &PathBuf, max_lines: usize) -> Vec<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };
    let mut reader = BufReader::new(file);

    let file_size = match reader.seek(SeekFrom::End(0)) {
        Ok(pos) => pos,
        Err(_) => return Vec::new(),
    };
    let seek_pos = file_size.saturating_sub(HISTORY_TAIL_BYTES);
    if reader.seek(SeekFrom::Start(seek_pos)).is_err() {
        return Vec::new();
    }

    let lines: Vec<String> = reader.lines().map_while(Result::ok).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].to_vec()
}

fn shell_history_tail(max_lines: usize) -> Vec<String> {
    match history_path(&detect_shell()) {
        Some(path) => read_history_tail(&path, max_lines),
        None => Vec::new(),
    }
}

/// Drain piped stdin up to `max_bytes`. Returns `None` when stdin is a live
/// terminal, so interactive sessions keep their input channel.
fn read_piped_stdin(max_bytes: usize) -> Option<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }

    let mut buffer = vec![0u8; max_bytes];
    let mut handle = stdin.lock();
    match handle.read(&mut buffer) {
        Ok(n) => {
            buffer.truncate(n);
            Some(String::from_utf8_lossy(&buffer).to_string())
        }
        Err(_) => None,
    }
}
