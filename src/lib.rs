//! Cognate - natural-language shell command generation library.
//!
//! This library turns an instruction like "show the largest files here" into
//! one or more candidate shell commands, using an AI backend chain with
//! fallback, a fail-safe danger gate, and an interactive selection session.
//!
//! # Architecture
//!
//! The pipeline is organized into several modules:
//!
//! - [`config`] - File config (`~/.cognate/config.toml`) and resolved policy
//! - [`context`] - Machine context gathered lazily per invocation
//! - [`backend`] - Chat types and the concrete backends (OpenRouter, mock)
//! - [`chain`] - Ordered backend fallback with lazy construction
//! - [`generator`] - Prompt assembly and candidate generation
//! - [`extractor`] - Defensive parsing of backend replies
//! - [`safety`] - Danger patterns and the confirmation gate
//! - [`session`] - Interactive selection state machine and terminal runner
//! - [`orchestrator`] - Stage ordering, interrupts, and the final outcome
//! - [`exec`] - Handing an accepted command to the user's shell
//! - [`http_client`] - HTTP client abstraction
//! - [`error`] - Error taxonomy with process exit codes
//!
//! # Example
//!
//! ```ignore
//! use cognate::chain::BackendChain;
//! use cognate::config::{FileConfig, Policy};
//! use cognate::context::ContextBundle;
//! use cognate::generator::CommandGenerator;
//! use cognate::orchestrator::Orchestrator;
//! use cognate::safety::SafetyGate;
//! use std::sync::atomic::AtomicBool;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FileConfig::load()?;
//!     let policy = Policy::resolve(&config, None, 3, false, true, false);
//!     let orchestrator = Orchestrator::new(
//!         CommandGenerator::new(BackendChain::new(config)),
//!         SafetyGate::new(&policy),
//!     );
//!
//!     let context = ContextBundle::new();
//!     let interrupt = AtomicBool::new(false);
//!     let outcome = orchestrator
//!         .run("list all files", &context, &policy, &interrupt)
//!         .await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod extractor;
pub mod generator;
pub mod http_client;
pub mod orchestrator;
pub mod safety;
pub mod session;
