use clap::{Arg, ArgAction, Command};
use cognate::chain::BackendChain;
use cognate::config::{FileConfig, Policy};
use cognate::context::ContextBundle;
use cognate::error::CognateError;
use cognate::exec::CommandExecutor;
use cognate::generator::CommandGenerator;
use cognate::orchestrator::{Orchestrator, Outcome};
use cognate::safety::SafetyGate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = Command::new("fiat")
        .about("Turn a natural-language instruction into a shell command")
        .long_about(
            "fiat sends your instruction, together with a snapshot of the machine \
             context, to an AI backend and returns candidate shell commands. \
             Dangerous commands are detected and never executed without explicit \
             confirmation.",
        )
        .arg(
            Arg::new("instruction")
                .help("What you want done, in plain language")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .short('m')
                .help("Model to use, optionally backend-qualified (e.g. openrouter/openai/gpt-4o)")
                .value_name("MODEL")
                .num_args(1),
        )
        .arg(
            Arg::new("options")
                .long("options")
                .short('n')
                .help("Number of command candidates to generate (1-10)")
                .value_name("N")
                .value_parser(clap::value_parser!(u8))
                .default_value("1"),
        )
        .arg(
            Arg::new("interactive")
                .long("interactive")
                .short('i')
                .help("Cycle through candidates interactively before deciding")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .short('f')
                .help("Skip all confirmation prompts (dangerous commands are still only printed)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print every candidate without executing anything")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase log verbosity (-v debug, -vv trace)")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    let instruction = matches
        .get_many::<String>("instruction")
        .unwrap_or_default()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    let config = match FileConfig::load() {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };
    let policy = Policy::resolve(
        &config,
        matches.get_one::<String>("model").cloned(),
        *matches.get_one::<u8>("options").unwrap_or(&1),
        matches.get_flag("force"),
        matches.get_flag("interactive"),
        matches.get_flag("dry-run"),
    );
    debug!(?policy, "resolved policy");

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.store(true, Ordering::SeqCst);
            }
        });
    }

    let orchestrator = Orchestrator::new(
        CommandGenerator::new(BackendChain::new(config)),
        SafetyGate::new(&policy),
    );
    let context = ContextBundle::new();

    let outcome = match orchestrator
        .run(&instruction, &context, &policy, &interrupt)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => exit_with(e),
    };

    match outcome {
        Outcome::Run(command) => match CommandExecutor::new().execute(&command) {
            Ok(code) => std::process::exit(code),
            Err(e) => exit_with(e),
        },
        Outcome::Emit(command) => println!("{command}"),
        Outcome::Preview(candidates) => {
            for candidate in candidates {
                println!("{candidate}");
            }
        }
        Outcome::Aborted => {
            eprintln!("Aborted.");
            std::process::exit(CognateError::UserAbort.exit_code());
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cognate={default_level},fiat={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_with(error: CognateError) -> ! {
    eprintln!("Error: {error}");
    std::process::exit(error.exit_code());
}
