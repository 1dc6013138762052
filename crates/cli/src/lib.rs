pub mod client;
pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "minion",
    about = "Minion terminal client",
    long_about = "Chat with a running minion-server, inspect the agent roster, and review effective configuration.",
    after_help = "Examples:\n  minion chat\n  minion ask \"Tell me about Siamese cats\"\n  minion agents\n  minion config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session; type 'exit' to quit")]
    Chat {
        #[arg(long, help = "Server base URL (defaults to the configured bind address and port)")]
        server: Option<String>,
        #[arg(long, help = "Resume an existing session id")]
        session: Option<String>,
    },
    #[command(about = "Ask a single question and print the routed agent's reply")]
    Ask {
        question: String,
        #[arg(long, help = "Server base URL (defaults to the configured bind address and port)")]
        server: Option<String>,
        #[arg(long, help = "Session id to continue")]
        session: Option<String>,
    },
    #[command(about = "List configured agents, their labels, and the fallback")]
    Agents,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { server, session } => {
            commands::chat::run(server.as_deref(), session.as_deref())
        }
        Command::Ask { question, server, session } => {
            commands::ask::run(&question, server.as_deref(), session.as_deref())
        }
        Command::Agents => commands::agents::run(),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
