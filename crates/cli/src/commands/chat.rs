//! Interactive terminal session against a running minion-server.

use std::io::{BufRead, Write};

use crate::client::ClientSettings;
use crate::commands::CommandResult;

const EXIT_WORD: &str = "exit";

pub fn run(server: Option<&str>, session: Option<&str>) -> CommandResult {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    run_with_io(&ClientSettings::resolve(server), session, stdin.lock(), &mut stdout)
}

/// Reads one question per line until `exit` or end of input. The session id handed out by
/// the server on the first answer is reused for every later question.
pub fn run_with_io(
    settings: &ClientSettings,
    session: Option<&str>,
    input: impl BufRead,
    output: &mut impl Write,
) -> CommandResult {
    let client = match settings.client() {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure("chat", error.class(), error.to_string(), error.exit_code())
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to start async runtime: {error}"),
                5,
            )
        }
    };

    let mut session_id = session.map(str::to_string);
    let mut answered = 0usize;
    let _ = writeln!(output, "Connected to {}. Type '{EXIT_WORD}' to quit.", client.base_url());

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                return CommandResult::failure("chat", "io", error.to_string(), 5);
            }
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case(EXIT_WORD) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match runtime.block_on(client.ask(question, session_id.as_deref())) {
            Ok(reply) => {
                let _ = writeln!(output, "Agent ({}): {}", reply.agent, reply.response);
                session_id = Some(reply.session_id);
                answered += 1;
            }
            Err(error) => {
                let _ = writeln!(output, "Error: {error}");
                if error.class() == "transport" {
                    return CommandResult::failure(
                        "chat",
                        error.class(),
                        error.to_string(),
                        error.exit_code(),
                    );
                }
            }
        }
    }

    CommandResult::success(
        "chat",
        format!(
            "chat ended after {answered} answered question(s); session: {}",
            session_id.as_deref().unwrap_or("<none>")
        ),
    )
}
