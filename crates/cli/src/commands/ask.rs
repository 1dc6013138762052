use crate::client::ClientSettings;
use crate::commands::CommandResult;

pub fn run(question: &str, server: Option<&str>, session: Option<&str>) -> CommandResult {
    let question = question.trim();
    if question.is_empty() {
        return CommandResult::failure("ask", "invalid_input", "question must not be empty", 2);
    }

    let client = match ClientSettings::resolve(server).client() {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure("ask", error.class(), error.to_string(), error.exit_code())
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to start async runtime: {error}"),
                5,
            )
        }
    };

    match runtime.block_on(client.ask(question, session)) {
        Ok(reply) => CommandResult::success(
            "ask",
            format!("[{}] {} (session: {})", reply.agent, reply.response, reply.session_id),
        ),
        Err(error) => {
            CommandResult::failure("ask", error.class(), error.to_string(), error.exit_code())
        }
    }
}
