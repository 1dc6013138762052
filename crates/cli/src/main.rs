use std::process::ExitCode;

fn main() -> ExitCode {
    minion_cli::run()
}
