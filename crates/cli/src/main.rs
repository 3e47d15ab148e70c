use std::process::ExitCode;

fn main() -> ExitCode {
    textback_cli::run()
}
