use std::process::ExitCode;

fn main() -> ExitCode {
    storytime_cli::run()
}
