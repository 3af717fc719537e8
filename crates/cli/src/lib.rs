pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "storytime",
    about = "Storytime operator CLI",
    long_about = "Prepare the storytime database, register family members, and inspect configuration.",
    after_help = "Examples:\n  storytime migrate\n  storytime add-person --name Alice --role follows\n  storytime config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Register a family member who can be picked as a reader")]
    AddPerson {
        #[arg(long, help = "Display name, unique across the family")]
        name: String,
        #[arg(long, help = "leads (parent) or follows (child)")]
        role: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::AddPerson { name, role } => commands::add_person::run(&name, &role),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
