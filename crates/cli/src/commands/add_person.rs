use storytime_core::domain::person::PersonRole;
use storytime_db::{LibraryRepository, RepositoryError, SqlLibraryRepository};

use crate::commands::{prepare_database, CommandResult};

pub fn run(name: &str, role: &str) -> CommandResult {
    let role: PersonRole = match role.parse() {
        Ok(role) => role,
        Err(message) => return CommandResult::failure("add-person", "invalid_argument", message, 2),
    };

    let (runtime, pool) = match prepare_database("add-person") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let repo = SqlLibraryRepository::new(pool.clone());
    let result = runtime.block_on(repo.add_person(name, role));
    runtime.block_on(pool.close());

    match result {
        Ok(id) => CommandResult::success(
            "add-person",
            format!("registered {} as {} ({})", name.trim(), role.as_str(), id.0),
        ),
        Err(RepositoryError::Conflict(message)) => {
            CommandResult::failure("add-person", "conflict", message, 6)
        }
        Err(RepositoryError::Invalid(message)) => {
            CommandResult::failure("add-person", "invalid_argument", message, 2)
        }
        Err(error) => CommandResult::failure("add-person", "database", error.to_string(), 4),
    }
}
