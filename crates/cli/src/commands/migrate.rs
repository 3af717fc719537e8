use crate::commands::{prepare_database, CommandResult};

pub fn run() -> CommandResult {
    let (runtime, pool) = match prepare_database("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(pool.close());
    CommandResult::success("migrate", "applied pending migrations")
}
