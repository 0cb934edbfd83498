use crate::backend::ContainerRuntime;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("statement failed: {message}")]
pub struct SqlError {
    pub statement: String,
    pub message: String,
}

/// Executes one SQL statement and returns the engine's text output.
pub trait SqlEndpoint {
    fn execute(
        &self,
        container: &str,
        database: &str,
        user: &str,
        statement: &str,
    ) -> Result<String, SqlError>;
}

/// Runs statements through `psql` inside the container, stopping on the
/// first error so a failing statement always yields a non-zero exit.
pub struct PsqlEndpoint<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> PsqlEndpoint<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }
}

pub fn psql_command(database: &str, user: &str, statement: &str) -> Vec<String> {
    [
        "psql",
        "-v",
        "ON_ERROR_STOP=1",
        "-U",
        user,
        "-d",
        database,
        "-c",
        statement,
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

impl SqlEndpoint for PsqlEndpoint<'_> {
    fn execute(
        &self,
        container: &str,
        database: &str,
        user: &str,
        statement: &str,
    ) -> Result<String, SqlError> {
        self.runtime
            .exec(container, &psql_command(database, user, statement))
            .map_err(|e| SqlError {
                statement: statement.to_owned(),
                message: e.to_string(),
            })
    }
}
