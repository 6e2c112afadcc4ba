//! One-shot queries that print the backend reply.

use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

use super::print_reply;

/// Which backend call to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Has,
    Remove,
    AddDlc,
}

impl Query {
    fn name(self) -> &'static str {
        match self {
            Query::Has => "has",
            Query::Remove => "remove",
            Query::AddDlc => "add-dlc",
        }
    }
}

/// Run a query command.
pub fn run(options: RunnerOptions, query: Query, app_id: &str) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup(query.name());
    let api = runner.create_api()?;

    let reply = match query {
        Query::Has => api.has_primary_file(app_id),
        Query::Remove => api.remove_primary_file(app_id),
        Query::AddDlc => api.add_discovered_entries(app_id),
    };
    api.shutdown();
    print_reply(&reply)
}
