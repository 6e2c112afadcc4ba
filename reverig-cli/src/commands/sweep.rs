//! Sweep command - comment out directive lines in installed scripts.

use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

use super::print_reply;

/// Run the sweep command.
pub fn run(options: RunnerOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("sweep");
    let api = runner.create_api()?;

    let reply = api.sweep_installed();
    api.shutdown();
    print_reply(&reply)
}
