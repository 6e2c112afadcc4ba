//! Sources command - list the effective source list.

use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

/// Run the sources command.
pub fn run(options: RunnerOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    let sources = &runner.config().sources;

    println!("{} sources, tried in order:", sources.len());
    for (index, template) in sources.templates().iter().enumerate() {
        println!("  {:>2}. {}", index + 1, template);
    }
    Ok(())
}
