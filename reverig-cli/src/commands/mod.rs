//! CLI command implementations.

pub mod fetch;
pub mod query;
pub mod sources;
pub mod sweep;

use serde_json::Value;

use crate::error::CliError;

/// Print a reply and turn `success: false` into an error.
pub fn print_reply(reply: &Value) -> Result<(), CliError> {
    println!(
        "{}",
        serde_json::to_string_pretty(reply).unwrap_or_else(|_| reply.to_string())
    );
    reply_result(reply)
}

/// `Ok` if the reply carries `success: true`.
pub fn reply_result(reply: &Value) -> Result<(), CliError> {
    if reply["success"].as_bool().unwrap_or(false) {
        Ok(())
    } else {
        let error = reply["error"].as_str().unwrap_or("request failed");
        Err(CliError::Rejected(error.to_string()))
    }
}
