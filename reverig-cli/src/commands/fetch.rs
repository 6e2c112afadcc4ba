//! Fetch command - acquire and install one app's script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reverig::api::AppId;
use reverig::{AcquisitionState, AcquisitionStatus};

use super::{print_reply, reply_result};
use crate::error::CliError;
use crate::runner::{CliRunner, RunnerOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the fetch command.
pub fn run(options: RunnerOptions, app_id: &str, json: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("fetch");
    let id: AppId = app_id.parse()?;
    let api = runner.create_api()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    reply_result(&api.start_acquisition(app_id))?;

    let bar = if json {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };

    let mut cancel_sent = false;
    let state = loop {
        if interrupted.load(Ordering::SeqCst) && !cancel_sent {
            bar.println("Cancelling...");
            api.acquirer().cancel(id.0);
            cancel_sent = true;
        }

        let state = api.acquirer().status(id.0);
        update_bar(&bar, &state);
        if state.status.is_terminal() {
            break state;
        }
        thread::sleep(POLL_INTERVAL);
    };
    bar.finish_and_clear();
    api.shutdown();

    if json {
        print_reply(&api.get_acquisition_status(app_id))?;
    }

    match state.status {
        AcquisitionStatus::Done => {
            if !json {
                println!(
                    "Installed {} from {}",
                    state.installed_path.as_deref().unwrap_or("?"),
                    state.current_source
                );
            }
            Ok(())
        }
        AcquisitionStatus::Cancelled => Err(CliError::Cancelled),
        _ => Err(CliError::AcquisitionFailed(
            state.error.unwrap_or_else(|| state.status.to_string()),
        )),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg:<12} [{bar:30.cyan/blue}] {bytes}/{total_bytes}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn update_bar(bar: &ProgressBar, state: &AcquisitionState) {
    bar.set_message(state.status.to_string());
    if state.status == AcquisitionStatus::Downloading || state.bytes_read > 0 {
        bar.set_length(state.total_bytes.max(state.bytes_read));
        bar.set_position(state.bytes_read);
    }
}
