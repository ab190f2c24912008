mod cli;
mod conf;
mod logging;

use std::process::ExitCode;
use std::time::Instant;

use axiomkit_io_sync::reconcile;
use clap::Parser;
use tracing::{error, info};

use crate::cli::Cli;
use crate::conf::{SpecSyncConfig, resolve_log_file, resolve_run};

/// Every action succeeded.
const N_EXIT_OK: u8 = 0;
/// Configuration error or the run could not begin.
const N_EXIT_FAILED: u8 = 1;
/// The run completed but some entries failed.
const N_EXIT_PARTIAL: u8 = 2;

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(&args) {
        Ok(n_code) => ExitCode::from(n_code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(N_EXIT_FAILED)
        }
    }
}

fn run(args: &Cli) -> anyhow::Result<u8> {
    let spec_conf = SpecSyncConfig::load(args.config.as_deref())?;
    let path_log_file = resolve_log_file(args, &spec_conf);
    let _guard = logging::init_logger(&path_log_file)?;

    let spec_run = match resolve_run(args, spec_conf) {
        Ok(v) => v,
        Err(err) => {
            error!("{err:#}");
            return Ok(N_EXIT_FAILED);
        }
    };

    let time_start = Instant::now();
    let n_code = match reconcile(
        &spec_run.path_dir_src,
        &spec_run.path_dir_dst,
        spec_run.spec_sync_options,
    ) {
        Ok(report) => {
            info!("{report}");
            if report.has_failures() {
                N_EXIT_PARTIAL
            } else {
                N_EXIT_OK
            }
        }
        Err(err) => {
            error!("{err}");
            N_EXIT_FAILED
        }
    };

    println!(
        "Synchronization completed in {:?}. Check '{}' for details.",
        time_start.elapsed(),
        path_log_file.display()
    );
    Ok(n_code)
}
