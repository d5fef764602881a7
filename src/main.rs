#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # bbfetch
//!
//! Download hand-ins, upload grades and show the gradebook of one course.
//!
//! Configuration comes from `BBFETCH_*` environment variables, optionally
//! through a `.env` file in the working directory. `BBFETCH_COURSE` and
//! `BBFETCH_USERNAME` are required.

use std::{io, process::ExitCode};

use anyhow::{Context, Result};
use bbfetch::{
    Customization, Grading, HttpRemote, RunOptions, RunOutcome, Settings, StateStore,
    grading::AttemptSpec,
};
use bpaf::*;
use dotenvy::dotenv;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Parsed command line.
#[derive(Debug, Clone)]
struct Cli {
    /// Only log warnings and errors.
    quiet:   bool,
    /// What to do.
    options: RunOptions,
}

/// Parse the command line arguments
fn options() -> Cli {
    let quiet = long("quiet").help("Only show warnings and errors").switch();
    let check = short('c')
        .long("check")
        .help("Show how students and attempts are grouped, ordered and stored")
        .switch();
    let download_attempt = short('D')
        .long("download-attempt")
        .help("Download one attempt: \"10/2/0\" for group 10, assignment 2, attempt index 0")
        .argument::<AttemptSpec>("ATTEMPT")
        .optional();
    let download = short('d')
        .long("download")
        .help("Download hand-ins that need grading; twice for all visible, thrice for everyone")
        .req_flag(())
        .count();
    let upload = short('u')
        .long("upload")
        .help("Upload hand-ins that have been graded")
        .switch();
    let upload_check = short('U')
        .long("upload-check")
        .help("Display what would be uploaded with -u")
        .switch();
    let no_refresh = short('n')
        .long("no-refresh")
        .help("Run in offline mode")
        .switch();
    let refresh_groups = short('g')
        .long("refresh-groups")
        .help("Refresh the list of student groups")
        .switch();

    let cli = construct!(
        quiet,
        check,
        download_attempt,
        download,
        upload,
        upload_check,
        no_refresh,
        refresh_groups
    )
    .map(
        |(quiet, check, download_attempt, download, upload, upload_check, no_refresh, refresh_groups)| {
            Cli {
                quiet,
                options: RunOptions::builder()
                    .refresh(!no_refresh)
                    .refresh_groups(refresh_groups)
                    .check(check)
                    .download_attempt(download_attempt)
                    .download(download)
                    .upload_check(upload_check)
                    .upload(upload)
                    .build(),
            }
        },
    );

    cli.to_options()
        .descr("Sync hand-ins and grades with the course platform")
        .run()
}

/// Builds the session from the environment.
fn session() -> Result<Grading<HttpRemote>> {
    let settings = Settings::from_env()?;
    let custom = Customization::from_settings(&settings)?;
    let store = StateStore::load(settings.state_path())?;
    let remote = HttpRemote::new(&settings, settings.load_token())
        .context("Could not set up the platform client")?;
    Ok(Grading::new(settings, store, remote, custom))
}

fn main() -> ExitCode {
    dotenv().ok();
    let cli = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(if cli.quiet { Level::WARN } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let mut grading = match session() {
        Ok(grading) => grading,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(2);
        }
    };

    match grading.execute(&cli.options, &mut io::stdout().lock()) {
        RunOutcome::Saved => ExitCode::SUCCESS,
        RunOutcome::ParseFailure(saved) => {
            eprintln!("Unexpected response saved to {}", saved.display());
            ExitCode::FAILURE
        }
        RunOutcome::BadCredentials | RunOutcome::Failed(_) => ExitCode::FAILURE,
    }
}
