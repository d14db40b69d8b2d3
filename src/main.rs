use std::path::{Path, PathBuf};

use clap::Parser;
use clap::error::ErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use dox::upload::cli::Cli;
use dox::upload::client::DropboxClient;
use dox::upload::config::normalize_folder;
use dox::upload::console::Console;
use dox::upload::error::{ExitCode, UploadError};
use dox::upload::uploader::{Uploader, display_folder};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::BadArguments.into();
        }
    };

    init_tracing();

    run(cli).await.into()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> ExitCode {
    let mut options = cli.upload_options();
    let console = Console::new(options.quiet);

    let source = match std::path::absolute(&cli.local_path) {
        Ok(path) if path.exists() => path,
        _ => {
            println!("Source does not exist.");
            return ExitCode::FileNotFound;
        }
    };

    options.dropbox_path = normalize_folder(&options.dropbox_path);

    let client = match DropboxClient::new(&cli.token, options.timeout()) {
        Ok(client) => client,
        Err(e) => {
            println!("An error occurred and your file was not uploaded.");
            println!("{e:#}");
            return ExitCode::UnknownError;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, cancelling after the current request");
                cancel.cancel();
            }
        }
    });

    let mut uploader = Uploader::new(&client, cancel, console);

    let files = if source.is_dir() {
        console.line(format!(
            "Uploading folder \"{}\" to {}",
            source.display(),
            display_folder(&options.dropbox_path)
        ));
        console.line("Ctrl-C to cancel");
        uploader.hide_cancel_hint();
        match list_files(&source) {
            Ok(files) => files,
            Err(e) => return report_failure(&UploadError::Io(e), &console),
        }
    } else {
        vec![source]
    };

    match uploader.upload_files(&files, &options).await {
        Ok(_) => ExitCode::Success,
        Err(e) => report_failure(&e, &console),
    }
}

/// Regular files directly inside `dir`, in name order.
fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Prints the single terminal message for a failed run and returns its exit code.
///
/// Cancellation is not a failure and, like other status lines, is silenced by
/// `--quiet`.
fn report_failure(err: &UploadError, console: &Console) -> ExitCode {
    let message = failure_message(err);
    if err.is_cancelled() {
        console.line(message);
    } else {
        debug!(error = ?err, "upload failed");
        println!("{message}");
    }
    err.exit_code()
}

fn failure_message(err: &UploadError) -> String {
    match err {
        UploadError::Cancelled => "\nUpload canceled".to_string(),
        UploadError::Timeout(detail) => {
            format!("An HTTP operation timed out and your file was not uploaded.\n{detail}")
        }
        other => format!("An error occurred and your file was not uploaded.\n{other}"),
    }
}
