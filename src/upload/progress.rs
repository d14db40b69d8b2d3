use indicatif::{ProgressBar, ProgressStyle};

use crate::upload::config::UploadOptions;

/// Receives the cumulative number of bytes committed during a transfer.
///
/// Offsets never decrease; the last report of a successful upload equals
/// the file size.
pub trait Progress: Send {
    fn report(&mut self, offset: u64);
}

/// Progress display selected from the command-line options.
pub enum ProgressSink {
    /// Prints only `Finished` once the whole file is committed, unless quiet.
    NoProgress {
        file_size: u64,
        quiet: bool,
        finished: bool,
    },
    /// Raw byte counts, without unit scaling.
    ByteCount(ProgressBar),
    /// Percentage of the file.
    Percent(ProgressBar),
}

impl ProgressSink {
    pub fn for_options(options: &UploadOptions, file_size: u64) -> Self {
        if options.no_progress || options.quiet {
            Self::silent(file_size, options.quiet)
        } else if options.report_bytes {
            Self::byte_count(ProgressBar::new(file_size))
        } else {
            Self::percent(ProgressBar::new(file_size))
        }
    }

    pub fn silent(file_size: u64, quiet: bool) -> Self {
        Self::NoProgress {
            file_size,
            quiet,
            finished: false,
        }
    }

    pub fn byte_count(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self::ByteCount(bar)
    }

    pub fn percent(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self::Percent(bar)
    }
}

impl Progress for ProgressSink {
    fn report(&mut self, offset: u64) {
        match self {
            ProgressSink::NoProgress {
                file_size,
                quiet,
                finished,
            } => {
                if offset >= *file_size && !*quiet && !*finished {
                    *finished = true;
                    println!("Finished");
                }
            }
            ProgressSink::ByteCount(bar) | ProgressSink::Percent(bar) => {
                bar.set_position(offset);
                if bar.length().is_some_and(|len| offset >= len) {
                    bar.finish();
                }
            }
        }
    }
}
