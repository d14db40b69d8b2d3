use clap::Parser;

use crate::upload::config::{
    DEFAULT_CHUNK_SIZE_KB, DEFAULT_TIMEOUT_SECS, MIN_CHUNK_SIZE_KB, UploadOptions,
};

#[derive(Debug, Parser)]
#[command(name = "dox")]
#[command(about = "Upload files to Dropbox from the command line")]
#[command(version)]
#[command(after_help = r#"
EXAMPLES:
  Upload a file to the Dropbox root:
    dox report.pdf

  Upload a file into a folder:
    dox report.pdf /documents/2024

  Upload every file in a directory using 4 MB chunks:
    dox ./photos /photos --chunked --chunk-size 4096

Files of 150MB or more are always uploaded in chunks.
"#)]
pub struct Cli {
    /// Local file or directory to upload
    pub local_path: String,

    /// Destination folder in Dropbox (defaults to the root)
    pub dropbox_path: Option<String>,

    /// Use chunked uploading
    #[arg(short = 'c', long)]
    pub chunked: bool,

    /// Chunk size in kilobytes
    #[arg(
        short = 's',
        long = "chunk-size",
        default_value_t = DEFAULT_CHUNK_SIZE_KB,
        value_parser = chunk_size_in_range
    )]
    pub chunk_size_kb: usize,

    /// HTTP timeout in seconds
    #[arg(
        short = 't',
        long = "timeout",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Suppress all output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Don't display upload progress
    #[arg(short = 'n', long)]
    pub no_progress: bool,

    /// Display progress in bytes instead of percent
    #[arg(short = 'b', long)]
    pub bytes: bool,

    /// Dropbox access token
    #[arg(long, env = "DROPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl Cli {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            dropbox_path: self.dropbox_path.clone().unwrap_or_default(),
            chunked: self.chunked,
            chunk_size_kb: self.chunk_size_kb,
            timeout_secs: self.timeout_secs,
            quiet: self.quiet,
            no_progress: self.no_progress,
            report_bytes: self.bytes,
        }
    }
}

fn chunk_size_in_range(value: &str) -> Result<usize, String> {
    let kb: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number of kilobytes"))?;
    if kb < MIN_CHUNK_SIZE_KB {
        return Err(format!("chunk size must be at least {MIN_CHUNK_SIZE_KB} KB"));
    }
    Ok(kb)
}
