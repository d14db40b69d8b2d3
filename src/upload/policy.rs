use std::fmt;

use tracing::info;

/// Why [`decide`] overrode the requested mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// The file is too large for the single-shot endpoint.
    ForcedChunked,
    /// The file fits in one chunk.
    ForcedSingle,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::ForcedChunked => {
                write!(f, "File is larger than 150MB, using chunked uploading.")
            }
            Adjustment::ForcedSingle => write!(
                f,
                "File is smaller than the specified chunk size, disabling chunked uploading."
            ),
        }
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadMode {
    pub chunked: bool,
    pub chunk_size: usize,
    /// Rules that overrode the request, in the order they fired.
    pub adjustments: [Option<Adjustment>; 2],
}

impl UploadMode {
    pub fn adjustments(&self) -> impl Iterator<Item = Adjustment> + '_ {
        self.adjustments.iter().flatten().copied()
    }
}

/// Chooses between single-shot and chunked upload.
///
/// Files of `chunked_threshold` bytes or more are always chunked. A chunked
/// request for a file no larger than one chunk falls back to single-shot.
pub fn decide(
    file_length: u64,
    requested_chunked: bool,
    chunked_threshold: u64,
    chunk_size: usize,
) -> UploadMode {
    let mut chunked = requested_chunked;
    let mut adjustments = [None, None];

    if !chunked && file_length >= chunked_threshold {
        chunked = true;
        adjustments[0] = Some(Adjustment::ForcedChunked);
    }

    if chunked && file_length <= chunk_size as u64 {
        chunked = false;
        adjustments[1] = Some(Adjustment::ForcedSingle);
    }

    info!(file_length, chunked, chunk_size, "upload mode selected");

    UploadMode {
        chunked,
        chunk_size,
        adjustments,
    }
}
