use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

/// How a stream of `total_length` bytes splits into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_length: u64,
    pub chunk_size: usize,
    pub chunk_count: u64,
}

impl ChunkPlan {
    /// Returns `None` for a zero `chunk_size`.
    pub fn new(total_length: u64, chunk_size: usize) -> Option<Self> {
        if chunk_size == 0 {
            return None;
        }
        let chunk_count = total_length.div_ceil(chunk_size as u64);
        Some(Self {
            total_length,
            chunk_size,
            chunk_count,
        })
    }

    /// Byte offset at which chunk `index` starts.
    pub fn offset_of(&self, index: u64) -> u64 {
        index * self.chunk_size as u64
    }

    /// Length of chunk `index`; only the last one may be short.
    pub fn chunk_len(&self, index: u64) -> usize {
        let remaining = self.total_length.saturating_sub(self.offset_of(index));
        remaining.min(self.chunk_size as u64) as usize
    }

    pub fn is_last(&self, index: u64) -> bool {
        index + 1 == self.chunk_count
    }
}

/// Sequential fixed-window reader over a stream of known length.
pub struct ChunkSource<R> {
    reader: R,
    length: u64,
    position: u64,
}

impl ChunkSource<File> {
    /// Opens `path` for reading; the handle is closed when the source drops.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        Ok(Self::new(file, length))
    }
}

impl<R: AsyncRead + Unpin> ChunkSource<R> {
    pub fn new(reader: R, length: u64) -> Self {
        Self {
            reader,
            length,
            position: 0,
        }
    }

    /// Total stream length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fills `buf` (or as much as remains of the stream) and returns the count.
    ///
    /// Returns 0 once the stream is exhausted. A stream that ends before its
    /// declared length yields `UnexpectedEof`.
    pub async fn read_next(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.position;
        let want = remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        self.reader.read_exact(&mut buf[..want]).await?;
        self.position += want as u64;
        Ok(want)
    }

    /// Reads the whole remaining stream into memory.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut data = vec![0u8; (self.length - self.position) as usize];
        let n = self.read_next(&mut data).await?;
        data.truncate(n);
        Ok(data)
    }
}
