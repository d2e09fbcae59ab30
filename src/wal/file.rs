//! Byte sinks and sources for the log
//!
//! The writer and reader only see these two traits, so the framing logic can
//! run against an in-memory buffer as easily as against a file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Append-only destination for log bytes
pub trait WritableFile {
    /// Append bytes at the end of the sink
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the operating system
    fn flush(&mut self) -> io::Result<()>;

    /// Make appended bytes durable
    fn sync(&mut self) -> io::Result<()>;
}

/// Sequential source of log bytes
pub trait SequentialFile {
    /// Read up to `buf.len()` bytes. Returns fewer only at the end of the source.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Skip `n` bytes forward. Skipping past the end leaves the source exhausted.
    fn skip(&mut self, n: u64) -> io::Result<()>;
}

impl<W: WritableFile + ?Sized> WritableFile for &mut W {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

impl<S: SequentialFile + ?Sized> SequentialFile for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        (**self).skip(n)
    }
}

// =============================================================================
// In-memory implementations
// =============================================================================

impl WritableFile for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads from any in-memory byte buffer
#[derive(Debug, Clone)]
pub struct MemorySource<T: AsRef<[u8]>> {
    data: T,
    position: usize,
}

impl<T: AsRef<[u8]>> MemorySource<T> {
    pub fn new(data: T) -> Self {
        Self { data, position: 0 }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<T: AsRef<[u8]>> SequentialFile for MemorySource<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.as_ref();
        let available = data.len().saturating_sub(self.position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let len = self.data.as_ref().len();
        let target = (self.position as u64).saturating_add(n);
        self.position = target.min(len as u64) as usize;
        Ok(())
    }
}

// =============================================================================
// File-backed implementations
// =============================================================================

/// Buffered log file opened for appending
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new, empty log file (truncating any existing one)
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Open a log file for appending, creating it if missing.
    ///
    /// Returns the sink and the current file length, which the writer needs
    /// to resume inside a partially filled block.
    pub fn open_append(path: &Path) -> Result<(Self, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let length = file.metadata()?.len();

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
            },
            length,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WritableFile for FileSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

/// Log file opened for sequential reading
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file })
    }
}

impl SequentialFile for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let offset = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip distance too large"))?;
        self.file.seek(SeekFrom::Current(offset))?;
        Ok(())
    }
}
