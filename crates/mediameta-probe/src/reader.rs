//! Bounded, seekable read access over a media source.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Error, Result};

/// Default cap on a single read, used until the orchestrator applies its limits.
const DEFAULT_READ_CAP: usize = 1024 * 1024;

trait Source: Read + Seek + Send {}

impl<T: Read + Seek + Send> Source for T {}

/// Where the bytes of an extraction come from.
///
/// Accepts plain filesystem paths and `file://` URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator(PathBuf);

impl Locator {
    /// Parse a path or `file://` URL.
    pub fn parse(input: &str) -> Result<Self> {
        if !input.contains("://") {
            return Ok(Self(PathBuf::from(input)));
        }

        let url = Url::parse(input).map_err(|e| Error::InvalidLocator(format!("{input}: {e}")))?;
        if url.scheme() != "file" {
            return Err(Error::InvalidLocator(format!(
                "{input}: unsupported scheme `{}`",
                url.scheme()
            )));
        }
        url.to_file_path()
            .map(Self)
            .map_err(|()| Error::InvalidLocator(format!("{input}: not a local file URL")))
    }

    /// The resolved filesystem path.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for Locator {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// An exclusively owned, read-only, seekable byte source.
///
/// Reads are positional: every call names its offset, so parsers can probe
/// speculatively. Offsets at or beyond the end yield an empty buffer rather
/// than an error. The underlying file is released when the handle drops.
pub struct FileHandle {
    source: Box<dyn Source>,
    len: u64,
    label: String,
    read_cap: usize,
}

impl FileHandle {
    /// Open a file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let len = file.metadata()?.len();

        Ok(Self {
            source: Box::new(BufReader::new(file)),
            len,
            label: path.display().to_string(),
            read_cap: DEFAULT_READ_CAP,
        })
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            len: data.len() as u64,
            source: Box::new(Cursor::new(data)),
            label: "<memory>".to_string(),
            read_cap: DEFAULT_READ_CAP,
        }
    }

    /// Cap every subsequent read at `cap` bytes.
    #[cfg(test)]
    pub(crate) fn with_read_cap(mut self, cap: usize) -> Self {
        self.read_cap = cap.max(1);
        self
    }

    /// Total byte count of the source.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the source holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path or `<memory>`, for diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read up to `max_len` bytes starting at `offset`.
    ///
    /// The result is shorter than requested only at end of data or when the
    /// request exceeds the handle's read cap.
    pub fn read_at(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        if offset >= self.len || max_len == 0 {
            return Ok(Vec::new());
        }

        let available = self.len - offset;
        let want = (max_len.min(self.read_cap) as u64).min(available) as usize;

        self.source.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Read exactly `len` bytes at `offset`, or `None` if fewer exist.
    pub fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Option<Vec<u8>>> {
        let buf = self.read_at(offset, len)?;
        Ok((buf.len() == len).then_some(buf))
    }

    /// Release the source.
    pub fn close(self) {}
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("label", &self.label)
            .field("len", &self.len)
            .finish()
    }
}
