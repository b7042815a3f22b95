//! Shared, read-only byte sources that resources point into.
//!

use byteorder::ReadBytesExt;
use memmap2::Mmap;
use std::{
    fmt::{self, Debug},
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

enum Backing {
    Memory(Box<[u8]>),
    Mapped(Mmap),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Memory(b) => b,
            Backing::Mapped(m) => &m[..],
        }
    }
}

struct Inner {
    name: Box<str>,
    backing: Backing,
}

/// A physical archive (or archive part) backing one or more resources
///
/// Cloning a container only clones the handle. Every reader created from it keeps its own
/// position, so resources sharing a container never depend on each other's seek state.
///
/// ```
/// use gar_core::Container;
///
/// let container = Container::from_bytes("memory", b"Hello, World!".to_vec());
/// assert_eq!(container.slice(7, 5).unwrap(), b"World");
/// assert!(container.slice(7, 50).is_err());
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Container({}, {} bytes)", self.name(), self.len())
    }
}

/// Two handles are equal when they refer to the same opened container
impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Container {
    /// Map a file from disk
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // zero length files cannot be mapped on every platform
        let backing = if file.metadata()?.len() == 0 {
            Backing::Memory(Box::default())
        } else {
            // SAFETY: the map is read-only and archives are not modified while they are open
            Backing::Mapped(unsafe { Mmap::map(&file)? })
        };

        let container = Container {
            inner: Arc::new(Inner {
                name: path.display().to_string().into(),
                backing,
            }),
        };
        debug!(size = container.len(), "mapped container");
        Ok(container)
    }

    /// Wrap an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Container {
            inner: Arc::new(Inner {
                name: name.into().into(),
                backing: Backing::Memory(bytes.into().into_boxed_slice()),
            }),
        }
    }

    /// The path or label the container was created with
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Total size in bytes
    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    /// Whether the container holds no bytes at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate that `[offset, offset + length)` lies inside the container
    pub fn check_range(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(self.bounds_error(offset, length)),
        }
    }

    /// Borrow a bounds-checked byte range
    pub fn slice(&self, offset: u64, length: u64) -> Result<&[u8]> {
        self.check_range(offset, length)?;
        // the range fits in a slice we already hold, so both casts are lossless
        Ok(&self.bytes()[offset as usize..(offset + length) as usize])
    }

    /// Create an independent reader over one byte range
    pub fn range_reader(&self, offset: u64, length: u64) -> Result<RangeReader> {
        self.check_range(offset, length)?;
        Ok(RangeReader {
            container: self.clone(),
            position: offset,
            end: offset + length,
        })
    }

    /// Create a seekable cursor over the whole container, positioned at the start
    pub fn cursor(&self) -> ContainerCursor {
        ContainerCursor {
            container: self.clone(),
            position: 0,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.inner.backing.bytes()
    }

    fn bounds_error(&self, offset: u64, length: u64) -> Error {
        Error::Bounds {
            container: self.name().to_owned(),
            offset,
            length,
            size: self.len(),
        }
    }
}

/// Reads one fixed window of a container
#[derive(Debug, Clone)]
pub struct RangeReader {
    container: Container,
    position: u64,
    end: u64,
}

impl RangeReader {
    /// Bytes left before the end of the window
    pub fn remaining(&self) -> u64 {
        self.end - self.position
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = (buf.len() as u64).min(self.remaining()) as usize;
        if count == 0 {
            return Ok(0);
        }

        let start = self.position as usize;
        buf[..count].copy_from_slice(&self.container.bytes()[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

/// Seekable cursor used while scanning a container's directory
///
/// Seeking outside of the container fails instead of silently reading zeroes, and
/// [`ContainerCursor::read_bytes`] validates the whole length before copying anything.
#[derive(Debug, Clone)]
pub struct ContainerCursor {
    container: Container,
    position: u64,
}

impl ContainerCursor {
    /// The container this cursor reads from
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Current absolute position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes between the position and the end of the container
    pub fn remaining(&self) -> u64 {
        self.container.len().saturating_sub(self.position)
    }

    /// Move to an absolute position
    pub fn seek_to(&mut self, offset: u64) -> Result<u64> {
        self.container.check_range(offset, 0)?;
        self.position = offset;
        Ok(offset)
    }

    /// Move relative to the current position
    pub fn skip(&mut self, delta: i64) -> Result<u64> {
        let target = self
            .position
            .checked_add_signed(delta)
            .ok_or_else(|| self.container.bounds_error(self.position, delta.unsigned_abs()))?;
        self.seek_to(target)
    }

    /// Read exactly `length` bytes
    pub fn read_bytes(&mut self, length: u64) -> Result<Vec<u8>> {
        let bytes = self.container.slice(self.position, length)?.to_vec();
        self.position += length;
        Ok(bytes)
    }

    /// Read bytes up to a null terminator, consuming the terminator
    pub fn read_null_string(&mut self) -> Result<Vec<u8>> {
        read_null_terminated(self)
    }
}

/// Read bytes up to a null terminator from any reader, consuming the terminator
pub fn read_null_terminated(reader: &mut impl Read) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    loop {
        match reader.read_u8()? {
            b'\0' => break,
            c => raw.push(c),
        }
    }
    Ok(raw)
}

impl Read for ContainerCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = (buf.len() as u64).min(self.remaining()) as usize;
        if count == 0 {
            return Ok(0);
        }

        let start = self.position as usize;
        buf[..count].copy_from_slice(&self.container.bytes()[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for ContainerCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let result = match pos {
            SeekFrom::Start(offset) => self.seek_to(offset),
            SeekFrom::Current(delta) => self.skip(delta),
            SeekFrom::End(delta) => {
                let end = self.container.len();
                end.checked_add_signed(delta)
                    .ok_or_else(|| self.container.bounds_error(end, delta.unsigned_abs()))
                    .and_then(|target| self.seek_to(target))
            }
        };
        result.map_err(Error::into_io)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
