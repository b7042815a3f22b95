//! Draining resources.
//!
//! Every consumer, whether it extracts, previews or hashes, reads a resource the same way:
//!
//! ```no_run
//! # fn doit(resource: &gar_core::Resource) -> gar_core::error::Result<()> {
//! let mut reader = resource.effective_decoder()?;
//! let mut out = Vec::new();
//! while reader.available()? {
//!     out.push(reader.read_byte()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`drain`] is the buffered form of that loop, and [`drain_all`] runs it over a batch of
//! resources while keeping one resource's failure from affecting its siblings.

use bon::Builder;
use std::io::{self, Read, Write};
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::exporter::ExportStream;
use crate::resource::Resource;

/// The open decode stream of one resource
///
/// Output stops exactly at the resource's decompressed length. When the plan runs out of
/// blocks first, [`Error::Underrun`] is raised once and the reader then reports itself exhausted.
#[derive(Debug)]
pub struct ResourceReader {
    name: Box<str>,
    stream: ExportStream,
    declared: u64,
    produced: u64,
    finished: bool,
}

impl ResourceReader {
    pub(crate) fn new(name: &str, stream: ExportStream, declared: u64) -> Self {
        Self {
            name: name.into(),
            stream,
            declared,
            produced: 0,
            finished: false,
        }
    }

    /// Name of the resource being decoded
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes produced so far
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Whether more decoded bytes remain
    pub fn available(&mut self) -> Result<bool> {
        if self.finished || self.produced >= self.declared {
            return Ok(false);
        }

        if self.stream.available()? {
            return Ok(true);
        }

        self.finished = true;
        self.stream.close();
        Err(Error::Underrun {
            expected: self.declared,
            actual: self.produced,
        })
    }

    /// Decode the next byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.read_bytes(&mut byte)? {
            0 => Err(Error::IOError(io::ErrorKind::UnexpectedEof.into())),
            _ => Ok(byte[0]),
        }
    }

    /// Decode into `buf`, returning `Ok(0)` once the resource is complete
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || !self.available()? {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(self.declared - self.produced) as usize;
        let read = self.stream.read_bytes(&mut buf[..want])?;
        self.produced += read as u64;
        Ok(read)
    }

    /// Release all decoder state, safe to call at any point
    pub fn close(&mut self) {
        self.finished = true;
        self.stream.close();
    }
}

impl Read for ResourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(Error::into_io)
    }
}

/// Options for draining resources
#[derive(Debug, Clone, Copy, Builder)]
pub struct DrainOptions {
    /// Size of the intermediate copy buffer
    #[builder(default = 64 * 1024)]
    pub buffer_size: usize,

    /// Accept output that ends before the declared length
    #[builder(default = true)]
    pub allow_truncated: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The outcome of draining one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Bytes written to the sink
    pub written: u64,
    /// The resource's declared decompressed length
    pub expected: u64,
    /// The plan ran out of data before `expected` bytes were produced
    pub truncated: bool,
}

/// Decode a resource into `sink` with default options
pub fn drain<W: Write + ?Sized>(resource: &Resource, sink: &mut W) -> Result<DrainReport> {
    drain_with(resource, sink, DrainOptions::default())
}

/// Decode a resource into `sink`
#[instrument(skip_all, fields(name = %resource.name()), err)]
pub fn drain_with<W: Write + ?Sized>(
    resource: &Resource,
    sink: &mut W,
    options: DrainOptions,
) -> Result<DrainReport> {
    let mut reader = resource.effective_decoder()?;
    let mut buffer = vec![0u8; options.buffer_size.max(1)];
    let mut written = 0u64;

    let truncated = loop {
        match reader.read_bytes(&mut buffer) {
            Ok(0) => break false,
            Ok(n) => {
                sink.write_all(&buffer[..n])?;
                written += n as u64;
            }
            Err(e) if e.is_underrun() && options.allow_truncated => {
                warn!(%e, "accepting truncated output");
                break true;
            }
            Err(e) => {
                reader.close();
                return Err(e);
            }
        }
    };
    reader.close();

    Ok(DrainReport {
        written,
        expected: resource.decompressed_length(),
        truncated,
    })
}

/// Decode a resource fully into memory
pub fn drain_to_vec(resource: &Resource) -> Result<Vec<u8>> {
    let capacity = usize::try_from(resource.decompressed_length()).unwrap_or(0);
    let mut out = Vec::with_capacity(capacity.min(64 * 1024 * 1024));
    drain(resource, &mut out)?;
    Ok(out)
}

/// A resource that could not be drained
#[derive(Debug)]
pub struct ResourceFailure {
    /// Position of the resource in the batch
    pub index: usize,
    pub name: String,
    pub error: Error,
}

/// The outcome of draining a batch of resources
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Position in the batch and report of every resource that was drained
    pub completed: Vec<(usize, DrainReport)>,
    pub failures: Vec<ResourceFailure>,
}

impl BatchReport {
    /// Whether every resource was drained
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of resources that were drained but came out short
    pub fn truncated(&self) -> usize {
        self.completed.iter().filter(|(_, r)| r.truncated).count()
    }
}

/// Drain every resource into the sink `sink_for` opens for it
///
/// A failure, whether opening the sink or decoding, is logged and recorded against that one
/// resource and the batch continues with the next.
pub fn drain_all<'a, I, F, W>(resources: I, options: DrainOptions, mut sink_for: F) -> BatchReport
where
    I: IntoIterator<Item = &'a Resource>,
    F: FnMut(usize, &Resource) -> Result<W>,
    W: Write,
{
    let mut report = BatchReport::default();

    for (index, resource) in resources.into_iter().enumerate() {
        let result = sink_for(index, resource).and_then(|mut sink| {
            let drained = drain_with(resource, &mut sink, options)?;
            sink.flush()?;
            Ok(drained)
        });

        match result {
            Ok(drained) => report.completed.push((index, drained)),
            Err(e) => {
                error!(index, name = resource.name(), %e, "unable to extract resource");
                report.failures.push(ResourceFailure {
                    index,
                    name: resource.name().to_owned(),
                    error: e,
                });
            }
        }
    }

    info!(
        completed = report.completed.len(),
        failed = report.failures.len(),
        truncated = report.truncated(),
        "batch finished"
    );
    report
}
