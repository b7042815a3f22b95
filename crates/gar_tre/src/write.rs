//! Types for writing TRE archives
//!

use binrw::BinWrite;
use bon::Builder;
use byteorder::WriteBytesExt;
use gar_core::{drain, DrainReport, Resource};
use md5::{Digest, Md5};
use std::io::{self, Seek, Write};
use tracing::{debug, instrument, Level};

use crate::compression::{CompressionMethod, TreBlockWriter};
use crate::error::{Error, Result};
use crate::types::{TreHeader, TreRecord, TreVersion, HEADER_SIZE};

/// Options for how the TRE file should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct TreWriterOptions {
    /// The compression method to use for the record block
    #[builder(default)]
    pub record_compression: CompressionMethod,

    /// The compression method to use for the name block
    #[builder(default)]
    pub name_compression: CompressionMethod,

    #[builder(default)]
    pub version: TreVersion,
}

/// TRE archive generator
///
/// ```
/// # fn doit() -> gar_tre::error::Result<()>
/// # {
/// use gar_tre::{write::TreWriterOptions, CompressionMethod, TreArchive, TreWriter};
/// use std::io::Write;
///
/// let mut tre = TreWriter::new(std::io::Cursor::new(Vec::new()), TreWriterOptions::builder()
///            .name_compression(CompressionMethod::None)
///            .build());
///
/// tre.start_file("hello_world.txt", CompressionMethod::Zlib)?;
/// tre.write_all(b"Hello, World!")?;
///
/// let bytes = tre.finish()?.into_inner();
/// let archive = TreArchive::from_container(gar_core::Container::from_bytes("hello.tre", bytes))?;
/// assert_eq!(gar_core::drain_to_vec(archive.by_index(0)?)?, b"Hello, World!");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct TreWriter<W: Write + Seek> {
    inner: W,
    record_block: TreBlockWriter,
    data_block: Vec<u8>,
    name_block: TreBlockWriter,
    hash_block: Vec<u8>,
    current: Option<(TreBlockWriter, TreRecord)>,
    header: TreHeader,
}

impl<W: Write + Seek> TreWriter<W> {
    /// Initializes the archive.
    ///
    /// Before writing to this object, [`TreWriter::start_file`] should be called. A started
    /// file stays open until the next one is started or the archive is finished.
    pub fn new(inner: W, options: TreWriterOptions) -> TreWriter<W> {
        TreWriter {
            inner,
            record_block: TreBlockWriter::new(options.record_compression),
            data_block: Vec::new(),
            name_block: TreBlockWriter::new(options.name_compression),
            hash_block: Vec::new(),
            current: None,
            header: TreHeader {
                version: options.version,
                ..Default::default()
            },
        }
    }

    /// Returns true if a file is currently open for writing.
    pub const fn is_writing_file(&self) -> bool {
        self.current.is_some()
    }

    /// Start a new file with the requested compression, finishing the previous one
    ///
    /// Zlib is only a preference. A file that zlib cannot shrink is stored as it is.
    #[instrument(skip(self, name), fields(name = %name.as_ref()), err)]
    pub fn start_file(&mut self, name: impl AsRef<str>, compression: CompressionMethod) -> Result<()> {
        self.finish_file()?;

        let name = name.as_ref();
        let record = TreRecord {
            checksum: crc::Crc::<u32>::new(&crc::CRC_32_BZIP2).checksum(name.as_bytes()),
            data_offset: HEADER_SIZE.wrapping_add(self.data_block.len() as u32),
            name_offset: self.name_block.total_in() as u32,
            ..Default::default()
        };

        self.name_block.write_all(name.as_bytes())?;
        self.name_block.write_u8(0)?;
        self.header.records += 1;

        self.current = Some((TreBlockWriter::new(compression), record));
        Ok(())
    }

    /// Close the open file, if any, and append its record
    #[instrument(skip(self), err)]
    pub fn finish_file(&mut self) -> Result<()> {
        let Some((data, mut record)) = self.current.take() else {
            return Ok(());
        };

        let finished = data.finish()?;
        record.data_compression = finished.compression as u32;
        record.data_uncompressed = finished.uncompressed as u32;
        record.data_compressed = finished.data.len() as u32;

        record.write(&mut self.record_block)?;
        self.hash_block.extend_from_slice(&Md5::digest(&finished.data));
        self.data_block.extend_from_slice(&finished.data);
        Ok(())
    }

    /// Copy a decoded resource from any archive into a new file
    ///
    /// The resource is drained through its own decode plan, so it may come from any format the
    /// engine can read.
    #[instrument(skip_all, fields(name = %resource.name()), err)]
    pub fn add_resource(
        &mut self,
        resource: &Resource,
        compression: CompressionMethod,
    ) -> Result<DrainReport> {
        self.start_file(resource.name(), compression)?;
        let report = drain(resource, self)?;
        self.finish_file()?;
        debug!(written = report.written, truncated = report.truncated, "added resource");
        Ok(report)
    }

    /// Finish the last file and write all other TRE file structures
    ///
    /// This will return the writer, but one should normally not append any data to the end of
    /// the file.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_file()?;

        self.header.record_start = HEADER_SIZE.wrapping_add(self.data_block.len() as u32);

        let records = self.record_block.finish()?;
        self.header.record_compression = records.compression;
        self.header.record_compressed = records.data.len() as u32;

        let names = self.name_block.finish()?;
        self.header.name_compression = names.compression;
        self.header.name_compressed = names.data.len() as u32;
        self.header.name_uncompressed = names.uncompressed as u32;

        self.header.write(&mut self.inner)?;
        self.inner.write_all(&self.data_block)?;
        self.inner.write_all(&records.data)?;
        self.inner.write_all(&names.data)?;
        self.inner.write_all(&self.hash_block)?;

        Ok(self.inner)
    }
}

impl<W: Write + Seek> Write for TreWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some((data, _)) => data.write(buf),
            None => Err(io::Error::other(Error::NoFileStarted)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
