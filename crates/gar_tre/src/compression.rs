//! Mapping between TRE compression identifiers and engine codecs, plus block encoding.

use std::io::{self, Cursor, Seek, Write};

use binrw::{BinRead, BinWrite};
use flate2::{write::ZlibEncoder, Compression};
use gar_core::Codec;
use tracing::{instrument, trace};

/// Identifies the storage format used to compress a block inside the TRE file
///
/// When creating TRE files, the method for records and names is chosen via
/// [`crate::write::TreWriterOptions`], and each file picks its own in
/// [`crate::write::TreWriter::start_file`].
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[brw(repr = u32)]
pub enum CompressionMethod {
    /// Stores the data as it is
    None = 0,

    /// Compress the data using Zlib
    #[default]
    Zlib = 2,
}

impl CompressionMethod {
    /// The engine codec that decodes blocks written with this method
    pub fn codec(self) -> Codec {
        match self {
            CompressionMethod::None => Codec::Stored,
            CompressionMethod::Zlib => Codec::Zlib,
        }
    }
}

impl TryFrom<u32> for CompressionMethod {
    type Error = gar_core::error::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionMethod::None),
            2 => Ok(CompressionMethod::Zlib),
            other => Err(gar_core::error::Error::UnsupportedCodec(other)),
        }
    }
}

/// One block of the archive after its final encoding was chosen
#[derive(Debug)]
pub(crate) struct FinishedBlock {
    pub compression: CompressionMethod,
    pub data: Vec<u8>,
    pub uncompressed: u64,
}

/// Accumulates one block of the archive and picks its encoding when finished
///
/// Readers pass any block whose stored and decompressed sizes match straight through, so a
/// block is only kept compressed when zlib actually made it smaller.
pub(crate) struct TreBlockWriter {
    plain: Cursor<Vec<u8>>,
    compression: CompressionMethod,
}

impl TreBlockWriter {
    pub fn new(compression: CompressionMethod) -> Self {
        Self {
            plain: Cursor::new(Vec::new()),
            compression,
        }
    }

    /// Bytes written so far, before compression
    pub fn total_in(&self) -> u64 {
        self.plain.get_ref().len() as u64
    }

    #[instrument(level = "trace", skip(self), fields(size = self.total_in()), err)]
    pub fn finish(self) -> io::Result<FinishedBlock> {
        let plain = self.plain.into_inner();
        let uncompressed = plain.len() as u64;

        if self.compression == CompressionMethod::Zlib {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&plain)?;
            let packed = encoder.finish()?;
            if packed.len() < plain.len() {
                return Ok(FinishedBlock {
                    compression: CompressionMethod::Zlib,
                    data: packed,
                    uncompressed,
                });
            }
            trace!(packed = packed.len(), "zlib did not shrink the block, storing it");
        }

        Ok(FinishedBlock {
            compression: CompressionMethod::None,
            data: plain,
            uncompressed,
        })
    }
}

// binrw writes records through Seek, the cursor only ever grows at its end
impl Seek for TreBlockWriter {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.plain.seek(pos)
    }
}

impl Write for TreBlockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.plain.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
