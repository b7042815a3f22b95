//! Single block decompression.
//!
//! A [`Codec`] names how one contiguous range of a container was encoded and acts as the factory
//! for [`BlockDecoder`]s. Every call to [`Codec::open`] produces fresh decoder state, so one codec
//! value can be shared by any number of blocks and resources.

use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::{self, Cursor, Read};
use tracing::{instrument, trace};

use crate::container::{Container, RangeReader};
use crate::error::{Error, Result};

/// Identifies how a block is stored inside its container
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Codec {
    /// The bytes are copied as they are
    #[default]
    Stored,

    /// Zlib wrapped deflate stream
    Zlib,

    /// Raw deflate stream without a zlib header
    Deflate,

    /// A single LZ4 block without a frame or size prefix
    Lz4Block,
}

impl Codec {
    /// A short name for logs and listings
    pub fn name(self) -> &'static str {
        match self {
            Codec::Stored => "stored",
            Codec::Zlib => "zlib",
            Codec::Deflate => "deflate",
            Codec::Lz4Block => "lz4",
        }
    }

    /// Bind a new decoder to `compressed` bytes at `offset`, producing `decompressed` bytes
    ///
    /// A range whose two lengths are equal is always passed through, whatever the codec.
    #[instrument(level = "trace", skip(container), fields(container = container.name()), err)]
    pub fn open(
        self,
        container: &Container,
        offset: u64,
        compressed: u64,
        decompressed: u64,
    ) -> Result<BlockDecoder> {
        let reader = container.range_reader(offset, compressed)?;

        let stream = if compressed == decompressed {
            BlockStream::Raw(reader)
        } else {
            match self {
                Codec::Stored => {
                    return Err(Error::MissingDecoder {
                        name: format!("{}:{offset:#x}", container.name()),
                        compressed,
                        decompressed,
                    })
                }
                Codec::Zlib => BlockStream::Zlib(Box::new(ZlibDecoder::new(reader))),
                Codec::Deflate => BlockStream::Deflate(Box::new(DeflateDecoder::new(reader))),
                Codec::Lz4Block => {
                    if decompressed > lz4_max_output(compressed) {
                        return Err(Error::Decode {
                            container: container.name().to_owned(),
                            offset,
                            reason: format!(
                                "{compressed} lz4 bytes cannot expand to {decompressed} bytes"
                            ),
                        });
                    }
                    let capacity = usize::try_from(decompressed).map_err(|_| {
                        Error::CustomError(format!("{decompressed} bytes do not fit in memory"))
                    })?;
                    let data = lz4_flex::block::decompress(
                        container.slice(offset, compressed)?,
                        capacity,
                    )
                    .map_err(|e| Error::Decode {
                        container: container.name().to_owned(),
                        offset,
                        reason: e.to_string(),
                    })?;
                    BlockStream::Buffered(Cursor::new(data))
                }
            }
        };

        Ok(BlockDecoder {
            stream: Some(stream),
            container: container.clone(),
            offset,
            declared: decompressed,
            produced: 0,
        })
    }
}

/// Largest output a single LZ4 block of `compressed` bytes can produce
fn lz4_max_output(compressed: u64) -> u64 {
    compressed.saturating_mul(255).saturating_add(16)
}

enum BlockStream {
    Raw(RangeReader),
    Zlib(Box<ZlibDecoder<RangeReader>>),
    Deflate(Box<DeflateDecoder<RangeReader>>),
    Buffered(Cursor<Vec<u8>>),
}

impl Read for BlockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BlockStream::Raw(r) => r.read(buf),
            BlockStream::Zlib(r) => r.read(buf),
            BlockStream::Deflate(r) => r.read(buf),
            BlockStream::Buffered(r) => r.read(buf),
        }
    }
}

/// Decoder state for one opened block
///
/// Decoders are single use: once exhausted or closed they never produce bytes again.
pub struct BlockDecoder {
    stream: Option<BlockStream>,
    container: Container,
    offset: u64,
    declared: u64,
    produced: u64,
}

impl std::fmt::Debug for BlockDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDecoder")
            .field("container", &self.container.name())
            .field("offset", &self.offset)
            .field("declared", &self.declared)
            .field("produced", &self.produced)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

impl BlockDecoder {
    /// Whether more decoded bytes remain
    pub fn available(&self) -> bool {
        self.stream.is_some() && self.produced < self.declared
    }

    /// Bytes produced so far
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// The decompressed length this block was opened with
    pub fn declared(&self) -> u64 {
        self.declared
    }

    /// Bytes still owed by this block
    pub fn remaining(&self) -> u64 {
        self.declared - self.produced
    }

    /// Decode the next byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.read_bytes(&mut byte)? {
            0 => Err(Error::IOError(io::ErrorKind::UnexpectedEof.into())),
            _ => Ok(byte[0]),
        }
    }

    /// Decode into `buf`, never past the declared length
    ///
    /// Returns `Ok(0)` once the block is exhausted. A codec stream that ends before the declared
    /// length is reached is a decode error.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.available() || buf.is_empty() {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(self.remaining()) as usize;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };

        let result = loop {
            match stream.read(&mut buf[..want]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        let read = result.map_err(|e| self.decode_error(e.to_string()))?;

        if read == 0 {
            return Err(self.decode_error(format!(
                "block ended after {} of {} bytes",
                self.produced, self.declared
            )));
        }

        self.produced += read as u64;
        Ok(read)
    }

    /// Release the codec state, safe to call any number of times
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            trace!(offset = self.offset, produced = self.produced, "closed block");
        }
    }

    fn decode_error(&self, reason: String) -> Error {
        Error::Decode {
            container: self.container.name().to_owned(),
            offset: self.offset,
            reason,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{
        write::{DeflateEncoder, ZlibEncoder},
        Compression,
    };
    use pretty_assertions::assert_eq;

    use crate::codec::{BlockDecoder, Codec};
    use crate::container::Container;
    use crate::error::{Error, Result};

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn drain(decoder: &mut BlockDecoder) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while decoder.available() {
            out.push(decoder.read_byte()?);
        }
        Ok(out)
    }

    #[test]
    fn stored_passthrough() -> Result<()> {
        let container = Container::from_bytes("raw", b"0123456789".to_vec());
        let mut decoder = Codec::Stored.open(&container, 2, 5, 5)?;
        assert_eq!(drain(&mut decoder)?, b"23456");
        assert!(!decoder.available());
        assert!(decoder.read_byte().is_err());
        Ok(())
    }

    #[test]
    fn stored_with_unequal_lengths_is_rejected() {
        let container = Container::from_bytes("raw", b"0123456789".to_vec());
        assert!(matches!(
            Codec::Stored.open(&container, 0, 4, 8),
            Err(Error::MissingDecoder { .. })
        ));
    }

    #[test]
    fn out_of_bounds_block_fails_on_open() {
        let container = Container::from_bytes("raw", b"0123456789".to_vec());
        assert!(matches!(
            Codec::Zlib.open(&container, 8, 4, 20),
            Err(Error::Bounds { .. })
        ));
    }

    #[test]
    fn zlib_block() -> Result<()> {
        let data = b"Hello World Hello World Hello World".repeat(4);
        let packed = zlib(&data);
        let container = Container::from_bytes("zlib", packed.clone());

        let mut decoder = Codec::Zlib.open(&container, 0, packed.len() as u64, data.len() as u64)?;
        let mut out = vec![0u8; data.len() + 10];
        let mut total = 0;
        loop {
            match decoder.read_bytes(&mut out[total..])? {
                0 => break,
                n => total += n,
            }
        }
        assert_eq!(&out[..total], &data[..]);
        assert_eq!(decoder.produced(), data.len() as u64);
        Ok(())
    }

    #[test]
    fn deflate_block() -> Result<()> {
        let data = b"raw deflate, raw deflate, raw deflate".to_vec();
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&data)?;
        let packed = encoder.finish()?;

        let container = Container::from_bytes("deflate", packed.clone());
        let mut decoder =
            Codec::Deflate.open(&container, 0, packed.len() as u64, data.len() as u64)?;
        assert_eq!(drain(&mut decoder)?, data);
        Ok(())
    }

    #[test]
    fn lz4_block() -> Result<()> {
        let data = b"lz4 lz4 lz4 lz4 lz4 lz4 lz4 lz4 lz4 lz4".to_vec();
        let packed = lz4_flex::block::compress(&data);

        let container = Container::from_bytes("lz4", packed.clone());
        let mut decoder =
            Codec::Lz4Block.open(&container, 0, packed.len() as u64, data.len() as u64)?;
        assert_eq!(drain(&mut decoder)?, data);
        Ok(())
    }

    #[test]
    fn lz4_rejects_impossible_lengths() {
        let packed = lz4_flex::block::compress(b"tiny");
        let container = Container::from_bytes("lz4", packed.clone());

        let result = Codec::Lz4Block.open(&container, 0, packed.len() as u64, u64::MAX / 2);
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn output_is_capped_at_declared_length() -> Result<()> {
        let data = vec![7u8; 256];
        let packed = zlib(&data);
        let container = Container::from_bytes("zlib", packed.clone());

        let mut decoder = Codec::Zlib.open(&container, 0, packed.len() as u64, 100)?;
        assert_eq!(drain(&mut decoder)?, vec![7u8; 100]);
        Ok(())
    }

    #[test]
    fn short_stream_is_a_decode_error() -> Result<()> {
        let data = vec![1u8; 64];
        let packed = zlib(&data);
        let container = Container::from_bytes("zlib", packed.clone());

        let mut decoder = Codec::Zlib.open(&container, 0, packed.len() as u64, 80)?;
        let result = drain(&mut decoder);
        assert!(matches!(result, Err(Error::Decode { .. })));
        Ok(())
    }

    #[test]
    fn corrupt_stream_is_a_decode_error() -> Result<()> {
        let container = Container::from_bytes("junk", vec![0xFFu8; 32]);
        let mut decoder = Codec::Zlib.open(&container, 0, 32, 64)?;
        assert!(matches!(decoder.read_byte(), Err(Error::Decode { .. })));
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let container = Container::from_bytes("raw", b"abc".to_vec());
        let mut decoder = Codec::Stored.open(&container, 0, 3, 3)?;
        assert_eq!(decoder.read_byte()?, b'a');
        decoder.close();
        decoder.close();
        assert!(!decoder.available());
        let mut buf = [0u8; 4];
        assert_eq!(decoder.read_bytes(&mut buf)?, 0);
        Ok(())
    }
}
