//! On-disk structures of a TRE archive.

use std::fmt;

use binrw::{BinRead, BinWrite};

use crate::compression::CompressionMethod;

/// Size of the fixed header, which is also where the data block starts
pub const HEADER_SIZE: u32 = 36;

/// Size of one entry in the record block
pub const RECORD_SIZE: u32 = 24;

/// Size of one entry in the trailing hash block
pub const HASH_SIZE: u32 = 16;

/// Archive format revision, stored reversed after the magic
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum TreVersion {
    #[default]
    #[brw(magic = b"5000")]
    V5,

    #[brw(magic = b"4000")]
    V4,
}

impl TreVersion {
    /// Versions the reader understands, newest first
    pub const CANDIDATES: [TreVersion; 2] = [TreVersion::V5, TreVersion::V4];
}

impl fmt::Display for TreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreVersion::V5 => f.write_str("0005"),
            TreVersion::V4 => f.write_str("0004"),
        }
    }
}

/// TRE file header
///
/// The file starts with "TREE" and a version, both stored byte-reversed. Reading takes the
/// version the caller expects so that each supported revision can be tried in turn. All data is
/// little endian.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"EERT", little)]
#[br(import(expected: TreVersion))]
pub struct TreHeader {
    #[br(assert(version == expected, "archive is version {}, not {}", version, expected))]
    pub version: TreVersion,

    /// The number of records stored in the file
    pub records: u32,

    /// The offset from the beginning of the file where the record block starts
    pub record_start: u32,

    /// The compression type used for the record block
    pub record_compression: CompressionMethod,

    /// The size in the file of the record block
    pub record_compressed: u32,

    /// The compression type used for the block of file names
    pub name_compression: CompressionMethod,

    /// The size of the name block after compression
    pub name_compressed: u32,

    /// The size of the name block before compression
    pub name_uncompressed: u32,
}

impl TreHeader {
    /// Where the name block starts, directly after the record block
    pub fn name_start(&self) -> u64 {
        self.record_start as u64 + self.record_compressed as u64
    }

    /// Where the hash block starts, directly after the name block
    pub fn hash_start(&self) -> u64 {
        self.name_start() + self.name_compressed as u64
    }

    /// Decompressed size of the record block
    pub fn record_uncompressed(&self) -> u64 {
        self.records as u64 * RECORD_SIZE as u64
    }
}

impl Default for TreHeader {
    fn default() -> Self {
        Self {
            version: TreVersion::default(),
            records: 0,
            record_start: HEADER_SIZE,
            record_compression: CompressionMethod::default(),
            record_compressed: 0,
            name_compression: CompressionMethod::default(),
            name_compressed: 0,
            name_uncompressed: 0,
        }
    }
}

/// One entry of the record block
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct TreRecord {
    /// A [`crc::CRC_32_BZIP2`] checksum of the record's name
    pub checksum: u32,

    pub data_uncompressed: u32,

    /// Offset of the data from the start of the file
    pub data_offset: u32,

    /// Raw compression identifier, checked per entry by [`TreRecord::compression`]
    pub data_compression: u32,

    pub data_compressed: u32,

    /// Offset of the name from the start of the decompressed name block
    pub name_offset: u32,
}

impl TreRecord {
    /// How this entry's data was stored
    pub fn compression(&self) -> gar_core::error::Result<CompressionMethod> {
        CompressionMethod::try_from(self.data_compression)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};
    use pretty_assertions::assert_eq;

    use crate::compression::CompressionMethod;
    use crate::error::Result;
    use crate::types::{TreHeader, TreRecord, TreVersion};

    #[rustfmt::skip]
    const COMPRESSED_V4: [u8; 36] = [
        0x45, 0x45, 0x52, 0x54, 0x34, 0x30, 0x30, 0x30,
        0x03, 0x00, 0x00, 0x00,
        0x80, 0x00, 0x00, 0x00,
        0x02, 0x00, 0x00, 0x00,
        0x31, 0x00, 0x00, 0x00,
        0x02, 0x00, 0x00, 0x00,
        0x1C, 0x00, 0x00, 0x00,
        0x2A, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn read_uncompressed_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x45, 0x45, 0x52, 0x54, 0x35, 0x30, 0x30, 0x30,
            0x00, 0x00, 0x00, 0x00,
            0x24, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ]);

        let expected = TreHeader {
            record_compression: CompressionMethod::None,
            name_compression: CompressionMethod::None,
            ..Default::default()
        };

        assert_eq!(TreHeader::read_args(&mut input, (TreVersion::V5,))?, expected);
        Ok(())
    }

    #[test]
    fn read_compressed_v4_header() -> Result<()> {
        let header = TreHeader::read_args(&mut Cursor::new(COMPRESSED_V4), (TreVersion::V4,))?;

        assert_eq!(header.version, TreVersion::V4);
        assert_eq!(header.records, 3);
        assert_eq!(header.record_uncompressed(), 72);
        assert_eq!(header.name_start(), 0x80 + 0x31);
        assert_eq!(header.hash_start(), 0x80 + 0x31 + 0x1C);
        assert_eq!(header.name_compression, CompressionMethod::Zlib);
        Ok(())
    }

    #[test]
    fn wrong_version_is_rejected() {
        let result = TreHeader::read_args(&mut Cursor::new(COMPRESSED_V4), (TreVersion::V5,));
        assert!(result.is_err());
    }

    #[test]
    fn header_writes_back_identically() -> Result<()> {
        let header = TreHeader::read_args(&mut Cursor::new(COMPRESSED_V4), (TreVersion::V4,))?;

        let mut out = Cursor::new(Vec::new());
        header.write(&mut out)?;
        assert_eq!(out.into_inner(), COMPRESSED_V4);
        Ok(())
    }

    #[test]
    fn unknown_record_compression_is_kept_raw() -> Result<()> {
        let record = TreRecord {
            data_compression: 1,
            ..Default::default()
        };

        let mut out = Cursor::new(Vec::new());
        record.write(&mut out)?;
        out.set_position(0);

        let record = TreRecord::read(&mut out)?;
        assert_eq!(record.data_compression, 1);
        assert!(matches!(
            record.compression(),
            Err(gar_core::error::Error::UnsupportedCodec(1))
        ));
        Ok(())
    }

    #[test]
    fn read_record() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x78, 0x56, 0x34, 0x12,
            0x0B, 0x00, 0x00, 0x00,
            0x24, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x13, 0x00, 0x00, 0x00,
            0x0A, 0x00, 0x00, 0x00,
        ]);

        let expected = TreRecord {
            checksum: 0x1234_5678,
            data_uncompressed: 11,
            data_offset: 36,
            data_compression: 2,
            data_compressed: 19,
            name_offset: 10,
        };

        let record = TreRecord::read(&mut input)?;
        assert_eq!(record, expected);
        assert_eq!(record.compression()?, CompressionMethod::Zlib);
        Ok(())
    }
}
