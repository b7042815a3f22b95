//! TRE archive support for the gar engine: a reader that turns every entry into a
//! [`gar_core::Resource`], and a writer that builds new archives from any resource.
//!
//! # Layout
//!
//! All integers are little endian. Four-character tags are stored reversed, so "TREE" is written
//! as `EERT` and version "0005" as `5000`.
//!
//! | Offset | Size | Field                                                     |
//! |--------|------|-----------------------------------------------------------|
//! | 0x00   | 4    | Magic, `EERT`                                             |
//! | 0x04   | 4    | Version, `5000` or `4000`                                 |
//! | 0x08   | 4    | Number of records                                         |
//! | 0x0C   | 4    | Offset of the record block                                |
//! | 0x10   | 4    | Record block compression                                  |
//! | 0x14   | 4    | Record block size in the file                             |
//! | 0x18   | 4    | Name block compression                                    |
//! | 0x1C   | 4    | Name block size in the file                               |
//! | 0x20   | 4    | Name block size once decompressed                         |
//!
//! File data follows the 36 byte header, then the record block, the name block, and an optional
//! block holding the md5 of every file's stored bytes, 16 bytes per record.
//!
//! Each 24 byte record holds the bzip2 flavoured CRC-32 of the file's name, its decompressed
//! size, its data offset, its compression, its stored size and the offset of its null
//! terminated name inside the decompressed name block.
//!
//! Compression is `0` for stored data and `2` for zlib, see [`CompressionMethod`].
//!
//! # Resources
//!
//! [`TreArchive`] decodes the record and name blocks through the engine like any other
//! resource, then produces one resource per record, carrying the codec its compression
//! identifier maps to. A record with an unknown identifier is listed in
//! [`TreArchive::rejected`] instead, and the rest of the archive still opens. The record checksum
//! is exposed as the `crc32` property and the hash block, when present, as the `md5` property.
//!
//! [`TreWriter`] only keeps a block zlib compressed when that makes it smaller. Readers copy any
//! block whose stored and decompressed sizes match, so such a block is written stored instead.

pub mod compression;
pub mod error;
pub mod read;
pub mod types;
pub mod write;

pub use compression::CompressionMethod;
pub use read::TreArchive;
pub use types::TreVersion;
pub use write::TreWriter;
