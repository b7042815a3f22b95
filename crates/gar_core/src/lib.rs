//! This library holds the shared machinery used by game archive plugins to describe and decode
//! the files stored inside an archive.
//!
//! # Model
//!
//! A plugin scans an archive's directory and produces one [`Resource`] per logical file. The
//! resource records which [`Container`] holds the bytes, where they start, how long they are
//! before and after decoding, and optionally how to decode them:
//!
//! | Attached plan                    | Meaning                                                      |
//! |----------------------------------|--------------------------------------------------------------|
//! | none                             | Stored: `length == decompressed_length`, bytes copied as-is  |
//! | [`DecodePlan::Codec`]            | One [`Codec`] over the resource's own range                  |
//! | [`Exporter::FixedBlocks`]        | N blocks sharing one codec                                   |
//! | [`Exporter::VariableBlocks`]     | N blocks each with their own codec                           |
//! | [`Exporter::MultiContainer`]     | N blocks each with their own codec and container             |
//! | [`Exporter::Subset`]             | A window inside another plan's output                        |
//! | [`Exporter::HeaderSkip`]         | Another plan's output without a fixed-size prefix            |
//!
//! Plugins only compute offsets and lengths and pick codecs. Consumers never care which plan
//! backs a resource: they call [`Resource::effective_decoder`] and drain the returned
//! [`ResourceReader`] until it is exhausted, which is exactly what [`drain`] and [`drain_all`]
//! do.
//!
//! # Guarantees
//!
//! - A drained resource produces exactly `decompressed_length` bytes, never more. If the plan
//!   runs out first an [`error::Error::Underrun`] is raised, which [`drain`] accepts as
//!   truncated output by default.
//! - Block boundaries and container switches are invisible in the output.
//! - Zero-length blocks are skipped.
//! - Offsets and lengths are checked against the container before any byte is decoded.
//! - Decoder state is never shared: every [`Resource::effective_decoder`] call and every block
//!   gets fresh state, and clones of a resource decode independently.
//!
//! ```
//! use gar_core::{drain_to_vec, Codec, Container, Resource, VariableBlockTable};
//!
//! // [raw 4 bytes][raw 3 bytes][zero length padding block]
//! let container = Container::from_bytes("archive", b"headbodypad".to_vec());
//! let resource = Resource::new(container, "file.bin", 0, 11, 7).with_exporter(
//!     VariableBlockTable::new(
//!         vec![Codec::Stored, Codec::Stored, Codec::Stored],
//!         vec![0, 4, 8],
//!         vec![4, 3, 3],
//!         vec![4, 3, 0],
//!     ),
//! );
//!
//! assert_eq!(drain_to_vec(&resource).unwrap(), b"headbod");
//! ```

pub mod codec;
pub mod container;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod index;
pub mod resource;
pub mod strategy;

pub use codec::{BlockDecoder, Codec};
pub use container::{Container, ContainerCursor, RangeReader};
pub use driver::{
    drain, drain_all, drain_to_vec, drain_with, BatchReport, DrainOptions, DrainReport,
    ResourceFailure, ResourceReader,
};
pub use exporter::{
    Exporter, FixedBlockTable, HeaderSkipWrapper, MultiContainerBlockTable, SubsetWrapper,
    VariableBlockTable,
};
pub use index::ResourceIndex;
pub use resource::{DecodePlan, Resource};
