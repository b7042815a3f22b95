//! Composed decode plans spanning several blocks or containers.
//!
//! An [`Exporter`] describes how one resource's bytes are assembled:
//!
//! | Variant                          | Blocks | Codec     | Containers | Window           |
//! |----------------------------------|--------|-----------|------------|------------------|
//! | [`Exporter::FixedBlocks`]        | N      | shared    | resource's | whole            |
//! | [`Exporter::VariableBlocks`]     | N      | per block | resource's | whole            |
//! | [`Exporter::MultiContainer`]     | N      | per block | per block  | whole            |
//! | [`Exporter::Subset`]             | inner  | inner     | inner      | `[skip, skip+n)` |
//! | [`Exporter::HeaderSkip`]         | inner  | inner     | inner      | `[skip, ..)`     |
//!
//! Plans are plain data and can be cloned freely. Opening a plan produces an independent stream
//! which lazily opens one [`BlockDecoder`] at a time, closing each block once it is exhausted and
//! moving on to the next one without any visible seam. Blocks that decode to zero bytes are
//! skipped.

use tracing::{instrument, trace};

use crate::codec::{BlockDecoder, Codec};
use crate::container::Container;
use crate::error::{Error, Result, TableLengths};

/// A composed decode plan for one resource
#[derive(Debug, Clone, PartialEq)]
pub enum Exporter {
    /// Sequential blocks sharing one codec
    FixedBlocks(FixedBlockTable),

    /// Sequential blocks each with their own codec
    VariableBlocks(VariableBlockTable),

    /// Sequential blocks each read from their own container
    MultiContainer(MultiContainerBlockTable),

    /// A window inside another plan's output
    Subset(SubsetWrapper),

    /// Another plan's output without its first bytes
    HeaderSkip(HeaderSkipWrapper),
}

/// Sum of plugin supplied lengths, saturating instead of overflowing
fn total(lengths: &[u64]) -> u64 {
    lengths.iter().fold(0u64, |sum, &n| sum.saturating_add(n))
}

impl Exporter {
    /// Total bytes this plan produces when every block decodes fully
    pub fn decompressed_len(&self) -> u64 {
        match self {
            Exporter::FixedBlocks(t) => total(&t.decompressed),
            Exporter::VariableBlocks(t) => total(&t.decompressed),
            Exporter::MultiContainer(t) => total(&t.decompressed),
            Exporter::Subset(w) => {
                let rest = w.inner.decompressed_len().saturating_sub(w.skip);
                w.length.map_or(rest, |length| length.min(rest))
            }
            Exporter::HeaderSkip(w) => w.inner.decompressed_len().saturating_sub(w.skip),
        }
    }

    /// Check table shapes and block bounds without reading any data
    pub fn validate(&self, container: &Container) -> Result<()> {
        match self {
            Exporter::Subset(w) => w.inner.validate(container),
            Exporter::HeaderSkip(w) => w.inner.validate(container),
            table => {
                for block in table.blocks(container)? {
                    block.container.check_range(block.offset, block.compressed)?;
                }
                Ok(())
            }
        }
    }

    /// Open an independent stream over this plan
    ///
    /// `container` is used by the tables that do not name their own containers.
    #[instrument(level = "debug", skip_all, fields(container = container.name()), err)]
    pub(crate) fn open(&self, container: &Container) -> Result<ExportStream> {
        match self {
            Exporter::Subset(w) => Ok(ExportStream::Window(Box::new(WindowStream::new(
                w.inner.open(container)?,
                w.skip,
                w.length,
            )))),
            Exporter::HeaderSkip(w) => Ok(ExportStream::Window(Box::new(WindowStream::new(
                w.inner.open(container)?,
                w.skip,
                None,
            )))),
            table => Ok(ExportStream::Table(TableStream::open(
                table.blocks(container)?,
            )?)),
        }
    }

    fn blocks(&self, container: &Container) -> Result<Vec<BlockSpec>> {
        match self {
            Exporter::FixedBlocks(t) => t.blocks(container),
            Exporter::VariableBlocks(t) => t.blocks(container),
            Exporter::MultiContainer(t) => t.blocks(),
            Exporter::Subset(_) | Exporter::HeaderSkip(_) => Ok(Vec::new()),
        }
    }
}

impl From<FixedBlockTable> for Exporter {
    fn from(value: FixedBlockTable) -> Self {
        Exporter::FixedBlocks(value)
    }
}

impl From<VariableBlockTable> for Exporter {
    fn from(value: VariableBlockTable) -> Self {
        Exporter::VariableBlocks(value)
    }
}

impl From<MultiContainerBlockTable> for Exporter {
    fn from(value: MultiContainerBlockTable) -> Self {
        Exporter::MultiContainer(value)
    }
}

impl From<SubsetWrapper> for Exporter {
    fn from(value: SubsetWrapper) -> Self {
        Exporter::Subset(value)
    }
}

impl From<HeaderSkipWrapper> for Exporter {
    fn from(value: HeaderSkipWrapper) -> Self {
        Exporter::HeaderSkip(value)
    }
}

/// N sequential blocks of the resource's container, all using the same codec
#[derive(Debug, Clone, PartialEq)]
pub struct FixedBlockTable {
    pub codec: Codec,
    pub offsets: Vec<u64>,
    pub compressed: Vec<u64>,
    pub decompressed: Vec<u64>,
}

impl FixedBlockTable {
    pub fn new(
        codec: Codec,
        offsets: Vec<u64>,
        compressed: Vec<u64>,
        decompressed: Vec<u64>,
    ) -> Self {
        Self {
            codec,
            offsets,
            compressed,
            decompressed,
        }
    }

    /// A table holding exactly one block
    pub fn single(codec: Codec, offset: u64, compressed: u64, decompressed: u64) -> Self {
        Self::new(codec, vec![offset], vec![compressed], vec![decompressed])
    }

    fn blocks(&self, container: &Container) -> Result<Vec<BlockSpec>> {
        check_lengths(TableLengths {
            offsets: self.offsets.len(),
            compressed: self.compressed.len(),
            decompressed: self.decompressed.len(),
            codecs: None,
            containers: None,
        })?;

        Ok(self
            .offsets
            .iter()
            .zip(&self.compressed)
            .zip(&self.decompressed)
            .map(|((&offset, &compressed), &decompressed)| BlockSpec {
                container: container.clone(),
                codec: self.codec,
                offset,
                compressed,
                decompressed,
            })
            .collect())
    }
}

/// N sequential blocks of the resource's container, each with its own codec
///
/// Used when stored and compressed blocks are interleaved inside one logical file.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableBlockTable {
    pub codecs: Vec<Codec>,
    pub offsets: Vec<u64>,
    pub compressed: Vec<u64>,
    pub decompressed: Vec<u64>,
}

impl VariableBlockTable {
    pub fn new(
        codecs: Vec<Codec>,
        offsets: Vec<u64>,
        compressed: Vec<u64>,
        decompressed: Vec<u64>,
    ) -> Self {
        Self {
            codecs,
            offsets,
            compressed,
            decompressed,
        }
    }

    fn blocks(&self, container: &Container) -> Result<Vec<BlockSpec>> {
        check_lengths(TableLengths {
            offsets: self.offsets.len(),
            compressed: self.compressed.len(),
            decompressed: self.decompressed.len(),
            codecs: Some(self.codecs.len()),
            containers: None,
        })?;

        Ok((0..self.offsets.len())
            .map(|i| BlockSpec {
                container: container.clone(),
                codec: self.codecs[i],
                offset: self.offsets[i],
                compressed: self.compressed[i],
                decompressed: self.decompressed[i],
            })
            .collect())
    }
}

/// N sequential blocks, each naming the container it is read from
///
/// Used when a logical file is split across archive parts, such as a bank and its stream file.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiContainerBlockTable {
    pub containers: Vec<Container>,
    pub codecs: Vec<Codec>,
    pub offsets: Vec<u64>,
    pub compressed: Vec<u64>,
    pub decompressed: Vec<u64>,
}

impl MultiContainerBlockTable {
    pub fn new(
        containers: Vec<Container>,
        codecs: Vec<Codec>,
        offsets: Vec<u64>,
        compressed: Vec<u64>,
        decompressed: Vec<u64>,
    ) -> Self {
        Self {
            containers,
            codecs,
            offsets,
            compressed,
            decompressed,
        }
    }

    /// A table where every block uses the same codec
    pub fn uniform(
        codec: Codec,
        containers: Vec<Container>,
        offsets: Vec<u64>,
        compressed: Vec<u64>,
        decompressed: Vec<u64>,
    ) -> Self {
        let codecs = vec![codec; offsets.len()];
        Self::new(containers, codecs, offsets, compressed, decompressed)
    }

    fn blocks(&self) -> Result<Vec<BlockSpec>> {
        check_lengths(TableLengths {
            offsets: self.offsets.len(),
            compressed: self.compressed.len(),
            decompressed: self.decompressed.len(),
            codecs: Some(self.codecs.len()),
            containers: Some(self.containers.len()),
        })?;

        Ok((0..self.offsets.len())
            .map(|i| BlockSpec {
                container: self.containers[i].clone(),
                codec: self.codecs[i],
                offset: self.offsets[i],
                compressed: self.compressed[i],
                decompressed: self.decompressed[i],
            })
            .collect())
    }
}

/// Exposes `length` bytes starting `skip` bytes into another plan's output
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetWrapper {
    pub inner: Box<Exporter>,
    pub skip: u64,
    /// `None` keeps everything after `skip`
    pub length: Option<u64>,
}

impl SubsetWrapper {
    /// Window into a single nominal block
    pub fn new(
        codec: Codec,
        offset: u64,
        compressed: u64,
        decompressed: u64,
        skip: u64,
        length: u64,
    ) -> Self {
        Self::over(
            FixedBlockTable::single(codec, offset, compressed, decompressed).into(),
            skip,
            Some(length),
        )
    }

    /// Window into any other plan, skipping across its blocks and containers
    pub fn over(inner: Exporter, skip: u64, length: Option<u64>) -> Self {
        Self {
            inner: Box::new(inner),
            skip,
            length,
        }
    }
}

/// Drops a fixed-size prefix from another plan's output
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSkipWrapper {
    pub inner: Box<Exporter>,
    pub skip: u64,
}

impl HeaderSkipWrapper {
    /// Skip the start of a single nominal block
    pub fn new(codec: Codec, offset: u64, compressed: u64, decompressed: u64, skip: u64) -> Self {
        Self::over(
            FixedBlockTable::single(codec, offset, compressed, decompressed).into(),
            skip,
        )
    }

    pub fn over(inner: Exporter, skip: u64) -> Self {
        Self {
            inner: Box::new(inner),
            skip,
        }
    }
}

fn check_lengths(lengths: TableLengths) -> Result<()> {
    if lengths.is_consistent() {
        Ok(())
    } else {
        Err(Error::TableLengthMismatch(lengths))
    }
}

#[derive(Debug, Clone)]
struct BlockSpec {
    container: Container,
    codec: Codec,
    offset: u64,
    compressed: u64,
    decompressed: u64,
}

/// The open, stateful form of a decode plan
#[derive(Debug)]
pub(crate) enum ExportStream {
    Single(BlockDecoder),
    Table(TableStream),
    Window(Box<WindowStream>),
}

impl ExportStream {
    pub(crate) fn available(&mut self) -> Result<bool> {
        match self {
            ExportStream::Single(d) => Ok(d.available()),
            ExportStream::Table(t) => t.advance(),
            ExportStream::Window(w) => w.available(),
        }
    }

    pub(crate) fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            ExportStream::Single(d) => d.read_bytes(buf),
            ExportStream::Table(t) => t.read_bytes(buf),
            ExportStream::Window(w) => w.read_bytes(buf),
        }
    }

    pub(crate) fn close(&mut self) {
        match self {
            ExportStream::Single(d) => d.close(),
            ExportStream::Table(t) => t.close(),
            ExportStream::Window(w) => w.inner.close(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TableStream {
    blocks: Vec<BlockSpec>,
    next: usize,
    current: Option<BlockDecoder>,
    done: bool,
}

impl TableStream {
    fn open(blocks: Vec<BlockSpec>) -> Result<Self> {
        for block in &blocks {
            block.container.check_range(block.offset, block.compressed)?;
        }

        Ok(Self {
            blocks,
            next: 0,
            current: None,
            done: false,
        })
    }

    /// Make sure the current block has bytes left, opening later blocks as needed
    fn advance(&mut self) -> Result<bool> {
        loop {
            if self.done {
                return Ok(false);
            }

            if let Some(current) = self.current.as_mut() {
                if current.available() {
                    return Ok(true);
                }
                current.close();
                self.current = None;
            }

            let Some(block) = self.blocks.get(self.next) else {
                trace!(blocks = self.blocks.len(), "block table exhausted");
                self.done = true;
                return Ok(false);
            };
            let index = self.next;
            self.next += 1;

            if block.decompressed == 0 {
                trace!(index, "skipping empty block");
                continue;
            }

            trace!(index, offset = block.offset, codec = block.codec.name(), "opening block");
            self.current = Some(block.codec.open(
                &block.container,
                block.offset,
                block.compressed,
                block.decompressed,
            )?);
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || !self.advance()? {
            return Ok(0);
        }

        match self.current.as_mut() {
            Some(current) => current.read_bytes(buf),
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.close();
        }
        self.done = true;
    }
}

#[derive(Debug)]
pub(crate) struct WindowStream {
    inner: ExportStream,
    skip: u64,
    limit: Option<u64>,
    emitted: u64,
}

impl WindowStream {
    fn new(inner: ExportStream, skip: u64, limit: Option<u64>) -> Self {
        Self {
            inner,
            skip,
            limit,
            emitted: 0,
        }
    }

    /// Read and drop the prefix, crossing block boundaries as needed
    fn discard(&mut self) -> Result<()> {
        let mut scratch = [0u8; 4096];
        while self.skip > 0 {
            let want = (scratch.len() as u64).min(self.skip) as usize;
            match self.inner.read_bytes(&mut scratch[..want])? {
                0 => break,
                n => self.skip -= n as u64,
            }
        }
        Ok(())
    }

    fn room(&self) -> u64 {
        self.limit
            .map_or(u64::MAX, |limit| limit.saturating_sub(self.emitted))
    }

    fn available(&mut self) -> Result<bool> {
        self.discard()?;
        if self.room() == 0 {
            return Ok(false);
        }
        self.inner.available()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.available()? {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(self.room()) as usize;
        let read = self.inner.read_bytes(&mut buf[..want])?;
        self.emitted += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::codec::Codec;
    use crate::container::Container;
    use crate::error::{Error, Result};
    use crate::exporter::{
        Exporter, FixedBlockTable, HeaderSkipWrapper, MultiContainerBlockTable, SubsetWrapper,
        VariableBlockTable,
    };

    #[test]
    fn huge_declared_lengths_saturate() {
        let table: Exporter = FixedBlockTable::new(
            Codec::Zlib,
            vec![0, 0],
            vec![4, 4],
            vec![u64::MAX, 10],
        )
        .into();
        assert_eq!(table.decompressed_len(), u64::MAX);

        let window: Exporter = SubsetWrapper::over(table, 5, None).into();
        assert_eq!(window.decompressed_len(), u64::MAX - 5);
    }

    fn drain(exporter: &Exporter, container: &Container) -> Result<Vec<u8>> {
        let mut stream = exporter.open(container)?;
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            match stream.read_bytes(&mut buf)? {
                0 => break,
                n => out.extend_from_slice(&buf[..n]),
            }
        }
        Ok(out)
    }

    fn alphabet() -> Container {
        Container::from_bytes("alphabet", b"abcdefghijklmnopqrstuvwxyz".to_vec())
    }

    #[test]
    fn stored_blocks_in_table_order() -> Result<()> {
        let exporter: Exporter =
            FixedBlockTable::new(Codec::Stored, vec![20, 0, 10], vec![3, 2, 4], vec![3, 2, 4])
                .into();
        assert_eq!(exporter.decompressed_len(), 9);
        assert_eq!(drain(&exporter, &alphabet())?, b"uvwabklmn");
        Ok(())
    }

    #[test]
    fn zero_length_blocks_are_skipped() -> Result<()> {
        let with_empty: Exporter = VariableBlockTable::new(
            vec![Codec::Stored, Codec::Zlib, Codec::Stored, Codec::Stored],
            vec![0, 3, 5, 9],
            vec![3, 16, 0, 2],
            vec![3, 0, 0, 2],
        )
        .into();
        let without: Exporter =
            FixedBlockTable::new(Codec::Stored, vec![0, 9], vec![3, 2], vec![3, 2]).into();

        let container = alphabet();
        assert_eq!(drain(&with_empty, &container)?, drain(&without, &container)?);
        Ok(())
    }

    #[test]
    fn mismatched_table_fails_on_open() {
        let exporter: Exporter =
            FixedBlockTable::new(Codec::Zlib, vec![0, 5], vec![5], vec![10, 10]).into();
        let result = exporter.open(&alphabet());
        assert!(matches!(
            result,
            Err(Error::TableLengthMismatch(lengths)) if lengths.offsets == 2 && lengths.compressed == 1
        ));

        let exporter: Exporter = MultiContainerBlockTable::uniform(
            Codec::Stored,
            vec![alphabet()],
            vec![0, 5],
            vec![1, 1],
            vec![1, 1],
        )
        .into();
        assert!(matches!(
            exporter.validate(&alphabet()),
            Err(Error::TableLengthMismatch(_))
        ));
    }

    #[test]
    fn out_of_bounds_block_fails_before_reading() {
        let exporter: Exporter =
            FixedBlockTable::new(Codec::Stored, vec![0, 25], vec![4, 4], vec![4, 4]).into();
        assert!(matches!(exporter.open(&alphabet()), Err(Error::Bounds { .. })));
    }

    #[test]
    fn containers_switch_invisibly() -> Result<()> {
        let bank = Container::from_bytes("bank", b"0123456789".to_vec());
        let stream = Container::from_bytes("stream", b"ABCDEFGHIJ".to_vec());

        let exporter: Exporter = MultiContainerBlockTable::uniform(
            Codec::Stored,
            vec![bank.clone(), stream.clone(), bank.clone(), stream.clone()],
            vec![0, 0, 4, 4],
            vec![4, 4, 4, 4],
            vec![4, 4, 4, 4],
        )
        .into();

        let joined = Container::from_bytes("joined", b"0123ABCD4567EFGH".to_vec());
        let flat: Exporter =
            FixedBlockTable::new(Codec::Stored, vec![0, 4, 8, 12], vec![4; 4], vec![4; 4]).into();

        assert_eq!(drain(&exporter, &alphabet())?, drain(&flat, &joined)?);
        Ok(())
    }

    #[test]
    fn subset_window_matches_slice() -> Result<()> {
        let container = alphabet();
        let inner: Exporter =
            FixedBlockTable::new(Codec::Stored, vec![0, 10, 20], vec![10, 10, 6], vec![10, 10, 6])
                .into();
        let full = drain(&inner, &container)?;

        for skip in 0..full.len() as u64 {
            for length in 0..=(full.len() as u64 - skip) {
                let subset: Exporter = SubsetWrapper::over(inner.clone(), skip, Some(length)).into();
                let expected = &full[skip as usize..(skip + length) as usize];
                assert_eq!(drain(&subset, &container)?, expected);
                assert_eq!(subset.decompressed_len(), length);
            }
        }
        Ok(())
    }

    #[test]
    fn header_skip_over_single_block() -> Result<()> {
        let exporter: Exporter = HeaderSkipWrapper::new(Codec::Stored, 2, 20, 20, 16).into();
        assert_eq!(exporter.decompressed_len(), 4);
        assert_eq!(drain(&exporter, &alphabet())?, b"stuv");
        Ok(())
    }

    #[test]
    fn skip_past_everything_yields_nothing() -> Result<()> {
        let exporter: Exporter = SubsetWrapper::new(Codec::Stored, 0, 4, 4, 10, 2).into();
        assert_eq!(exporter.decompressed_len(), 0);
        assert_eq!(drain(&exporter, &alphabet())?, b"");
        Ok(())
    }

    #[test]
    fn nested_windows() -> Result<()> {
        let inner: Exporter = HeaderSkipWrapper::new(Codec::Stored, 0, 26, 26, 4).into();
        let outer: Exporter = SubsetWrapper::over(inner, 3, Some(5)).into();
        assert_eq!(drain(&outer, &alphabet())?, b"hijkl");
        Ok(())
    }
}
