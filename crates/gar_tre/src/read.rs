//! Types for reading TRE archives
//!

use binrw::BinRead;
use gar_core::{
    drain_to_vec, strategy::first_success, Container, Resource, ResourceIndex,
};
use indexmap::IndexMap;
use std::{io::Cursor, path::Path};
use tracing::{debug, instrument, warn};

use crate::{
    compression::CompressionMethod,
    error::{Error, FileNotFoundError, Result},
    types::{TreHeader, TreRecord, TreVersion, HASH_SIZE},
};

/// An entry whose record could not be turned into a resource
#[derive(Debug)]
pub struct RejectedEntry {
    pub name: String,
    pub error: gar_core::error::Error,
}

/// TRE archive reader
///
/// Opening an archive only reads its directory. Every entry becomes a [`Resource`] that any
/// consumer decodes through [`gar_core::drain`] or [`Resource::effective_decoder`].
///
/// ```no_run
/// fn list_tre_contents(path: &str) -> gar_tre::error::Result<()> {
///     let tre = gar_tre::TreArchive::open(path)?;
///
///     for resource in tre.resources() {
///         println!("Filename: {}", resource.name());
///         gar_core::drain(resource, &mut std::io::stdout())?;
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TreArchive {
    container: Container,
    header: TreHeader,
    resources: IndexMap<Box<str>, Resource>,
    rejected: Vec<RejectedEntry>,
}

impl TreArchive {
    /// Map a TRE archive from disk and collect the files it contains
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open(path: impl AsRef<Path>) -> Result<TreArchive> {
        Self::from_container(Container::open(path)?)
    }

    /// Read a TRE archive from an already opened container
    #[instrument(skip_all, fields(container = %container.name()), err)]
    pub fn from_container(container: Container) -> Result<TreArchive> {
        let header = read_header(&container)?;
        let Directory {
            resources,
            rejected,
        } = read_resources(&container, &header)?;
        debug!(
            version = %header.version,
            records = header.records,
            files = resources.len(),
            rejected = rejected.len(),
            "read archive directory"
        );

        Ok(TreArchive {
            container,
            header,
            resources,
            rejected,
        })
    }

    /// The container backing every resource of this archive
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn version(&self) -> TreVersion {
        self.header.version
    }

    /// Number of entries contained in this TRE.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether this TRE archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of the files in the archive once decompressed, if it fits
    pub fn decompressed_size(&self) -> Option<u128> {
        self.resources.values().try_fold(0u128, |total, resource| {
            total.checked_add(resource.decompressed_length() as u128)
        })
    }

    /// Returns an iterator over all the file names in this archive.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(|s| s.as_ref())
    }

    /// Every file in directory order
    pub fn resources(&self) -> impl ExactSizeIterator<Item = &Resource> {
        self.resources.values()
    }

    /// Entries left out of [`TreArchive::resources`] because their record cannot be decoded
    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }

    /// Returns how the record block was compressed.
    pub fn get_record_compression(&self) -> CompressionMethod {
        self.header.record_compression
    }

    /// Returns how the name block was compressed.
    pub fn get_name_compression(&self) -> CompressionMethod {
        self.header.name_compression
    }

    /// Get the index of a file entry by name, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.resources.get_index_of(name)
    }

    /// Get the name of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.resources
            .get_index(index)
            .map(|(name, _)| name.as_ref())
    }

    /// Search for a file entry by name
    pub fn by_name(&self, name: &str) -> Result<&Resource> {
        self.resources
            .get(name)
            .ok_or_else(|| FileNotFoundError::Name(name.to_owned()).into())
    }

    /// Get a contained file by index
    pub fn by_index(&self, index: usize) -> Result<&Resource> {
        self.resources
            .get_index(index)
            .map(|(_, resource)| resource)
            .ok_or(FileNotFoundError::Index(index).into())
    }

    /// Hand the resources over, keeping directory order
    pub fn into_resources(self) -> Vec<Resource> {
        self.resources.into_values().collect()
    }
}

fn read_header(container: &Container) -> Result<TreHeader> {
    first_success(TreVersion::CANDIDATES, |version| {
        TreHeader::read_args(&mut container.cursor(), (*version,)).map_err(|e| {
            gar_core::error::Error::Decode {
                container: container.name().to_owned(),
                offset: 0,
                reason: e.to_string(),
            }
        })
    })
    .map_err(|e| {
        debug!(%e, "no supported header found");
        Error::InvalidArchive
    })
}

/// A directory block, decoded through the same machinery as the files themselves
fn directory_block(
    container: &Container,
    name: &str,
    offset: u64,
    compressed: u64,
    uncompressed: u64,
    compression: CompressionMethod,
) -> Resource {
    Resource::new(container.clone(), name, offset, compressed, uncompressed)
        .with_codec(compression.codec())
}

fn read_records(container: &Container, header: &TreHeader) -> Result<Vec<TreRecord>> {
    let block = directory_block(
        container,
        "<records>",
        header.record_start as u64,
        header.record_compressed as u64,
        header.record_uncompressed(),
        header.record_compression,
    );

    let mut reader = Cursor::new(drain_to_vec(&block)?);
    (0..header.records)
        .map(|_| TreRecord::read(&mut reader).map_err(Error::from))
        .collect()
}

fn read_names(container: &Container, header: &TreHeader) -> Result<Vec<u8>> {
    let block = directory_block(
        container,
        "<names>",
        header.name_start(),
        header.name_compressed as u64,
        header.name_uncompressed as u64,
        header.name_compression,
    );
    Ok(drain_to_vec(&block)?)
}

fn name_at(names: &[u8], offset: u32) -> Result<String> {
    let tail = names.get(offset as usize..).ok_or_else(|| {
        Error::CustomError(format!(
            "name offset {offset} is outside the {} byte name block",
            names.len()
        ))
    })?;
    let raw = tail.split(|b| *b == b'\0').next().unwrap_or_default();
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// The md5 of every file's stored bytes, when the archive carries a hash block
fn read_hashes<'a>(container: &'a Container, header: &TreHeader) -> Option<&'a [u8]> {
    let length = header.records as u64 * HASH_SIZE as u64;
    match container.slice(header.hash_start(), length) {
        Ok(hashes) => Some(hashes),
        Err(e) => {
            debug!(%e, "archive has no hash block");
            None
        }
    }
}

#[derive(Default)]
struct Directory {
    resources: IndexMap<Box<str>, Resource>,
    rejected: Vec<RejectedEntry>,
}

fn read_resources(container: &Container, header: &TreHeader) -> Result<Directory> {
    if header.records == 0 {
        return Ok(Directory::default());
    }

    let records = read_records(container, header)?;

    let mut index = ResourceIndex::with_capacity(records.len());
    let mut unknown = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mut resource = Resource::new(
            container.clone(),
            format!("#{i}"),
            record.data_offset as u64,
            record.data_compressed as u64,
            record.data_uncompressed as u64,
        );
        match record.compression() {
            Ok(method) => resource.set_codec(method.codec()),
            Err(e) => unknown.push((i, e)),
        }
        resource.add_property("crc32", format!("{:08x}", record.checksum));
        index.insert(i, resource);
    }

    let names = read_names(container, header)?;
    for (i, record) in records.iter().enumerate() {
        let name = name_at(&names, record.name_offset)?;
        index.resolve(&i, |resource| {
            resource.set_name(name);
            Ok(())
        })?;
    }

    if let Some(hashes) = read_hashes(container, header) {
        for (i, hash) in hashes.chunks_exact(HASH_SIZE as usize).enumerate() {
            index.resolve(&i, |resource| {
                resource.add_property("md5", hex::encode(hash));
                Ok(())
            })?;
        }
    }

    let mut directory = Directory::default();
    for (i, resource) in index.into_resources().into_iter().enumerate() {
        if let Some(pos) = unknown.iter().position(|(at, _)| *at == i) {
            let (_, error) = unknown.swap_remove(pos);
            warn!(name = resource.name(), %error, "skipping entry");
            directory.rejected.push(RejectedEntry {
                name: resource.name().to_owned(),
                error,
            });
            continue;
        }
        if let Err(e) = resource.validate() {
            warn!(name = resource.name(), %e, "entry will not extract");
        }
        let name: Box<str> = resource.name().into();
        if directory.resources.insert(name, resource).is_some() {
            warn!("duplicate entry name, keeping the last one");
        }
    }
    Ok(directory)
}
