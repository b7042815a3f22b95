//! The descriptor of one extractable logical file.

use indexmap::IndexMap;
use tracing::{instrument, warn};

use crate::codec::Codec;
use crate::container::Container;
use crate::driver::ResourceReader;
use crate::error::{Error, Result};
use crate::exporter::{ExportStream, Exporter};

/// What decodes a resource when it is not simply stored
#[derive(Debug, Clone, PartialEq)]
pub enum DecodePlan {
    /// One codec over the resource's own `offset`/`length` range
    Codec(Codec),

    /// A composed plan whose own offsets are authoritative
    Exporter(Exporter),
}

/// One extractable logical file inside a container
///
/// Plugins create resources while scanning a container's directory and may keep adjusting them
/// until the scan is finished. Consumers only read them, and every consumer decodes through
/// [`Resource::effective_decoder`] regardless of how the bytes are laid out.
///
/// ```
/// use gar_core::{drain_to_vec, Container, Resource};
///
/// let container = Container::from_bytes("archive", b"....Hello, World!....".to_vec());
/// let resource = Resource::new(container, "hello.txt", 4, 13, 13);
///
/// assert!(resource.is_stored());
/// assert_eq!(drain_to_vec(&resource).unwrap(), b"Hello, World!");
/// ```
#[derive(Debug, Clone)]
pub struct Resource {
    container: Container,
    name: String,
    offset: u64,
    length: u64,
    decompressed_length: u64,
    decoder: Option<DecodePlan>,
    properties: IndexMap<String, String>,
}

/// Accessors
impl Resource {
    /// The container holding this resource's bytes
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The display and output name
    ///
    /// # Warnings
    ///
    /// The name comes straight from the archive. It may be an absolute path or contain `..`
    /// components, so it must be sanitised before it is used as an output path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start of the resource in its container
    ///
    /// When an [`Exporter`] is attached this is only the nominal start.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in the container
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Size once decoded
    pub fn decompressed_length(&self) -> u64 {
        self.decompressed_length
    }

    /// The attached decode plan, if any
    pub fn decoder(&self) -> Option<&DecodePlan> {
        self.decoder.as_ref()
    }

    /// Whether the bytes are copied as they are
    pub fn is_stored(&self) -> bool {
        self.length == self.decompressed_length
            && matches!(self.decoder, None | Some(DecodePlan::Codec(_)))
    }

    /// Look up a format specific property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Construction and mutation, only valid while no decode is in flight
impl Resource {
    pub fn new(
        container: Container,
        name: impl Into<String>,
        offset: u64,
        length: u64,
        decompressed_length: u64,
    ) -> Self {
        Self {
            container,
            name: name.into(),
            offset,
            length,
            decompressed_length,
            decoder: None,
            properties: IndexMap::new(),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn set_length(&mut self, length: u64) {
        self.length = length;
    }

    pub fn set_decompressed_length(&mut self, decompressed_length: u64) {
        self.decompressed_length = decompressed_length;
    }

    /// Decode the resource's own range with a single codec, replacing any previous plan
    pub fn set_codec(&mut self, codec: Codec) {
        self.decoder = Some(DecodePlan::Codec(codec));
    }

    /// Decode through a composed plan, replacing any previous plan
    pub fn set_exporter(&mut self, exporter: impl Into<Exporter>) {
        self.decoder = Some(DecodePlan::Exporter(exporter.into()));
    }

    pub fn clear_decoder(&mut self) {
        self.decoder = None;
    }

    /// Attach a format specific property, replacing an existing value
    pub fn add_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.properties.insert(key.into(), value.to_string());
    }

    /// Builder style [`Resource::set_codec`]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.set_codec(codec);
        self
    }

    /// Builder style [`Resource::set_exporter`]
    pub fn with_exporter(mut self, exporter: impl Into<Exporter>) -> Self {
        self.set_exporter(exporter);
        self
    }
}

/// Decoding
impl Resource {
    /// Check bounds and plan consistency without decoding anything
    pub fn validate(&self) -> Result<()> {
        match &self.decoder {
            None | Some(DecodePlan::Codec(Codec::Stored)) => {
                self.check_stored()?;
                self.container.check_range(self.offset, self.length)
            }
            Some(DecodePlan::Codec(_)) => self.container.check_range(self.offset, self.length),
            Some(DecodePlan::Exporter(exporter)) => {
                exporter.validate(&self.container)?;
                let planned = exporter.decompressed_len();
                if planned != self.decompressed_length {
                    warn!(
                        name = %self.name,
                        planned,
                        declared = self.decompressed_length,
                        "decode plan length differs from the declared length"
                    );
                }
                Ok(())
            }
        }
    }

    /// Open a fresh decode stream for this resource
    ///
    /// This is the single dispatch point for consumers: stored ranges, single codecs and every
    /// [`Exporter`] variant are all read through the returned [`ResourceReader`]. Each call
    /// returns independent state.
    #[instrument(level = "debug", skip(self), fields(name = %self.name), err)]
    pub fn effective_decoder(&self) -> Result<ResourceReader> {
        let stream = match &self.decoder {
            None => {
                self.check_stored()?;
                ExportStream::Single(Codec::Stored.open(
                    &self.container,
                    self.offset,
                    self.length,
                    self.decompressed_length,
                )?)
            }
            Some(DecodePlan::Codec(codec)) => ExportStream::Single(codec.open(
                &self.container,
                self.offset,
                self.length,
                self.decompressed_length,
            )?),
            Some(DecodePlan::Exporter(exporter)) => exporter.open(&self.container)?,
        };

        Ok(ResourceReader::new(
            self.name.as_str(),
            stream,
            self.decompressed_length,
        ))
    }

    fn check_stored(&self) -> Result<()> {
        if self.length == self.decompressed_length {
            return Ok(());
        }
        Err(Error::MissingDecoder {
            name: self.name.clone(),
            compressed: self.length,
            decompressed: self.decompressed_length,
        })
    }
}
