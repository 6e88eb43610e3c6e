//! Validated debug images.

use std::fmt;

use crashsym_protocol::RawImage;

use super::{Address, Architecture};

/// Container formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType
{
    /// Legacy Apple image records.
    Apple,
    /// Legacy generic image records.
    Symbolic,
    Elf,
    MachO,
    Pe,
}

impl ImageType
{
    pub fn from_name(name: &str) -> Option<Self>
    {
        match name {
            "apple" => Some(ImageType::Apple),
            "symbolic" => Some(ImageType::Symbolic),
            "elf" => Some(ImageType::Elf),
            "macho" => Some(ImageType::MachO),
            "pe" => Some(ImageType::Pe),
            _ => None,
        }
    }
}

impl fmt::Display for ImageType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            ImageType::Apple => "apple",
            ImageType::Symbolic => "symbolic",
            ImageType::Elf => "elf",
            ImageType::MachO => "macho",
            ImageType::Pe => "pe",
        };
        write!(f, "{label}")
    }
}

/// A loaded binary that passed validation
///
/// Covers the address range `[start, start + size)`. Built only through
/// [`DebugImage::from_raw`], which enforces `size > 0` and a non-empty debug
/// identifier. The original record is kept for forwarding to services.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugImage
{
    index: usize,
    ty: ImageType,
    start: Address,
    size: u64,
    arch_name: Option<String>,
    architecture: Architecture,
    code_file: Option<String>,
    debug_id: String,
    raw: RawImage,
}

impl DebugImage
{
    /// Validate a raw image record.
    ///
    /// `index` is the position of the record among the images accepted for
    /// the event; completion records from the symbolication service are
    /// matched back by this position.
    pub fn from_raw(index: usize, raw: &RawImage) -> Option<Self>
    {
        if !is_valid_image(raw) {
            return None;
        }

        let ty = ImageType::from_name(raw.ty.as_deref()?)?;
        let start = Address::from(raw.image_addr?);
        let size = raw.image_size?;
        let debug_id = raw.any_identifier()?.to_string();

        Some(Self {
            index,
            ty,
            start,
            size,
            arch_name: raw.arch.clone(),
            architecture: Architecture::from_optional_name(raw.arch.as_deref()),
            code_file: raw.code_file_or_name().map(str::to_string),
            debug_id,
            raw: raw.clone(),
        })
    }

    pub fn index(&self) -> usize
    {
        self.index
    }

    pub fn image_type(&self) -> ImageType
    {
        self.ty
    }

    pub fn start(&self) -> Address
    {
        self.start
    }

    pub fn size(&self) -> u64
    {
        self.size
    }

    /// Exclusive end of the image, saturating at the top of the address space.
    pub fn end(&self) -> Address
    {
        Address::new(self.start.value().saturating_add(self.size))
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end()
    }

    /// Image-relative address, `None` if `address` lies below the image.
    pub fn rebase(&self, address: Address) -> Option<u64>
    {
        address.offset_from(self.start)
    }

    /// CPU name exactly as the image record states it.
    pub fn arch_name(&self) -> Option<&str>
    {
        self.arch_name.as_deref()
    }

    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    pub fn code_file(&self) -> Option<&str>
    {
        self.code_file.as_deref()
    }

    pub fn debug_id(&self) -> &str
    {
        &self.debug_id
    }

    pub fn raw(&self) -> &RawImage
    {
        &self.raw
    }
}

/// Validity predicate for image records.
///
/// An image is usable when it is non-empty, of a supported container type,
/// has a base address, a non-zero size, and at least one identifier among
/// `debug_id`, `id`, and `uuid`.
pub fn is_valid_image(raw: &RawImage) -> bool
{
    !raw.is_empty()
        && raw.ty.as_deref().and_then(ImageType::from_name).is_some()
        && raw.image_addr.is_some()
        && raw.image_size.is_some_and(|size| size > 0)
        && raw.any_identifier().is_some_and(|id| !id.is_empty())
}
