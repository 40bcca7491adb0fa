
//! The decoded contents of an image section:
//! either a thumbnail or the raw sensor planes.

use smallvec::SmallVec;

use crate::error::{Error, Result};


/// The combined type and format tag of an image section, `type << 16 | format`.
/// Decides which codec decodes the section payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {

    /// An uncompressed 3x8 bit rgb pixmap.
    ThumbPlain,

    /// A huffman compressed 3x8 bit rgb thumbnail.
    ThumbHuffman,

    /// An embedded jpeg byte stream.
    ThumbJpeg,

    /// Huffman compressed raw data of the x530 generation,
    /// with an 8 bit symbol space and a value mapping table.
    RawHuffmanX530,

    /// Huffman compressed 10 bit raw data with a value mapping table.
    RawHuffman10Bit,

    /// True codec raw data of the sd15 generation.
    RawTrue,

    /// True codec raw data of the merrill generation.
    RawMerrill,

    /// True codec raw data of the quattro generation,
    /// with per-plane dimensions.
    RawQuattro,

    /// A type/format combination this crate does not know.
    /// The payload is kept as opaque bytes.
    Unknown,
}

impl ImageKind {

    /// Classify a `type << 16 | format` tag.
    pub fn from_type_format(type_format: u32) -> Self {
        match type_format {
            0x0002_0003 => ImageKind::ThumbPlain,
            0x0002_000b => ImageKind::ThumbHuffman,
            0x0002_0012 => ImageKind::ThumbJpeg,
            0x0003_0005 => ImageKind::RawHuffmanX530,
            0x0003_0006 => ImageKind::RawHuffman10Bit,
            0x0003_001e => ImageKind::RawTrue,
            0x0001_001e => ImageKind::RawMerrill,
            0x0001_0023 => ImageKind::RawQuattro,
            _ => ImageKind::Unknown,
        }
    }

    /// Whether this section carries raw sensor data.
    pub fn is_raw(self) -> bool {
        matches!(
            self,
            ImageKind::RawHuffmanX530 | ImageKind::RawHuffman10Bit
                | ImageKind::RawTrue | ImageKind::RawMerrill | ImageKind::RawQuattro
        )
    }

    /// Whether this section carries a preview image.
    pub fn is_thumbnail(self) -> bool {
        matches!(self, ImageKind::ThumbPlain | ImageKind::ThumbHuffman | ImageKind::ThumbJpeg)
    }

    /// Whether the true codec decodes this section.
    pub(crate) fn uses_true_codec(self) -> bool {
        matches!(self, ImageKind::RawTrue | ImageKind::RawMerrill | ImageKind::RawQuattro)
    }
}


/// One decoded color plane of a raw image.
/// The three planes of a quattro image differ in resolution,
/// therefore every plane knows its own dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {

    /// Width of this plane in samples.
    pub columns: u32,

    /// Height of this plane in samples.
    pub rows: u32,

    /// Row-major samples, `columns * rows` of them.
    pub samples: Vec<u16>,
}

impl Plane {

    /// A borrowed typed view of this plane.
    pub fn view(&self) -> PlaneView<'_> {
        PlaneView {
            width: self.columns as usize,
            height: self.rows as usize,
            stride: self.columns as usize,
            element_width: 2,
            samples: Samples::Bits16(&self.samples),
        }
    }
}


/// The sample storage of a decoded image.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {

    /// Interleaved 3x8 bit rgb rows.
    /// The stride is in bytes and may exceed `3 * columns`
    /// for uncompressed pixmaps with padded rows.
    Rgb8 {

        /// Bytes per row.
        row_stride: usize,

        /// `row_stride * rows` bytes.
        bytes: Vec<u8>,
    },

    /// Interleaved 3x16 bit samples, three per pixel, no padding.
    Rgb16 {

        /// `3 * columns * rows` samples.
        samples: Vec<u16>,
    },

    /// Independently decoded sensor planes of the true codec.
    Planes(SmallVec<[Plane; 3]>),

    /// An embedded jpeg file, not decoded by this crate.
    Jpeg(Vec<u8>),

    /// The raw payload of an unrecognized image kind.
    Opaque(Vec<u8>),
}


/// Borrowed typed samples.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'s> {

    /// One byte per sample.
    Bits8(&'s [u8]),

    /// Two bytes per sample.
    Bits16(&'s [u16]),
}

/// A borrowed view of one decoded plane:
/// dimensions, stride, element width and the samples themselves.
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'s> {

    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Samples (not bytes) per row, including any interleaving or padding.
    pub stride: usize,

    /// Bytes per sample, 1 or 2.
    pub element_width: usize,

    /// The sample storage.
    pub samples: Samples<'s>,
}


/// A fully decoded image section.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSection {

    /// Which codec produced this image.
    pub kind: ImageKind,

    /// The raw `type << 16 | format` tag from the section header.
    pub type_format: u32,

    /// Width in pixels, before rotation.
    pub columns: u32,

    /// Height in pixels, before rotation.
    pub rows: u32,

    /// Bytes per row as declared by the section header.
    /// Zero for compressed formats.
    pub row_stride: u32,

    /// The decoded samples.
    pub pixels: PixelData,
}

impl ImageSection {

    /// A view of the interleaved rgb samples,
    /// or `None` for plane-separated, jpeg and opaque data.
    pub fn interleaved(&self) -> Option<PlaneView<'_>> {
        match &self.pixels {
            PixelData::Rgb8 { row_stride, bytes } => Some(PlaneView {
                width: self.columns as usize,
                height: self.rows as usize,
                stride: *row_stride,
                element_width: 1,
                samples: Samples::Bits8(bytes),
            }),

            PixelData::Rgb16 { samples } => Some(PlaneView {
                width: self.columns as usize,
                height: self.rows as usize,
                stride: 3 * self.columns as usize,
                element_width: 2,
                samples: Samples::Bits16(samples),
            }),

            _ => None,
        }
    }

    /// The independently decoded planes of a true-codec image.
    /// Empty for all other image kinds.
    pub fn planes(&self) -> &[Plane] {
        match &self.pixels {
            PixelData::Planes(planes) => planes,
            _ => &[],
        }
    }

    /// The embedded jpeg byte stream, if this section contains one.
    pub fn jpeg(&self) -> Option<&[u8]> {
        match &self.pixels {
            PixelData::Jpeg(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The raw payload of an image kind this crate cannot decode.
    pub fn opaque(&self) -> Result<&[u8]> {
        match &self.pixels {
            PixelData::Opaque(bytes) => Ok(bytes),
            _ => Err(Error::section("image section is not opaque")),
        }
    }
}
