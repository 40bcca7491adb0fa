
//! The main entry point for reading an x3f file:
//! opens the container, walks the directory,
//! and decodes individual sections on demand.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::camf::{self, Camf};
use crate::compression::{classic, tru};
use crate::error::{Error, Result};
use crate::image::{ImageKind, ImageSection, PixelData};
use crate::io::{Data, Tracking};
use crate::meta::property::PropertyList;
use crate::meta::{Directory, DirectoryEntry, FileHeader, ImageInfo, SectionInfo};


/// Refers to one section of an opened file.
/// Obtained from the find methods of `X3fFile`,
/// and passed back to `X3fFile::load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHandle(pub(crate) usize);

/// The directory entry and the typed section header of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDescriptor {

    /// The directory entry that points to this section.
    pub entry: DirectoryEntry,

    /// The fixed section header, read when the file was opened.
    pub info: SectionInfo,
}

/// The decoded payload of one section.
#[derive(Debug, Clone)]
pub enum SectionData {

    /// A decoded property list.
    Properties(PropertyList),

    /// A decoded thumbnail or raw image.
    Image(ImageSection),

    /// A decrypted camf entry list.
    Camf(Camf),
}

/// One section of the file, with its lazily decoded payload.
#[derive(Debug)]
struct Section {
    descriptor: SectionDescriptor,
    payload_offset: u64,
    payload_length: u64,
    data: Option<SectionData>,
}


/// An opened x3f file.
///
/// Owns the underlying reader for its whole lifetime.
/// Decoded sections are cached inside this object:
/// loading the same section twice decodes only once
/// and returns the identical buffer.
///
/// Not safe for concurrent mutation. Two files over two readers
/// are fully independent.
#[derive(Debug)]
pub struct X3fFile<R> {
    reader: Tracking<R>,
    header: FileHeader,
    directory_version: u32,
    sections: Vec<Section>,

    /// Set after any decode error. Already loaded sections
    /// stay readable, further loads are refused.
    poisoned: bool,
}

impl X3fFile<BufReader<File>> {

    /// Open the file at the path and read its header and directory.
    /// No image or metadata payload is decoded yet.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from_buffered(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> X3fFile<R> {

    /// Read the header and directory from any byte source.
    /// No image or metadata payload is decoded yet.
    pub fn read_from_buffered(reader: R) -> Result<Self> {
        let mut reader = Tracking::new(reader)?;
        let byte_length = reader.byte_length()?;

        reader.seek_to(0)?;
        let header = FileHeader::read(&mut reader)?;
        let directory = Directory::read_from(&mut reader, byte_length)?;

        let mut sections = Vec::with_capacity(directory.entries.len());

        for entry in directory.entries {
            let (info, header_size) = SectionInfo::read_for(&mut reader, &entry)?;

            if u64::from(entry.size) < header_size {
                return Err(Error::section("section smaller than its own header"));
            }

            sections.push(Section {
                payload_offset: u64::from(entry.offset) + header_size,
                payload_length: u64::from(entry.size) - header_size,
                descriptor: SectionDescriptor { entry, info },
                data: None,
            });
        }

        Ok(Self {
            reader, header,
            directory_version: directory.version,
            sections,
            poisoned: false,
        })
    }

    /// The main file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The version word of the directory section.
    pub fn directory_version(&self) -> u32 {
        self.directory_version
    }

    /// All section descriptors with their handles, in directory order.
    pub fn sections(&self) -> impl Iterator<Item = (SectionHandle, &SectionDescriptor)> {
        self.sections.iter().enumerate()
            .map(|(index, section)| (SectionHandle(index), &section.descriptor))
    }

    /// The descriptor of the specified section.
    pub fn descriptor(&self, handle: SectionHandle) -> &SectionDescriptor {
        &self.sections[handle.0].descriptor
    }

    fn find_image(&self, matches: impl Fn(ImageKind) -> bool) -> Option<SectionHandle> {
        self.sections().find_map(|(handle, descriptor)| match &descriptor.info {
            SectionInfo::Image(info) if matches(ImageKind::from_type_format(info.type_format()))
                => Some(handle),
            _ => None,
        })
    }

    /// The first section holding raw sensor data.
    pub fn raw(&self) -> Option<SectionHandle> {
        self.find_image(ImageKind::is_raw)
    }

    /// The first uncompressed preview image.
    pub fn thumb_plain(&self) -> Option<SectionHandle> {
        self.find_image(|kind| kind == ImageKind::ThumbPlain)
    }

    /// The first huffman compressed preview image.
    pub fn thumb_huffman(&self) -> Option<SectionHandle> {
        self.find_image(|kind| kind == ImageKind::ThumbHuffman)
    }

    /// The first embedded jpeg preview.
    pub fn thumb_jpeg(&self) -> Option<SectionHandle> {
        self.find_image(|kind| kind == ImageKind::ThumbJpeg)
    }

    /// The first property list section.
    pub fn prop(&self) -> Option<SectionHandle> {
        self.sections().find_map(|(handle, descriptor)| match descriptor.info {
            SectionInfo::Property(_) => Some(handle),
            _ => None,
        })
    }

    /// The first camf section.
    pub fn camf(&self) -> Option<SectionHandle> {
        self.sections().find_map(|(handle, descriptor)| match descriptor.info {
            SectionInfo::Camf(_) => Some(handle),
            _ => None,
        })
    }

    /// Decode the payload of the specified section,
    /// or return the cached result of an earlier load.
    pub fn load(&mut self, handle: SectionHandle) -> Result<&SectionData> {
        if self.sections[handle.0].data.is_none() {
            if self.poisoned {
                return Err(Error::section("a previous decode failure poisoned this file"));
            }

            match self.decode_section(handle.0) {
                Ok(data) => self.sections[handle.0].data = Some(data),
                Err(error) => {
                    self.poisoned = true;
                    return Err(error);
                },
            }
        }

        Ok(self.sections[handle.0].data.as_ref().expect("just decoded"))
    }

    /// Load a section that must be a property list.
    pub fn load_properties(&mut self, handle: SectionHandle) -> Result<&PropertyList> {
        match self.load(handle)? {
            SectionData::Properties(properties) => Ok(properties),
            _ => Err(Error::section("section is not a property list")),
        }
    }

    /// Load a section that must be an image.
    pub fn load_image(&mut self, handle: SectionHandle) -> Result<&ImageSection> {
        match self.load(handle)? {
            SectionData::Image(image) => Ok(image),
            _ => Err(Error::section("section is not an image")),
        }
    }

    /// Load a section that must be camf metadata.
    pub fn load_camf(&mut self, handle: SectionHandle) -> Result<&Camf> {
        match self.load(handle)? {
            SectionData::Camf(camf) => Ok(camf),
            _ => Err(Error::section("section is not camf metadata")),
        }
    }

    fn decode_section(&mut self, index: usize) -> Result<SectionData> {
        let section = &self.sections[index];
        let info = section.descriptor.info.clone();
        let payload_length = section.payload_length as usize;

        self.reader.seek_to(section.payload_offset)?;
        let payload = u8::read_vec(
            &mut self.reader, payload_length,
            payload_length, "section payload",
        )?;

        match info {
            SectionInfo::Property(info) =>
                PropertyList::parse(&info, &payload).map(SectionData::Properties),

            SectionInfo::Image(info) =>
                decode_image(&info, payload).map(SectionData::Image),

            SectionInfo::Camf(info) =>
                camf::decode(info.camf_type, info.parameters, &payload).map(SectionData::Camf),

            SectionInfo::Unknown =>
                Err(Error::section("cannot decode a section with an unknown directory tag")),
        }
    }
}


/// Dispatch an image payload to the codec its type/format tag selects.
fn decode_image(info: &ImageInfo, payload: Vec<u8>) -> Result<ImageSection> {
    let kind = ImageKind::from_type_format(info.type_format());

    let pixels = match kind {
        ImageKind::ThumbPlain => {
            let row_stride =
                if info.row_stride != 0 { info.row_stride as usize }
                else { 3 * info.columns as usize };

            let length = row_stride.checked_mul(info.rows as usize)
                .filter(|&length| length <= payload.len())
                .ok_or_else(|| Error::section("pixmap dimensions exceed the section"))?;

            let mut bytes = payload;
            bytes.truncate(length);
            PixelData::Rgb8 { row_stride, bytes }
        },

        ImageKind::ThumbJpeg => PixelData::Jpeg(payload),

        ImageKind::ThumbHuffman | ImageKind::RawHuffmanX530 | ImageKind::RawHuffman10Bit =>
            classic::decode(kind, info.columns, info.rows, &payload)?,

        ImageKind::RawTrue | ImageKind::RawMerrill | ImageKind::RawQuattro =>
            tru::decode(kind, info.columns, info.rows, &payload)?,

        ImageKind::Unknown => {
            log::warn!(
                "unknown image type {} format {}, keeping the payload opaque",
                info.image_type, info.format
            );
            PixelData::Opaque(payload)
        },
    };

    Ok(ImageSection {
        kind,
        type_format: info.type_format(),
        columns: info.columns,
        rows: info.rows,
        row_stride: info.row_stride,
        pixels,
    })
}
