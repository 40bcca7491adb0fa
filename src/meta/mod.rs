
//! Describes the meta data of an x3f file:
//! the main header, the trailing directory,
//! and the per-section headers that the directory points to.

pub mod property;

use smallvec::SmallVec;

use crate::error::{Error, Result, UnitResult};
use crate::io::{Data, Read, Tracking};


/// The four byte identifiers that structure an x3f file.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each x3f file.
    pub const FILE: [u8; 4] = *b"FOVb";

    /// The first four bytes of the directory section.
    pub const DIRECTORY: [u8; 4] = *b"SECd";

    /// The first four bytes of a property list section.
    pub const PROPERTY_SECTION: [u8; 4] = *b"SECp";

    /// The first four bytes of an image data section.
    pub const IMAGE_SECTION: [u8; 4] = *b"SECi";

    /// The first four bytes of a camf section.
    pub const CAMF_SECTION: [u8; 4] = *b"SECc";

    /// Consume four bytes from the reader.
    pub fn read(read: &mut impl Read) -> Result<[u8; 4]> {
        let mut bytes = [0_u8; 4];
        u8::read_slice(read, &mut bytes)?;
        Ok(bytes)
    }

    /// Consume four bytes and validate that this may be an x3f file.
    pub fn validate_file(read: &mut impl Read) -> UnitResult {
        if self::read(read)? == self::FILE { Ok(()) }
        else { Err(Error::header("file identifier is not FOVb")) }
    }
}


/// The file format version, major in the high word, minor in the low word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version(pub u32);

impl Version {

    /// The only major version this crate reads.
    pub const SUPPORTED_MAJOR: u32 = 2;

    /// The highest minor version with a documented layout.
    pub const KNOWN_MINOR: u32 = 3;

    /// The major version number.
    pub fn major(self) -> u32 { self.0 >> 16 }

    /// The minor version number.
    pub fn minor(self) -> u32 { self.0 & 0xffff }

    /// Whether the main header continues with the extended fields
    /// that were added in version 2.1.
    pub fn has_extended_data(self) -> bool {
        self.minor() >= 1
    }

    /// Read the version of the main header and reject unknown major versions.
    pub fn read_validated(read: &mut impl Read) -> Result<Self> {
        let version = Version(u32::read(read)?);

        if version.major() != Self::SUPPORTED_MAJOR {
            return Err(Error::UnsupportedVersion(version.0));
        }

        if version.minor() > Self::KNOWN_MINOR {
            log::debug!(
                "file format version {}.{} is newer than this crate",
                version.major(), version.minor()
            );
        }

        Ok(version)
    }
}


/// A user adjustment recorded in the extended header.
/// The tag values are fixed by the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Exposure,
    Contrast,
    Shadow,
    Highlight,
    Saturation,
    Sharpness,
    Red,
    Green,
    Blue,
    FillLight,
}

impl Adjustment {

    /// Classify an extended data type tag. Zero means the slot is unused.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Adjustment::Exposure),
            2 => Some(Adjustment::Contrast),
            3 => Some(Adjustment::Shadow),
            4 => Some(Adjustment::Highlight),
            5 => Some(Adjustment::Saturation),
            6 => Some(Adjustment::Sharpness),
            7 => Some(Adjustment::Red),
            8 => Some(Adjustment::Green),
            9 => Some(Adjustment::Blue),
            10 => Some(Adjustment::FillLight),
            _ => None,
        }
    }
}


/// The extended main header fields of version 2.1 and later:
/// the white balance label and the in-camera adjustment slots.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedHeader {

    /// The white balance label, for example `Auto`.
    pub white_balance: String,

    /// 32 adjustment type tags, zero for unused slots.
    pub adjustment_tags: [u8; 32],

    /// 32 adjustment values, parallel to the tags.
    pub adjustment_values: [f32; 32],
}

impl ExtendedHeader {

    fn read(read: &mut impl Read) -> Result<Self> {
        let mut label = [0_u8; 32];
        u8::read_slice(read, &mut label)?;

        let terminator = label.iter().position(|&byte| byte == 0).unwrap_or(label.len());
        let white_balance = String::from_utf8_lossy(&label[.. terminator]).into_owned();

        let mut adjustment_tags = [0_u8; 32];
        u8::read_slice(read, &mut adjustment_tags)?;

        let mut adjustment_values = [0_f32; 32];
        f32::read_slice(read, &mut adjustment_values)?;

        Ok(Self { white_balance, adjustment_tags, adjustment_values })
    }

    /// The used adjustment slots, with their tags classified.
    pub fn adjustments(&self) -> impl Iterator<Item = (Adjustment, f32)> + '_ {
        self.adjustment_tags.iter()
            .zip(self.adjustment_values.iter())
            .filter_map(|(&tag, &value)| Adjustment::from_tag(tag).map(|kind| (kind, value)))
    }
}


/// The main header at the start of every x3f file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {

    /// The file format version.
    pub version: Version,

    /// Sixteen bytes that are unique per image, but not a uuid.
    pub unique_identifier: [u8; 16],

    /// Marks subsets of images, as written by the camera.
    pub mark_bits: u32,

    /// Width of the image in pixels, before rotation.
    pub columns: u32,

    /// Height of the image in pixels, before rotation.
    pub rows: u32,

    /// Clockwise display rotation: 0, 90, 180 or 270 degrees.
    pub rotation: u32,

    /// The extended fields, present from version 2.1 on.
    pub extended: Option<ExtendedHeader>,
}

impl FileHeader {

    /// Read and validate the main header.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        magic_number::validate_file(read)?;
        let version = Version::read_validated(read)?;

        let mut unique_identifier = [0_u8; 16];
        u8::read_slice(read, &mut unique_identifier)?;

        let mark_bits = u32::read(read)?;
        let columns = u32::read(read)?;
        let rows = u32::read(read)?;
        let rotation = u32::read(read)?;

        if !matches!(rotation, 0 | 90 | 180 | 270) {
            return Err(Error::header("impossible rotation value"));
        }

        let extended =
            if version.has_extended_data() { Some(ExtendedHeader::read(read)?) }
            else { None };

        Ok(Self {
            version, unique_identifier, mark_bits,
            columns, rows, rotation, extended,
        })
    }
}


/// What a directory entry type tag says about its section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {

    /// A `PROP` entry.
    Property,

    /// An `IMAG`, `IMA2` (or historical `IMAF`) entry.
    Image,

    /// A `CAMF` entry.
    Camf,

    /// A tag this crate does not know. The entry is kept but not decoded.
    Unknown,
}

impl SectionKind {

    /// Classify a directory entry type tag.
    pub fn from_entry_type(entry_type: [u8; 4]) -> Self {
        if entry_type == *b"PROP" { SectionKind::Property }
        else if entry_type == *b"CAMF" { SectionKind::Camf }

        // files in the wild spell image entries IMAG, IMA2 and IMAF
        else if entry_type.starts_with(b"IMA") { SectionKind::Image }

        else { SectionKind::Unknown }
    }

    /// The section identifier that must start a section of this kind.
    pub fn expected_magic(self) -> Option<[u8; 4]> {
        match self {
            SectionKind::Property => Some(magic_number::PROPERTY_SECTION),
            SectionKind::Image => Some(magic_number::IMAGE_SECTION),
            SectionKind::Camf => Some(magic_number::CAMF_SECTION),
            SectionKind::Unknown => None,
        }
    }
}


/// One entry of the trailing directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {

    /// Absolute byte offset of the section.
    pub offset: u32,

    /// Byte size of the section, including its own header.
    pub size: u32,

    /// The raw four byte entry type tag.
    pub entry_type: [u8; 4],

    /// The classified entry type.
    pub kind: SectionKind,
}

/// The trailing table of contents that lists all sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {

    /// The version word of the directory section.
    pub version: u32,

    /// All entries, in file order.
    pub entries: SmallVec<[DirectoryEntry; 8]>,
}

/// Bytes per serialized directory entry.
const DIRECTORY_ENTRY_SIZE: u64 = 12;

/// Identifier, version and entry count of the directory itself.
const DIRECTORY_HEADER_SIZE: u64 = 12;

/// The directory offset is stored in the last four bytes of the file.
const DIRECTORY_POINTER_SIZE: u64 = 4;

impl Directory {

    /// Locate and read the directory of a file with the given total length.
    /// Leaves the reader wherever the directory ended.
    pub fn read_from(reader: &mut Tracking<impl Read + std::io::Seek>, file_length: u64) -> Result<Self> {
        if file_length < DIRECTORY_POINTER_SIZE {
            return Err(Error::truncated("no room for a directory pointer"));
        }

        reader.seek_to(file_length - DIRECTORY_POINTER_SIZE)?;
        let directory_offset = u64::from(u32::read(reader)?);

        if directory_offset + DIRECTORY_HEADER_SIZE > file_length {
            return Err(Error::section("directory offset outside the file"));
        }

        reader.seek_to(directory_offset)?;

        if magic_number::read(reader)? != magic_number::DIRECTORY {
            return Err(Error::section("directory identifier is not SECd"));
        }

        let version = u32::read(reader)?;
        let count = u64::from(u32::read(reader)?);

        if count * DIRECTORY_ENTRY_SIZE > file_length - directory_offset {
            return Err(Error::section("directory entry count exceeds the file"));
        }

        let mut entries = SmallVec::with_capacity(count as usize);
        for _ in 0 .. count {
            let offset = u32::read(reader)?;
            let size = u32::read(reader)?;
            let entry_type = magic_number::read(reader)?;

            if u64::from(offset) + u64::from(size) > file_length {
                return Err(Error::section("directory entry outside the file"));
            }

            entries.push(DirectoryEntry {
                offset, size, entry_type,
                kind: SectionKind::from_entry_type(entry_type),
            });
        }

        let directory = Self { version, entries };
        directory.validate_no_overlap()?;
        Ok(directory)
    }

    /// Directory entries must not share bytes.
    fn validate_no_overlap(&self) -> UnitResult {
        let mut spans: Vec<(u64, u64)> = self.entries.iter()
            .map(|entry| (u64::from(entry.offset), u64::from(entry.size)))
            .collect();

        spans.sort_unstable();

        for pair in spans.windows(2) {
            let (offset, size) = pair[0];
            if offset + size > pair[1].0 {
                return Err(Error::section("directory entries overlap"));
            }
        }

        Ok(())
    }
}


/// The fixed header of a property list section, after the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {

    /// The version word of the section.
    pub version: u32,

    /// Number of name/value pairs.
    pub num_properties: u32,

    /// The character encoding tag. Zero is utf16.
    pub character_format: u32,

    /// Declared length of the character pool, in utf16 units.
    pub total_length: u32,
}

impl PropertyInfo {

    /// Bytes of the section consumed by identifier and header.
    pub const HEADER_SIZE: u64 = 24;

    fn read(read: &mut impl Read) -> Result<Self> {
        let version = u32::read(read)?;
        let num_properties = u32::read(read)?;
        let character_format = u32::read(read)?;
        let _reserved = u32::read(read)?;
        let total_length = u32::read(read)?;

        Ok(Self { version, num_properties, character_format, total_length })
    }
}


/// The fixed header of an image data section, after the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {

    /// The version word of the section.
    pub version: u32,

    /// The image type word.
    pub image_type: u32,

    /// The image format word.
    pub format: u32,

    /// Width in pixels, before rotation.
    pub columns: u32,

    /// Height in pixels, before rotation.
    pub rows: u32,

    /// Bytes per row for uncompressed data, zero otherwise.
    pub row_stride: u32,
}

impl ImageInfo {

    /// Bytes of the section consumed by identifier and header.
    pub const HEADER_SIZE: u64 = 28;

    /// The combined `type << 16 | format` tag.
    pub fn type_format(&self) -> u32 {
        (self.image_type << 16) | (self.format & 0xffff)
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        let version = u32::read(read)?;
        let image_type = u32::read(read)?;
        let format = u32::read(read)?;
        let columns = u32::read(read)?;
        let rows = u32::read(read)?;
        let row_stride = u32::read(read)?;

        Ok(Self { version, image_type, format, columns, rows, row_stride })
    }
}


/// The fixed header of a camf section, after the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CamfInfo {

    /// The version word of the section.
    pub version: u32,

    /// The storage encoding, 2, 4 or 5.
    pub camf_type: u32,

    /// The four type specific header words.
    pub parameters: [u32; 4],
}

impl CamfInfo {

    /// Bytes of the section consumed by identifier and header.
    pub const HEADER_SIZE: u64 = 28;

    fn read(read: &mut impl Read) -> Result<Self> {
        let version = u32::read(read)?;
        let camf_type = u32::read(read)?;

        let mut parameters = [0_u32; 4];
        u32::read_slice(read, &mut parameters)?;

        Ok(Self { version, camf_type, parameters })
    }
}


/// The typed descriptor of one section,
/// built from the section header without loading the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionInfo {

    /// A property list section.
    Property(PropertyInfo),

    /// An image data section.
    Image(ImageInfo),

    /// A camf section.
    Camf(CamfInfo),

    /// A section behind an unknown directory tag, never decoded.
    Unknown,
}

impl SectionInfo {

    /// Seek to the section start, validate the section identifier
    /// against the directory entry, and read the fixed section header.
    /// Returns the descriptor and the header size in bytes.
    pub fn read_for(
        reader: &mut Tracking<impl Read + std::io::Seek>,
        entry: &DirectoryEntry,
    ) -> Result<(Self, u64)>
    {
        let expected = match entry.kind.expected_magic() {
            Some(expected) => expected,
            None => {
                log::warn!("unknown directory entry type {:02x?}", entry.entry_type);
                return Ok((SectionInfo::Unknown, 0));
            },
        };

        reader.seek_to(u64::from(entry.offset))?;

        let magic = magic_number::read(reader)?;
        if magic != expected {
            return Err(Error::section("section identifier disagrees with its directory entry"));
        }

        match entry.kind {
            SectionKind::Property => Ok((
                SectionInfo::Property(PropertyInfo::read(reader)?),
                PropertyInfo::HEADER_SIZE,
            )),

            SectionKind::Image => Ok((
                SectionInfo::Image(ImageInfo::read(reader)?),
                ImageInfo::HEADER_SIZE,
            )),

            SectionKind::Camf => Ok((
                SectionInfo::Camf(CamfInfo::read(reader)?),
                CamfInfo::HEADER_SIZE,
            )),

            SectionKind::Unknown => unreachable!("unknown kinds return early"),
        }
    }
}


#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn minimal_header_bytes(version: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic_number::FILE);
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&[0_u8; 16]);
        bytes.extend_from_slice(&0_u32.to_le_bytes());
        bytes.extend_from_slice(&6000_u32.to_le_bytes());
        bytes.extend_from_slice(&4000_u32.to_le_bytes());
        bytes.extend_from_slice(&90_u32.to_le_bytes());
        bytes
    }

    #[test]
    fn reads_a_version_two_zero_header() {
        let bytes = minimal_header_bytes(0x0002_0000);
        let header = FileHeader::read(&mut bytes.as_slice()).unwrap();

        assert_eq!(header.version, Version(0x0002_0000));
        assert_eq!((header.columns, header.rows, header.rotation), (6000, 4000, 90));
        assert!(header.extended.is_none());
    }

    #[test]
    fn reads_the_extended_header_of_version_two_one() {
        let mut bytes = minimal_header_bytes(0x0002_0001);

        let mut label = [0_u8; 32];
        label[.. 4].copy_from_slice(b"Auto");
        bytes.extend_from_slice(&label);

        let mut tags = [0_u8; 32];
        tags[0] = 1;
        tags[5] = 10;
        bytes.extend_from_slice(&tags);

        for index in 0 .. 32 {
            bytes.extend_from_slice(&(index as f32).to_le_bytes());
        }

        let header = FileHeader::read(&mut bytes.as_slice()).unwrap();
        let extended = header.extended.unwrap();

        assert_eq!(extended.white_balance, "Auto");
        assert_eq!(
            extended.adjustments().collect::<Vec<_>>(),
            vec![(Adjustment::Exposure, 0.0), (Adjustment::FillLight, 5.0)]
        );
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = minimal_header_bytes(0x0002_0000);
        bytes[0 .. 4].copy_from_slice(b"EXIF");

        match FileHeader::read(&mut bytes.as_slice()) {
            Err(Error::MalformedHeader(_)) => {},
            other => panic!("expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_major_versions() {
        let bytes = minimal_header_bytes(0x0003_0000);
        match FileHeader::read(&mut bytes.as_slice()) {
            Err(Error::UnsupportedVersion(0x0003_0000)) => {},
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn rejects_impossible_rotations() {
        let mut bytes = minimal_header_bytes(0x0002_0000);
        let rotation_offset = bytes.len() - 4;
        bytes[rotation_offset ..].copy_from_slice(&45_u32.to_le_bytes());

        match FileHeader::read(&mut bytes.as_slice()) {
            Err(Error::MalformedHeader(_)) => {},
            other => panic!("expected MalformedHeader, got {:?}", other),
        }
    }

    /// The last four bytes of a 128 byte file saying 0x30 0x00 0x00 0x00
    /// place the directory at absolute offset 48.
    #[test]
    fn directory_pointer_is_little_endian() {
        let mut bytes = vec![0_u8; 128];

        bytes[48 .. 52].copy_from_slice(&magic_number::DIRECTORY);
        bytes[52 .. 56].copy_from_slice(&0x0002_0000_u32.to_le_bytes());
        bytes[56 .. 60].copy_from_slice(&0_u32.to_le_bytes());
        bytes[124 .. 128].copy_from_slice(&[0x30, 0x00, 0x00, 0x00]);

        let mut reader = Tracking::new(Cursor::new(bytes)).unwrap();
        let directory = Directory::read_from(&mut reader, 128).unwrap();
        assert!(directory.entries.is_empty());
    }

    #[test]
    fn rejects_entries_outside_the_file() {
        let mut bytes = vec![0_u8; 64];

        bytes[0 .. 4].copy_from_slice(&magic_number::DIRECTORY);
        bytes[4 .. 8].copy_from_slice(&0x0002_0000_u32.to_le_bytes());
        bytes[8 .. 12].copy_from_slice(&1_u32.to_le_bytes());
        bytes[12 .. 16].copy_from_slice(&100_u32.to_le_bytes()); // offset
        bytes[16 .. 20].copy_from_slice(&32_u32.to_le_bytes()); // size
        bytes[20 .. 24].copy_from_slice(b"PROP");
        bytes[60 .. 64].copy_from_slice(&0_u32.to_le_bytes());

        let mut reader = Tracking::new(Cursor::new(bytes)).unwrap();
        match Directory::read_from(&mut reader, 64) {
            Err(Error::MalformedSection(_)) => {},
            other => panic!("expected MalformedSection, got {:?}", other),
        }
    }

    #[test]
    fn rejects_overlapping_entries() {
        let mut bytes = vec![0_u8; 64];

        bytes[0 .. 4].copy_from_slice(&magic_number::DIRECTORY);
        bytes[4 .. 8].copy_from_slice(&0x0002_0000_u32.to_le_bytes());
        bytes[8 .. 12].copy_from_slice(&2_u32.to_le_bytes());

        bytes[12 .. 16].copy_from_slice(&40_u32.to_le_bytes());
        bytes[16 .. 20].copy_from_slice(&10_u32.to_le_bytes());
        bytes[20 .. 24].copy_from_slice(b"PROP");

        bytes[24 .. 28].copy_from_slice(&45_u32.to_le_bytes());
        bytes[28 .. 32].copy_from_slice(&10_u32.to_le_bytes());
        bytes[32 .. 36].copy_from_slice(b"CAMF");

        bytes[60 .. 64].copy_from_slice(&0_u32.to_le_bytes());

        let mut reader = Tracking::new(Cursor::new(bytes)).unwrap();
        match Directory::read_from(&mut reader, 64) {
            Err(Error::MalformedSection(_)) => {},
            other => panic!("expected MalformedSection, got {:?}", other),
        }
    }

    #[test]
    fn classifies_entry_types() {
        assert_eq!(SectionKind::from_entry_type(*b"PROP"), SectionKind::Property);
        assert_eq!(SectionKind::from_entry_type(*b"IMAG"), SectionKind::Image);
        assert_eq!(SectionKind::from_entry_type(*b"IMA2"), SectionKind::Image);
        assert_eq!(SectionKind::from_entry_type(*b"IMAF"), SectionKind::Image);
        assert_eq!(SectionKind::from_entry_type(*b"CAMF"), SectionKind::Camf);
        assert_eq!(SectionKind::from_entry_type(*b"WAVE"), SectionKind::Unknown);
    }
}
