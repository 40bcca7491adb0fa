
//! Walks the decoded camf bytes as a sequence of tagged entries.
//! Every entry carries a name and either a text, a property list,
//! an n-dimensional matrix, or an opaque blob.

use smallvec::SmallVec;

use crate::error::{Error, Result};


/// Tag of a text entry.
const TAG_TEXT: [u8; 4] = *b"CMbT";

/// Tag of a property list entry.
const TAG_PROPERTY: [u8; 4] = *b"CMbP";

/// Tag of a matrix entry.
const TAG_MATRIX: [u8; 4] = *b"CMbM";

/// Tag of a generic entry, the fourth byte being zero.
const TAG_GENERIC: [u8; 4] = [b'C', b'M', b'b', 0];

/// Fixed entry header: tag, version, entry size, name offset, value offset.
const ENTRY_HEADER_SIZE: usize = 20;

/// More dimensions than any camera ever wrote.
const MAX_DIMENSIONS: u32 = 16;

/// All recognized matrix element types are four bytes wide.
const ELEMENT_SIZE: u32 = 4;


/// One parsed camf entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CamfEntry {

    /// The four byte entry tag.
    pub tag: [u8; 4],

    /// The version word of the entry header.
    pub version: u32,

    /// The entry name, an ascii identifier such as `WhiteBalanceColorCorrections`.
    pub name: String,

    /// The typed payload.
    pub value: CamfValue,
}

/// The typed payload of a camf entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CamfValue {

    /// A nul terminated string.
    Text(String),

    /// Name and value string pairs.
    Properties(Vec<(String, String)>),

    /// An n-dimensional array of numbers.
    Matrix(CamfMatrix),

    /// An opaque blob with an unknown inner structure.
    Generic(Vec<u8>),
}

/// One dimension of a matrix entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixDimension {

    /// Number of elements along this dimension.
    pub size: u32,

    /// The dimension name, for example `Row` or `Color`.
    pub name: String,
}

/// The decoded numbers of a matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixValues {

    /// Element type 6.
    Float(Vec<f32>),

    /// Element type 1.
    Int(Vec<i32>),

    /// Element type 3.
    UInt(Vec<u32>),
}

impl MatrixValues {

    /// Number of decoded elements.
    pub fn len(&self) -> usize {
        match self {
            MatrixValues::Float(values) => values.len(),
            MatrixValues::Int(values) => values.len(),
            MatrixValues::UInt(values) => values.len(),
        }
    }

    /// Whether the matrix contains no elements at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An n-dimensional matrix entry.
/// When the declared element type does not match the payload length,
/// the raw bytes are retained and the typed values are unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct CamfMatrix {

    /// The element type code from the file.
    pub element_type: u32,

    /// The declared or inferred width of one element in bytes.
    pub element_size: u32,

    /// The dimensions, outermost first.
    pub dimensions: SmallVec<[MatrixDimension; 3]>,

    /// The raw bytes of the value block, kept for mismatched matrices.
    raw: Vec<u8>,

    /// The typed elements, if declaration and payload agree.
    values: Option<MatrixValues>,
}

impl CamfMatrix {

    /// The product of all dimension sizes.
    pub fn element_count(&self) -> u64 {
        self.dimensions.iter()
            .map(|dimension| u64::from(dimension.size))
            .product()
    }

    /// The typed elements.
    /// Fails with `MalformedCamfEntry` when the declared element type
    /// cannot accommodate the payload of this matrix.
    pub fn values(&self) -> Result<&MatrixValues> {
        self.values.as_ref().ok_or_else(||
            Error::camf_entry("matrix payload does not match its declared element type"))
    }

    /// The raw bytes of the matrix data block.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}


/// Read a little endian u32 at the offset, or fail as a malformed entry.
fn word(bytes: &[u8], offset: usize) -> Result<u32> {
    let bytes = bytes.get(offset .. offset + 4)
        .ok_or_else(|| Error::camf_entry("entry header outside the decoded data"))?;

    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a nul terminated ascii string starting at the offset.
fn terminated_string(bytes: &[u8], offset: usize) -> Result<String> {
    let tail = bytes.get(offset ..)
        .ok_or_else(|| Error::camf_entry("string offset outside the entry"))?;

    let length = tail.iter().position(|&byte| byte == 0)
        .ok_or_else(|| Error::camf_entry("unterminated string"))?;

    Ok(String::from_utf8_lossy(&tail[.. length]).into_owned())
}


/// Walk the decoded camf bytes and parse every entry.
/// An unrecognized tag ends the walk, keeping everything parsed so far,
/// because cameras pad the decoded block with trailing garbage.
pub(crate) fn parse_entries(decoded: &[u8]) -> Result<Vec<CamfEntry>> {
    let mut entries = Vec::new();
    let mut position = 0_usize;

    while position + ENTRY_HEADER_SIZE <= decoded.len() {
        let tag = [
            decoded[position], decoded[position + 1],
            decoded[position + 2], decoded[position + 3],
        ];

        if tag != TAG_TEXT && tag != TAG_PROPERTY && tag != TAG_MATRIX && tag != TAG_GENERIC {
            log::warn!(
                "unknown camf entry tag {:02x?} at offset {}, ignoring the rest",
                tag, position
            );
            break;
        }

        let version = word(decoded, position + 4)?;
        let entry_size = word(decoded, position + 8)? as usize;
        let name_offset = word(decoded, position + 12)? as usize;
        let value_offset = word(decoded, position + 16)? as usize;

        if entry_size < ENTRY_HEADER_SIZE || position + entry_size > decoded.len() {
            return Err(Error::camf_entry("entry size outside the decoded data"));
        }

        if name_offset < ENTRY_HEADER_SIZE || value_offset < name_offset || value_offset > entry_size {
            return Err(Error::camf_entry("entry offsets out of order"));
        }

        let entry = &decoded[position .. position + entry_size];
        let name = terminated_string(entry, name_offset)?;
        let value = &entry[value_offset ..];

        let value = match tag {
            TAG_TEXT => CamfValue::Text(terminated_string(value, 0)?),
            TAG_PROPERTY => CamfValue::Properties(parse_properties(value)?),
            TAG_MATRIX => CamfValue::Matrix(parse_matrix(value)?),
            _ => CamfValue::Generic(value.to_vec()),
        };

        entries.push(CamfEntry { tag, version, name, value });
        position += entry_size;
    }

    Ok(entries)
}


/// A property value block: a pair count,
/// then string offset pairs relative to the block start.
fn parse_properties(value: &[u8]) -> Result<Vec<(String, String)>> {
    let count = word(value, 0)? as usize;

    if count > value.len() / 8 {
        return Err(Error::camf_entry("property count exceeds the value block"));
    }

    let mut properties = Vec::with_capacity(count);

    for index in 0 .. count {
        let name_offset = word(value, 4 + index * 8)? as usize;
        let value_offset = word(value, 8 + index * 8)? as usize;

        properties.push((
            terminated_string(value, name_offset)?,
            terminated_string(value, value_offset)?,
        ));
    }

    Ok(properties)
}


/// A matrix value block: element type, data offset and dimension count,
/// then one (size, name offset, index) descriptor per dimension,
/// then the element data.
fn parse_matrix(value: &[u8]) -> Result<CamfMatrix> {
    let element_type = word(value, 0)?;
    let data_offset = word(value, 4)? as usize;
    let dimension_count = word(value, 8)?;

    if dimension_count > MAX_DIMENSIONS {
        return Err(Error::camf_entry("absurd matrix dimension count"));
    }

    if data_offset > value.len() {
        return Err(Error::camf_entry("matrix data offset outside the value block"));
    }

    let mut dimensions: SmallVec<[MatrixDimension; 3]> = SmallVec::new();
    for index in 0 .. dimension_count as usize {
        let size = word(value, 12 + index * 12)?;
        let name_offset = word(value, 16 + index * 12)? as usize;
        let declared_index = word(value, 20 + index * 12)?;

        if declared_index != index as u32 {
            log::debug!("matrix dimension {} declares index {}", index, declared_index);
        }

        dimensions.push(MatrixDimension {
            size,
            name: terminated_string(value, name_offset)?,
        });
    }

    let raw = value[data_offset ..].to_vec();
    let element_count = dimensions.iter()
        .map(|dimension| u64::from(dimension.size))
        .product::<u64>();

    let used_space = raw.len() as u64;
    let declared_bytes = element_count.checked_mul(u64::from(ELEMENT_SIZE));

    let mut element_size = ELEMENT_SIZE;
    let values = if element_count == 0 {
        Some(empty_values(element_type))
    }
    else if declared_bytes == Some(used_space) {
        decode_values(element_type, element_count as usize, &raw)
    }
    else {
        // old files disagree; derive the effective element size
        // from the used space, but leave the matrix undecoded
        if used_space % element_count == 0 {
            element_size = (used_space / element_count) as u32;
            log::warn!(
                "matrix of {} elements in {} bytes, inferred element size {}",
                element_count, used_space, element_size
            );
        }
        else {
            log::warn!(
                "matrix of {} elements does not divide its {} payload bytes",
                element_count, used_space
            );
        }

        None
    };

    Ok(CamfMatrix { element_type, element_size, dimensions, raw, values })
}

fn empty_values(element_type: u32) -> MatrixValues {
    match element_type {
        1 => MatrixValues::Int(Vec::new()),
        6 => MatrixValues::Float(Vec::new()),
        _ => MatrixValues::UInt(Vec::new()),
    }
}

/// Materialize the typed elements, four little endian bytes each.
/// An unrecognized element type keeps the matrix raw.
fn decode_values(element_type: u32, count: usize, raw: &[u8]) -> Option<MatrixValues> {
    let words = raw.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));

    match element_type {
        1 => Some(MatrixValues::Int(words.map(|word| word as i32).collect())),
        3 => Some(MatrixValues::UInt(words.collect())),
        6 => Some(MatrixValues::Float(words.map(f32::from_bits).collect())),

        other => {
            log::warn!("unrecognized matrix element type {} ({} elements)", other, count);
            None
        },
    }
}
