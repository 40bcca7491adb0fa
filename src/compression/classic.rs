
//! The classic huffman codec.
//! Decodes huffman compressed thumbnails and the raw data
//! of the pre-true camera generations (x530 and the 10 bit cameras).
//!
//! The section payload is laid out as
//! `[value mapping] [coding table] [row bit streams] [row offsets]`,
//! the row offset table sitting at the very end of the section.
//! Each row is an independent bit stream of `3 * columns` code words.

use crate::compression::{ByteBits, HuffmanTree};
use crate::error::{Error, Result};
use crate::image::{ImageKind, PixelData};
use crate::io::Data;


/// How the classic codec reads one specific image kind.
#[derive(Debug, Clone, Copy)]
struct Layout {

    /// Bits per sample. The coding and mapping tables have `1 << bits` entries.
    bits: u32,

    /// Raw sections carry a value mapping table, thumbnails do not.
    has_mapping: bool,

    /// Raw samples are stored as 16 bit values, thumbnail samples as bytes.
    sixteen_bit: bool,
}

fn layout(kind: ImageKind) -> Result<Layout> {
    match kind {
        ImageKind::ThumbHuffman => Ok(Layout { bits: 8, has_mapping: false, sixteen_bit: false }),
        ImageKind::RawHuffmanX530 => Ok(Layout { bits: 8, has_mapping: true, sixteen_bit: true }),
        ImageKind::RawHuffman10Bit => Ok(Layout { bits: 10, has_mapping: true, sixteen_bit: true }),
        _ => Err(Error::section("image kind is not classic huffman")),
    }
}


/// Decode the payload of a classic huffman image section.
pub(crate) fn decode(kind: ImageKind, columns: u32, rows: u32, payload: &[u8]) -> Result<PixelData> {
    let layout = layout(kind)?;
    let table_length = 1_usize << layout.bits;

    let columns = columns as usize;
    let rows = rows as usize;

    let sample_count = rows.checked_mul(columns)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| Error::section("image dimension overflow"))?;

    // each sample consumes at least one bit of some row stream
    if sample_count > payload.len().saturating_mul(16) {
        return Err(Error::section("image dimensions exceed the compressed payload"));
    }

    let mut read: &[u8] = payload;

    let mapping = if layout.has_mapping {
        Some(u16::read_vec(&mut read, table_length, payload.len(), "value mapping table")?)
    }
    else { None };

    let code_words = u32::read_vec(&mut read, table_length, payload.len(), "classic coding table")?;
    let tree = HuffmanTree::from_code_words(&code_words, mapping.as_deref())?;

    // the row offset table sits at the end of the section
    let offsets_length = rows.checked_mul(u32::BYTE_SIZE)
        .filter(|&length| length <= read.len())
        .ok_or_else(|| Error::section("row offset table does not fit the section"))?;

    let (data, mut offset_bytes) = read.split_at(read.len() - offsets_length);
    let row_offsets = u32::read_vec(&mut offset_bytes, rows, offsets_length, "row offsets")?;

    if layout.sixteen_bit {
        let mut samples = Vec::with_capacity(sample_count);
        decode_rows(&tree, &row_offsets, data, columns, |accumulator| {
            // negative accumulators clamp to black
            samples.push(if (accumulator as i16) < 0 { 0 } else { accumulator });
        })?;

        Ok(PixelData::Rgb16 { samples })
    }
    else {
        let mut bytes = Vec::with_capacity(sample_count);
        decode_rows(&tree, &row_offsets, data, columns, |accumulator| {
            let byte = accumulator as u8;
            bytes.push(if (byte as i8) < 0 { 0 } else { byte });
        })?;

        Ok(PixelData::Rgb8 { row_stride: 3 * columns, bytes })
    }
}

/// Run the shared row loop, handing each accumulated sample to the sink.
/// Every plane accumulates deltas independently,
/// restarting at zero at the beginning of each row.
fn decode_rows(
    tree: &HuffmanTree, row_offsets: &[u32], data: &[u8],
    columns: usize, mut emit: impl FnMut(u16),
) -> Result<()>
{
    for &row_offset in row_offsets {
        let row = data.get(row_offset as usize ..)
            .ok_or_else(|| Error::section("row offset outside the image data"))?;

        let mut bits = ByteBits::new(row);
        let mut accumulators = [0_u16; 3];

        for _ in 0 .. columns {
            for accumulator in &mut accumulators {
                let delta = tree.decode(&mut bits)?;
                *accumulator = accumulator.wrapping_add(delta as u16);
                emit(*accumulator);
            }
        }
    }

    Ok(())
}
