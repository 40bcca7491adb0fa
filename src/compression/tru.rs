
//! The true codec, used by the sd15, merrill and quattro generations.
//!
//! The payload carries three independently compressed sensor planes.
//! Every plane is a sequence of rows, every row a sequence of
//! huffman coded (bit length, difference) runs,
//! and every row starts on a 32-bit word boundary.
//! The predictors track even and odd columns separately,
//! and the first two columns of a row predict from the first two columns
//! of the previous row of the same parity.

use smallvec::SmallVec;

use crate::compression::{decode_true_difference, read_code_pairs, HuffmanTree, WordBits};
use crate::error::{Error, Result};
use crate::image::{ImageKind, PixelData, Plane};
use crate::io::Data;


/// Plane payloads are padded to this alignment.
const PLANE_ALIGNMENT: u32 = 16;

/// The per-plane predictor seed. Cameras always write 512.
const EXPECTED_SEED: u16 = 512;


/// Decode the payload of a true codec image section.
pub(crate) fn decode(kind: ImageKind, columns: u32, rows: u32, payload: &[u8]) -> Result<PixelData> {
    let mut read: &[u8] = payload;

    // quattro sections declare the dimensions of each plane,
    // because the top plane has its own resolution
    let quattro_dimensions = if kind == ImageKind::RawQuattro {
        let mut dimensions = [(0_u16, 0_u16); 3];
        for plane in &mut dimensions {
            plane.0 = u16::read(&mut read)?;
            plane.1 = u16::read(&mut read)?;
        }
        Some(dimensions)
    }
    else if kind.uses_true_codec() { None }
    else {
        return Err(Error::section("image kind is not true codec"));
    };

    let mut seeds = [0_u16; 3];
    for seed in &mut seeds {
        *seed = u16::read(&mut read)?;
        if *seed != EXPECTED_SEED {
            log::debug!("unusual true codec seed {} (cameras write {})", seed, EXPECTED_SEED);
        }
    }

    let _unknown = u16::read(&mut read)?;

    let pairs = read_code_pairs(&mut read)?;
    let tree = HuffmanTree::from_code_pairs(&pairs)?;

    if kind == ImageKind::RawQuattro {
        let _unknown = u32::read(&mut read)?;
    }

    let mut plane_sizes = [0_u32; 3];
    for size in &mut plane_sizes {
        *size = u32::read(&mut read)?;
    }

    let data = read;

    // plane starts are padded to 16 bytes;
    // the padded sizes must fit the remaining payload
    let mut plane_offsets = [0_u64; 3];
    let mut next_offset = 0_u64;

    for (offset, &size) in plane_offsets.iter_mut().zip(&plane_sizes) {
        *offset = next_offset;

        if next_offset + u64::from(size) > data.len() as u64 {
            return Err(Error::section("declared plane sizes exceed the image payload"));
        }

        let alignment = u64::from(PLANE_ALIGNMENT);
        let padded = (u64::from(size) + alignment - 1) / alignment * alignment;
        next_offset += padded;
    }

    let mut planes = SmallVec::new();

    for plane_index in 0 .. 3 {
        let (plane_columns, plane_rows) = match quattro_dimensions {
            Some(dimensions) => {
                let (columns, rows) = dimensions[plane_index];
                (u32::from(columns), u32::from(rows))
            },
            None => (columns, rows),
        };

        let start = plane_offsets[plane_index] as usize;
        let bytes = &data[start .. start + plane_sizes[plane_index] as usize];

        planes.push(decode_plane(
            bytes, plane_columns, plane_rows,
            seeds[plane_index], &tree,
        )?);
    }

    Ok(PixelData::Planes(planes))
}


/// Decode one plane into its own sample buffer.
fn decode_plane(
    bytes: &[u8], columns: u32, rows: u32,
    seed: u16, tree: &HuffmanTree,
) -> Result<Plane>
{
    let sample_count = (columns as usize).checked_mul(rows as usize)
        .ok_or_else(|| Error::section("plane dimension overflow"))?;

    // every sample consumes at least one bit of the plane stream
    if sample_count > bytes.len().saturating_mul(8) {
        return Err(Error::section("plane dimensions exceed the plane payload"));
    }

    let mut samples = Vec::with_capacity(sample_count);
    let mut bits = WordBits::new(bytes);

    // the first two columns of each row predict vertically,
    // tracked separately per row parity and column parity;
    // 64 bit accumulators, so that hostile streams cannot overflow
    let mut row_start = [[i64::from(seed); 2]; 2];

    for row in 0 .. rows {
        let row_parity = (row & 1) as usize;
        let mut accumulators = [0_i64; 2];

        for column in 0 .. columns {
            let column_parity = (column & 1) as usize;
            let difference = i64::from(decode_true_difference(&mut bits, tree)?);

            let previous =
                if column < 2 { row_start[row_parity][column_parity] }
                else { accumulators[column_parity] };

            let value = previous + difference;
            accumulators[column_parity] = value;

            if column < 2 {
                row_start[row_parity][column_parity] = value;
            }

            samples.push(value.clamp(0, 0xffff) as u16);
        }

        // every row starts on a fresh 32-bit word
        bits.align_to_word();
    }

    Ok(Plane { columns, rows, samples })
}


#[cfg(test)]
mod test {
    use super::*;

    /// Codes: symbol 2 is `0`, symbol 3 is `10`.
    /// Symbols name the bit length of the following difference.
    fn length_tree() -> HuffmanTree {
        HuffmanTree::from_code_pairs(&[
            (0, 1), (0, 1),             // lengths 0 and 1 unused
            (1, 0b0000_0000),           // length 2
            (2, 0b1000_0000),           // length 3
        ]).unwrap()
    }

    /// The bit stream `0 11 10 101` (+3 then +5),
    /// packed into one 32-bit little endian word.
    fn two_column_stream() -> [u8; 4] {
        let word = 0b0111_0101_u32 << 24;
        word.to_le_bytes()
    }

    #[test]
    fn even_and_odd_predictors_are_independent() {
        let plane = decode_plane(&two_column_stream(), 2, 1, 512, &length_tree()).unwrap();
        assert_eq!(plane.samples, vec![515, 517]);
    }

    #[test]
    fn negative_differences_sign_extend() {
        // `0 00 10 010`: -3 then -5
        let word = 0b0001_0010_u32 << 24;
        let plane = decode_plane(&word.to_le_bytes(), 2, 1, 512, &length_tree()).unwrap();
        assert_eq!(plane.samples, vec![509, 507]);
    }

    #[test]
    fn first_columns_predict_from_previous_row_of_same_parity() {
        // row 0: +3 +5, rows realign to word boundaries,
        // row 2: +3 +5 predicting from row 0 (both even rows)
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&two_column_stream());
        bytes.extend_from_slice(&two_column_stream());
        bytes.extend_from_slice(&two_column_stream());

        let plane = decode_plane(&bytes, 2, 3, 512, &length_tree()).unwrap();

        // row 1 is odd and predicts from the seed again
        assert_eq!(plane.samples, vec![515, 517, 515, 517, 518, 522]);
    }

    #[test]
    fn values_clamp_to_sixteen_bits() {
        // `0 00 10 010` from a zero seed: -3 then -5, both negative
        let word = 0b0001_0010_u32 << 24;
        let plane = decode_plane(&word.to_le_bytes(), 2, 1, 0, &length_tree()).unwrap();
        assert_eq!(plane.samples, vec![0, 0]);
    }

    fn merrill_payload(stream: &[u8; 4]) -> Vec<u8> {
        let mut payload = Vec::new();

        for _ in 0 .. 3 {
            payload.extend_from_slice(&512_u16.to_le_bytes());
        }
        payload.extend_from_slice(&0_u16.to_le_bytes());

        // table: lengths 0 and 1 unused, length 2 -> `0`, length 3 -> `10`
        payload.extend_from_slice(&[0, 1, 0, 1, 1, 0b0000_0000, 2, 0b1000_0000, 0, 0]);

        // three planes of 4 bytes each, padded to 16 byte starts
        for &size in &[4_u32, 4, 4] {
            payload.extend_from_slice(&size.to_le_bytes());
        }

        let mut data = vec![0_u8; 36];
        data[0 .. 4].copy_from_slice(stream);
        data[16 .. 20].copy_from_slice(stream);
        data[32 .. 36].copy_from_slice(stream);
        payload.extend_from_slice(&data);

        payload
    }

    #[test]
    fn merrill_planes_start_at_sixteen_byte_boundaries() {
        let payload = merrill_payload(&two_column_stream());
        let decoded = decode(ImageKind::RawMerrill, 2, 1, &payload).unwrap();

        match decoded {
            PixelData::Planes(planes) => {
                assert_eq!(planes.len(), 3);
                for plane in &planes {
                    assert_eq!((plane.columns, plane.rows), (2, 1));
                    assert_eq!(plane.samples, vec![515, 517]);
                }
            },
            other => panic!("expected Planes, got {:?}", other),
        }
    }

    #[test]
    fn quattro_planes_use_the_declared_dimensions() {
        let mut payload = Vec::new();

        // plane dimension table: two small planes, one wider top plane
        for &(columns, rows) in &[(1_u16, 1_u16), (1, 1), (2, 1)] {
            payload.extend_from_slice(&columns.to_le_bytes());
            payload.extend_from_slice(&rows.to_le_bytes());
        }

        for _ in 0 .. 3 {
            payload.extend_from_slice(&512_u16.to_le_bytes());
        }
        payload.extend_from_slice(&0_u16.to_le_bytes());

        payload.extend_from_slice(&[0, 1, 0, 1, 1, 0b0000_0000, 2, 0b1000_0000, 0, 0]);

        // the extra quattro word between the table and the plane sizes
        payload.extend_from_slice(&0_u32.to_le_bytes());

        for &size in &[4_u32, 4, 4] {
            payload.extend_from_slice(&size.to_le_bytes());
        }

        // single column stream: `0 11` (+3)
        let single = (0b011_u32 << 29).to_le_bytes();

        let mut data = vec![0_u8; 36];
        data[0 .. 4].copy_from_slice(&single);
        data[16 .. 20].copy_from_slice(&single);
        data[32 .. 36].copy_from_slice(&two_column_stream());
        payload.extend_from_slice(&data);

        let decoded = decode(ImageKind::RawQuattro, 2, 1, &payload).unwrap();
        match decoded {
            PixelData::Planes(planes) => {
                assert_eq!(planes[0].samples, vec![515]);
                assert_eq!(planes[1].samples, vec![515]);
                assert_eq!((planes[2].columns, planes[2].rows), (2, 1));
                assert_eq!(planes[2].samples, vec![515, 517]);
            },
            other => panic!("expected Planes, got {:?}", other),
        }
    }

    #[test]
    fn oversized_plane_declaration_is_malformed() {
        let mut payload = merrill_payload(&two_column_stream());

        // inflate the declared size of the third plane
        let sizes_start = payload.len() - 36 - 12;
        payload[sizes_start + 8 .. sizes_start + 12]
            .copy_from_slice(&0xffff_0000_u32.to_le_bytes());

        match decode(ImageKind::RawMerrill, 2, 1, &payload) {
            Err(Error::MalformedSection(_)) => {},
            other => panic!("expected MalformedSection, got {:?}", other),
        }
    }
}
