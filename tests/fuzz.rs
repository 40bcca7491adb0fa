
//! Fuzzy testing.
//! Mutates single bytes of a well formed synthetic file
//! and requires an error or a successful parse, but never a panic.

use std::io::Cursor;
use std::panic::catch_unwind;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use x3f::prelude::*;


/// A small but complete file: header, property list,
/// huffman thumbnail, camf, directory, directory pointer.
fn well_formed_file() -> Vec<u8> {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(b"FOVb");
    bytes.extend_from_slice(&0x0002_0000_u32.to_le_bytes());
    bytes.extend_from_slice(&[0_u8; 16]);
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());

    let mut entries = Vec::new();

    // property section
    let start = bytes.len() as u32;
    bytes.extend_from_slice(b"SECp");
    bytes.extend_from_slice(&0x0002_0000_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    bytes.extend_from_slice(&11_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    bytes.extend_from_slice(&5_u32.to_le_bytes());
    for unit in "Make\0Sigma\0".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    entries.push((start, bytes.len() as u32 - start, *b"PROP"));

    // huffman thumbnail section, 2x2 pixels
    let start = bytes.len() as u32;
    bytes.extend_from_slice(b"SECi");
    bytes.extend_from_slice(&0x0002_0000_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&11_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());

    let mut words = vec![0_u32; 256];
    words[5] = (1 << 24) | 0b0;
    words[1] = (2 << 24) | 0b10;
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&[0b0100_0101, 0b0000_0000]);
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    bytes.extend_from_slice(&0_u32.to_le_bytes());
    entries.push((start, bytes.len() as u32 - start, *b"IMAG"));

    // encrypted camf section with one text entry
    let start = bytes.len() as u32;
    let mut plaintext = Vec::new();
    plaintext.extend_from_slice(b"CMbT");
    plaintext.extend_from_slice(&1_u32.to_le_bytes());
    plaintext.extend_from_slice(&28_u32.to_le_bytes());
    plaintext.extend_from_slice(&20_u32.to_le_bytes());
    plaintext.extend_from_slice(&25_u32.to_le_bytes());
    plaintext.extend_from_slice(b"NAME\0ab\0");
    x3f::camf::apply_key_stream(42, &mut plaintext);

    bytes.extend_from_slice(b"SECc");
    bytes.extend_from_slice(&0x0002_0000_u32.to_le_bytes());
    bytes.extend_from_slice(&2_u32.to_le_bytes());
    bytes.extend_from_slice(&[0_u8; 12]);
    bytes.extend_from_slice(&42_u32.to_le_bytes());
    bytes.extend_from_slice(&plaintext);
    entries.push((start, bytes.len() as u32 - start, *b"CAMF"));

    let directory_offset = bytes.len() as u32;
    bytes.extend_from_slice(b"SECd");
    bytes.extend_from_slice(&0x0002_0000_u32.to_le_bytes());
    bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (offset, size, entry_type) in entries {
        bytes.extend_from_slice(&offset.to_le_bytes());
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&entry_type);
    }
    bytes.extend_from_slice(&directory_offset.to_le_bytes());

    bytes
}

/// Open the bytes and try to decode every section, discarding all errors.
fn exercise(bytes: Vec<u8>) {
    let mut file = match X3fFile::read_from_buffered(Cursor::new(bytes)) {
        Ok(file) => file,
        Err(_) => return,
    };

    let handles: Vec<SectionHandle> = file.sections().map(|(handle, _)| handle).collect();
    for handle in handles {
        let _ = file.load(handle);
    }
}

#[test]
fn the_unmutated_file_parses() {
    let bytes = well_formed_file();
    let mut file = X3fFile::read_from_buffered(Cursor::new(bytes)).unwrap();

    let properties = file.prop().unwrap();
    assert_eq!(file.load_properties(properties).unwrap().value("Make"), Some("Sigma"));

    let camf = file.camf().unwrap();
    assert_eq!(file.load_camf(camf).unwrap().entries().len(), 1);

    let thumb = file.thumb_huffman().unwrap();
    assert!(file.load_image(thumb).is_ok());
}

/// Just don't panic.
#[test]
fn mutated_files_never_panic() {
    let template = well_formed_file();

    let seed = [
        92, 1, 0, 130, 211, 8, 21, 70, 74, 4, 9, 5, 0, 23, 0, 3,
        20, 25, 6, 5, 229, 30, 0, 34, 218, 0, 40, 7, 5, 2, 7, 0,
    ];
    let mut random: StdRng = SeedableRng::from_seed(seed);

    for fuzz_index in 0 .. 4096_u32 {
        let mut bytes = template.clone();

        let index = random.random_range(0 .. bytes.len());
        bytes[index] = random.random::<u8>();

        let result = catch_unwind(move || exercise(bytes));
        assert!(result.is_ok(), "mutation {} panicked", fuzz_index);
    }
}

/// Truncations must error, not panic.
#[test]
fn truncated_files_never_panic() {
    let template = well_formed_file();

    for length in 0 .. template.len() {
        let bytes = template[.. length].to_vec();
        let result = catch_unwind(move || exercise(bytes));
        assert!(result.is_ok(), "truncation at {} panicked", length);
    }
}
