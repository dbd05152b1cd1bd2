//! Smart Home Protocol payload obfuscation.
//!
//! The plug firmware XORs every byte with the previous ciphertext byte,
//! seeded with a fixed key. The scheme has no secret and no integrity check:
//! it exists only so the device accepts our frames and must not be treated
//! as a confidentiality boundary.

use byteorder::{BigEndian, ByteOrder};

/// Seed of the autokey stream, identical in both directions.
pub const INITIAL_KEY: u8 = 0xAB;

/// Encrypts a plaintext and prepends its 4-byte big-endian length.
pub fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 4];
    BigEndian::write_u32(&mut header, plaintext.len() as u32);
    let mut out = Vec::with_capacity(header.len() + plaintext.len());
    out.extend_from_slice(&header);

    let mut key = INITIAL_KEY;
    for &p in plaintext {
        let c = p ^ key;
        out.push(c);
        key = c;
    }
    out
}

/// Decrypts a ciphertext whose length prefix has already been stripped.
pub fn decrypt(ciphertext: &[u8]) -> Vec<u8> {
    let mut plaintext = ciphertext.to_vec();
    decrypt_in_place(&mut plaintext);
    plaintext
}

/// Decrypts in place. The next key is the ciphertext byte as received, so it
/// is captured before the byte is overwritten.
pub fn decrypt_in_place(buf: &mut [u8]) {
    let mut key = INITIAL_KEY;
    for b in buf.iter_mut() {
        let next_key = *b;
        *b ^= key;
        key = next_key;
    }
}
