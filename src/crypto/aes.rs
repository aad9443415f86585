//! AES block cipher, RFC 3394 key unwrap, and AES-XTS.
//!
//! Compact table-based implementation. One [`Aes`] context owns an expanded
//! key schedule and a direction; [`AesXts`] pairs a data context with a
//! second, always-encrypting tweak context, as the XTS construction
//! requires. Key schedules zeroize on drop.
//!
//! ## XTS notes
//!
//! * The tweak is a caller-supplied 16-byte value; for sector-addressed
//!   storage it is the little-endian sector index ([`sector_tweak`]).
//! * Inputs must be a multiple of 16 bytes; ciphertext stealing is not
//!   implemented (Core Storage operates on 8192-byte records).

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::ct_eq;
use crate::{Error, Result};

const SBOX: [u8; 256] = [
    0x63, 0x7C, 0x77, 0x7B, 0xF2, 0x6B, 0x6F, 0xC5, 0x30, 0x01, 0x67, 0x2B, 0xFE, 0xD7, 0xAB, 0x76,
    0xCA, 0x82, 0xC9, 0x7D, 0xFA, 0x59, 0x47, 0xF0, 0xAD, 0xD4, 0xA2, 0xAF, 0x9C, 0xA4, 0x72, 0xC0,
    0xB7, 0xFD, 0x93, 0x26, 0x36, 0x3F, 0xF7, 0xCC, 0x34, 0xA5, 0xE5, 0xF1, 0x71, 0xD8, 0x31, 0x15,
    0x04, 0xC7, 0x23, 0xC3, 0x18, 0x96, 0x05, 0x9A, 0x07, 0x12, 0x80, 0xE2, 0xEB, 0x27, 0xB2, 0x75,
    0x09, 0x83, 0x2C, 0x1A, 0x1B, 0x6E, 0x5A, 0xA0, 0x52, 0x3B, 0xD6, 0xB3, 0x29, 0xE3, 0x2F, 0x84,
    0x53, 0xD1, 0x00, 0xED, 0x20, 0xFC, 0xB1, 0x5B, 0x6A, 0xCB, 0xBE, 0x39, 0x4A, 0x4C, 0x58, 0xCF,
    0xD0, 0xEF, 0xAA, 0xFB, 0x43, 0x4D, 0x33, 0x85, 0x45, 0xF9, 0x02, 0x7F, 0x50, 0x3C, 0x9F, 0xA8,
    0x51, 0xA3, 0x40, 0x8F, 0x92, 0x9D, 0x38, 0xF5, 0xBC, 0xB6, 0xDA, 0x21, 0x10, 0xFF, 0xF3, 0xD2,
    0xCD, 0x0C, 0x13, 0xEC, 0x5F, 0x97, 0x44, 0x17, 0xC4, 0xA7, 0x7E, 0x3D, 0x64, 0x5D, 0x19, 0x73,
    0x60, 0x81, 0x4F, 0xDC, 0x22, 0x2A, 0x90, 0x88, 0x46, 0xEE, 0xB8, 0x14, 0xDE, 0x5E, 0x0B, 0xDB,
    0xE0, 0x32, 0x3A, 0x0A, 0x49, 0x06, 0x24, 0x5C, 0xC2, 0xD3, 0xAC, 0x62, 0x91, 0x95, 0xE4, 0x79,
    0xE7, 0xC8, 0x37, 0x6D, 0x8D, 0xD5, 0x4E, 0xA9, 0x6C, 0x56, 0xF4, 0xEA, 0x65, 0x7A, 0xAE, 0x08,
    0xBA, 0x78, 0x25, 0x2E, 0x1C, 0xA6, 0xB4, 0xC6, 0xE8, 0xDD, 0x74, 0x1F, 0x4B, 0xBD, 0x8B, 0x8A,
    0x70, 0x3E, 0xB5, 0x66, 0x48, 0x03, 0xF6, 0x0E, 0x61, 0x35, 0x57, 0xB9, 0x86, 0xC1, 0x1D, 0x9E,
    0xE1, 0xF8, 0x98, 0x11, 0x69, 0xD9, 0x8E, 0x94, 0x9B, 0x1E, 0x87, 0xE9, 0xCE, 0x55, 0x28, 0xDF,
    0x8C, 0xA1, 0x89, 0x0D, 0xBF, 0xE6, 0x42, 0x68, 0x41, 0x99, 0x2D, 0x0F, 0xB0, 0x54, 0xBB, 0x16,
];

const INV_SBOX: [u8; 256] = [
    0x52, 0x09, 0x6A, 0xD5, 0x30, 0x36, 0xA5, 0x38, 0xBF, 0x40, 0xA3, 0x9E, 0x81, 0xF3, 0xD7, 0xFB,
    0x7C, 0xE3, 0x39, 0x82, 0x9B, 0x2F, 0xFF, 0x87, 0x34, 0x8E, 0x43, 0x44, 0xC4, 0xDE, 0xE9, 0xCB,
    0x54, 0x7B, 0x94, 0x32, 0xA6, 0xC2, 0x23, 0x3D, 0xEE, 0x4C, 0x95, 0x0B, 0x42, 0xFA, 0xC3, 0x4E,
    0x08, 0x2E, 0xA1, 0x66, 0x28, 0xD9, 0x24, 0xB2, 0x76, 0x5B, 0xA2, 0x49, 0x6D, 0x8B, 0xD1, 0x25,
    0x72, 0xF8, 0xF6, 0x64, 0x86, 0x68, 0x98, 0x16, 0xD4, 0xA4, 0x5C, 0xCC, 0x5D, 0x65, 0xB6, 0x92,
    0x6C, 0x70, 0x48, 0x50, 0xFD, 0xED, 0xB9, 0xDA, 0x5E, 0x15, 0x46, 0x57, 0xA7, 0x8D, 0x9D, 0x84,
    0x90, 0xD8, 0xAB, 0x00, 0x8C, 0xBC, 0xD3, 0x0A, 0xF7, 0xE4, 0x58, 0x05, 0xB8, 0xB3, 0x45, 0x06,
    0xD0, 0x2C, 0x1E, 0x8F, 0xCA, 0x3F, 0x0F, 0x02, 0xC1, 0xAF, 0xBD, 0x03, 0x01, 0x13, 0x8A, 0x6B,
    0x3A, 0x91, 0x11, 0x41, 0x4F, 0x67, 0xDC, 0xEA, 0x97, 0xF2, 0xCF, 0xCE, 0xF0, 0xB4, 0xE6, 0x73,
    0x96, 0xAC, 0x74, 0x22, 0xE7, 0xAD, 0x35, 0x85, 0xE2, 0xF9, 0x37, 0xE8, 0x1C, 0x75, 0xDF, 0x6E,
    0x47, 0xF1, 0x1A, 0x71, 0x1D, 0x29, 0xC5, 0x89, 0x6F, 0xB7, 0x62, 0x0E, 0xAA, 0x18, 0xBE, 0x1B,
    0xFC, 0x56, 0x3E, 0x4B, 0xC6, 0xD2, 0x79, 0x20, 0x9A, 0xDB, 0xC0, 0xFE, 0x78, 0xCD, 0x5A, 0xF4,
    0x1F, 0xDD, 0xA8, 0x33, 0x88, 0x07, 0xC7, 0x31, 0xB1, 0x12, 0x10, 0x59, 0x27, 0x80, 0xEC, 0x5F,
    0x60, 0x51, 0x7F, 0xA9, 0x19, 0xB5, 0x4A, 0x0D, 0x2D, 0xE5, 0x7A, 0x9F, 0x93, 0xC9, 0x9C, 0xEF,
    0xA0, 0xE0, 0x3B, 0x4D, 0xAE, 0x2A, 0xF5, 0xB0, 0xC8, 0xEB, 0xBB, 0x3C, 0x83, 0x53, 0x99, 0x61,
    0x17, 0x2B, 0x04, 0x7E, 0xBA, 0x77, 0xD6, 0x26, 0xE1, 0x69, 0x14, 0x63, 0x55, 0x21, 0x0C, 0x7D,
];

const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36];

/// RFC 3394 initial value; the unwrap must recover it or the KEK was wrong.
const UNWRAP_IV: [u8; 8] = [0xA6; 8];

// GF(2^8) multiply under the AES polynomial 0x11B.
#[inline]
fn gmul(mut a: u8, mut b: u8) -> u8 {
    let mut p = 0u8;
    for _ in 0..8 {
        if b & 1 != 0 {
            p ^= a;
        }
        let hi = a & 0x80 != 0;
        a <<= 1;
        if hi {
            a ^= 0x1B;
        }
        b >>= 1;
    }
    p
}

// The 4x4 state, column-major.
type Block = [u8; 16];

fn sub_bytes(s: &mut Block) {
    for b in s.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

fn inv_sub_bytes(s: &mut Block) {
    for b in s.iter_mut() {
        *b = INV_SBOX[*b as usize];
    }
}

// Row i left-rotates by i; rows live at stride-4 indices.
fn shift_rows(s: &mut Block) {
    let t = s[1];
    s[1] = s[5];
    s[5] = s[9];
    s[9] = s[13];
    s[13] = t;
    s.swap(2, 10);
    s.swap(6, 14);
    let t = s[15];
    s[15] = s[11];
    s[11] = s[7];
    s[7] = s[3];
    s[3] = t;
}

fn inv_shift_rows(s: &mut Block) {
    let t = s[13];
    s[13] = s[9];
    s[9] = s[5];
    s[5] = s[1];
    s[1] = t;
    s.swap(2, 10);
    s.swap(6, 14);
    let t = s[3];
    s[3] = s[7];
    s[7] = s[11];
    s[11] = s[15];
    s[15] = t;
}

fn mix_columns(s: &mut Block) {
    for i in 0..4 {
        let b = i * 4;
        let (s0, s1, s2, s3) = (s[b], s[b + 1], s[b + 2], s[b + 3]);
        s[b] = gmul(0x02, s0) ^ gmul(0x03, s1) ^ s2 ^ s3;
        s[b + 1] = s0 ^ gmul(0x02, s1) ^ gmul(0x03, s2) ^ s3;
        s[b + 2] = s0 ^ s1 ^ gmul(0x02, s2) ^ gmul(0x03, s3);
        s[b + 3] = gmul(0x03, s0) ^ s1 ^ s2 ^ gmul(0x02, s3);
    }
}

fn inv_mix_columns(s: &mut Block) {
    for i in 0..4 {
        let b = i * 4;
        let (s0, s1, s2, s3) = (s[b], s[b + 1], s[b + 2], s[b + 3]);
        s[b] = gmul(0x0E, s0) ^ gmul(0x0B, s1) ^ gmul(0x0D, s2) ^ gmul(0x09, s3);
        s[b + 1] = gmul(0x09, s0) ^ gmul(0x0E, s1) ^ gmul(0x0B, s2) ^ gmul(0x0D, s3);
        s[b + 2] = gmul(0x0D, s0) ^ gmul(0x09, s1) ^ gmul(0x0E, s2) ^ gmul(0x0B, s3);
        s[b + 3] = gmul(0x0B, s0) ^ gmul(0x0D, s1) ^ gmul(0x09, s2) ^ gmul(0x0E, s3);
    }
}

fn add_round_key(s: &mut Block, rk: &[u8]) {
    for (b, k) in s.iter_mut().zip(rk.iter()) {
        *b ^= k;
    }
}

/// An expanded AES key with a fixed direction.
///
/// The direction is chosen at construction; [`Aes::ecb`] applies the forward
/// or inverse block operation accordingly. Supports 128/192/256-bit keys
/// (10/12/14 rounds).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Aes {
    /// Flat round-key schedule; `4 * (rounds + 1)` words are live.
    round_keys: [u8; 240],
    rounds: usize,
    encrypt: bool,
}

impl Aes {
    /// Expand `key` for the given direction.
    ///
    /// Returns [`Error::KeySize`] unless the key is 16, 24, or 32 bytes.
    pub fn new(key: &[u8], encrypt: bool) -> Result<Self> {
        let nk = match key.len() {
            16 => 4,
            24 => 6,
            32 => 8,
            n => return Err(Error::KeySize(n)),
        };
        let rounds = nk + 6;
        let words = 4 * (rounds + 1);

        let mut w = [0u8; 240];
        w[..key.len()].copy_from_slice(key);
        for i in nk..words {
            let mut t = [
                w[(i - 1) * 4],
                w[(i - 1) * 4 + 1],
                w[(i - 1) * 4 + 2],
                w[(i - 1) * 4 + 3],
            ];
            if i % nk == 0 {
                // RotWord + SubWord + round constant.
                t = [
                    SBOX[t[1] as usize] ^ RCON[i / nk - 1],
                    SBOX[t[2] as usize],
                    SBOX[t[3] as usize],
                    SBOX[t[0] as usize],
                ];
            } else if nk > 6 && i % nk == 4 {
                // 256-bit schedule applies SubWord mid-cycle as well.
                t = [
                    SBOX[t[0] as usize],
                    SBOX[t[1] as usize],
                    SBOX[t[2] as usize],
                    SBOX[t[3] as usize],
                ];
            }
            for j in 0..4 {
                w[i * 4 + j] = w[(i - nk) * 4 + j] ^ t[j];
            }
        }

        Ok(Aes {
            round_keys: w,
            rounds,
            encrypt,
        })
    }

    fn encrypt_block(&self, block: &Block) -> Block {
        let rk = &self.round_keys;
        let mut s = *block;
        add_round_key(&mut s, &rk[..16]);
        for round in 1..self.rounds {
            sub_bytes(&mut s);
            shift_rows(&mut s);
            mix_columns(&mut s);
            add_round_key(&mut s, &rk[round * 16..(round + 1) * 16]);
        }
        sub_bytes(&mut s);
        shift_rows(&mut s);
        add_round_key(&mut s, &rk[self.rounds * 16..(self.rounds + 1) * 16]);
        s
    }

    fn decrypt_block(&self, block: &Block) -> Block {
        let rk = &self.round_keys;
        let mut s = *block;
        add_round_key(&mut s, &rk[self.rounds * 16..(self.rounds + 1) * 16]);
        for round in (1..self.rounds).rev() {
            inv_shift_rows(&mut s);
            inv_sub_bytes(&mut s);
            add_round_key(&mut s, &rk[round * 16..(round + 1) * 16]);
            inv_mix_columns(&mut s);
        }
        inv_shift_rows(&mut s);
        inv_sub_bytes(&mut s);
        add_round_key(&mut s, &rk[..16]);
        s
    }

    /// Apply the constructed direction to one block.
    fn process_block(&self, block: &Block) -> Block {
        if self.encrypt {
            self.encrypt_block(block)
        } else {
            self.decrypt_block(block)
        }
    }

    /// Process `floor(len / 16)` blocks independently in the constructed
    /// direction. Returns the number of bytes written.
    pub fn ecb(&self, input: &[u8], output: &mut [u8]) -> usize {
        let blocks = (input.len() / 16).min(output.len() / 16);
        for i in 0..blocks {
            let mut b = [0u8; 16];
            b.copy_from_slice(&input[i * 16..(i + 1) * 16]);
            output[i * 16..(i + 1) * 16].copy_from_slice(&self.process_block(&b));
        }
        blocks * 16
    }
}

/// Unwrap RFC 3394 key data under `kek`, writing the plaintext key to `out`.
///
/// `wrapped` must be at least 16 bytes and a multiple of 8; `out` receives
/// `min(out.len(), wrapped.len() - 8)` rounded down to whole 8-byte blocks.
/// The recovered integrity value is checked (in constant time) against the
/// RFC's `0xA6A6A6A6A6A6A6A6`; on mismatch `out` is zeroized and
/// [`Error::KeyUnwrap`] is returned.
pub fn aes_unwrap(kek: &[u8], wrapped: &[u8], out: &mut [u8]) -> Result<()> {
    if wrapped.len() < 16 || wrapped.len() % 8 != 0 {
        return Err(Error::InvalidRange);
    }
    let n = out.len().min(wrapped.len() - 8) / 8;
    if n == 0 {
        return Err(Error::InvalidRange);
    }

    let cipher = Aes::new(kek, false)?;

    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    out[..n * 8].copy_from_slice(&wrapped[8..8 + n * 8]);

    for j in (0..6).rev() {
        for i in (1..=n).rev() {
            let t = (n * j + i) as u64;

            let mut block = [0u8; 16];
            for (b, (x, y)) in block[..8]
                .iter_mut()
                .zip(a.iter().zip(t.to_be_bytes().iter()))
            {
                *b = x ^ y;
            }
            block[8..].copy_from_slice(&out[(i - 1) * 8..i * 8]);

            let b = cipher.decrypt_block(&block);
            a.copy_from_slice(&b[..8]);
            out[(i - 1) * 8..i * 8].copy_from_slice(&b[8..]);
        }
    }

    let ok = ct_eq(&a, &UNWRAP_IV);
    a.zeroize();
    if !ok {
        out.zeroize();
        return Err(Error::KeyUnwrap);
    }
    Ok(())
}

/// Build the XTS tweak for a sector index: 16 bytes, little-endian counter
/// in the low half, high half zero.
pub fn sector_tweak(index: u64) -> [u8; 16] {
    let mut t = [0u8; 16];
    t[..8].copy_from_slice(&index.to_le_bytes());
    t
}

// Multiply the tweak by x in GF(2^128) mod x^128 + x^7 + x^2 + x + 1.
// Byte 0 is least significant.
fn mult_tweak(t: &mut Block) {
    let carry = t[15] >> 7;
    for i in (1..16).rev() {
        t[i] = (t[i] << 1) | (t[i - 1] >> 7);
    }
    t[0] <<= 1;
    if carry != 0 {
        t[0] ^= 0x87;
    }
}

/// AES-XTS context: a data cipher in the caller's direction and a tweak
/// cipher that always encrypts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AesXts {
    data: Aes,
    tweak: Aes,
}

impl AesXts {
    /// Build an XTS context from independent data and tweak keys.
    pub fn new(data_key: &[u8], tweak_key: &[u8], encrypt: bool) -> Result<Self> {
        Ok(AesXts {
            data: Aes::new(data_key, encrypt)?,
            tweak: Aes::new(tweak_key, true)?,
        })
    }

    /// Process `buf` in place under the initial `tweak`.
    ///
    /// The tweak is encrypted once, then advanced by the GF(2^128) doubling
    /// for each 16-byte unit. `buf` must be a multiple of 16 bytes.
    pub fn process(&self, buf: &mut [u8], tweak: &[u8; 16]) -> Result<()> {
        if buf.len() % 16 != 0 {
            return Err(Error::InvalidRange);
        }

        let mut t = self.tweak.encrypt_block(tweak);
        for unit in buf.chunks_exact_mut(16) {
            let mut b = [0u8; 16];
            for (x, (u, k)) in b.iter_mut().zip(unit.iter().zip(t.iter())) {
                *x = u ^ k;
            }
            let b = self.data.process_block(&b);
            for (u, (x, k)) in unit.iter_mut().zip(b.iter().zip(t.iter())) {
                *u = x ^ k;
            }
            mult_tweak(&mut t);
        }
        t.zeroize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // FIPS-197 appendix C vectors.
    const FIPS_PLAIN: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn fips197_aes128() {
        let key = unhex("000102030405060708090a0b0c0d0e0f");
        let plain = unhex(FIPS_PLAIN);
        let expect = unhex("69c4e0d86a7b0430d8cdb78070b4c55a");

        let mut out = [0u8; 16];
        let enc = Aes::new(&key, true).unwrap();
        assert_eq!(enc.ecb(&plain, &mut out), 16);
        assert_eq!(out[..], expect[..]);

        let dec = Aes::new(&key, false).unwrap();
        let mut back = [0u8; 16];
        dec.ecb(&out, &mut back);
        assert_eq!(back[..], plain[..]);
    }

    #[test]
    fn fips197_aes192() {
        let key = unhex("000102030405060708090a0b0c0d0e0f1011121314151617");
        let expect = unhex("dda97ca4864cdfe06eaf70a0ec0d7191");
        let enc = Aes::new(&key, true).unwrap();
        let mut out = [0u8; 16];
        enc.ecb(&unhex(FIPS_PLAIN), &mut out);
        assert_eq!(out[..], expect[..]);
    }

    #[test]
    fn fips197_aes256() {
        let key = unhex("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
        let expect = unhex("8ea2b7ca516745bfeafc49904b496089");
        let enc = Aes::new(&key, true).unwrap();
        let mut out = [0u8; 16];
        enc.ecb(&unhex(FIPS_PLAIN), &mut out);
        assert_eq!(out[..], expect[..]);
    }

    #[test]
    fn rejects_bad_key_sizes() {
        assert!(matches!(Aes::new(&[0u8; 15], true), Err(Error::KeySize(15))));
        assert!(matches!(Aes::new(&[0u8; 33], true), Err(Error::KeySize(33))));
    }

    #[test]
    fn ecb_whole_blocks_only() {
        let key = [0u8; 16];
        let enc = Aes::new(&key, true).unwrap();
        let input = [0u8; 20];
        let mut out = [0u8; 20];
        assert_eq!(enc.ecb(&input, &mut out), 16);
    }

    // RFC 3394 section 4.1: 128-bit data wrapped with a 128-bit KEK.
    #[test]
    fn rfc3394_unwrap() {
        let kek = unhex("000102030405060708090A0B0C0D0E0F");
        let wrapped = unhex("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5");
        let mut out = [0u8; 16];
        aes_unwrap(&kek, &wrapped, &mut out).unwrap();
        assert_eq!(out[..], unhex("00112233445566778899AABBCCDDEEFF")[..]);
    }

    #[test]
    fn unwrap_detects_corruption() {
        let kek = unhex("000102030405060708090A0B0C0D0E0F");
        let mut wrapped = unhex("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5");
        wrapped[3] ^= 1;
        let mut out = [0u8; 16];
        assert!(matches!(
            aes_unwrap(&kek, &wrapped, &mut out),
            Err(Error::KeyUnwrap)
        ));
        assert_eq!(out, [0u8; 16]);
    }

    // IEEE P1619 XTS-AES-128 vectors 1 and 2.
    #[test]
    fn xts_vector_1() {
        let key = [0u8; 16];
        let plain = [0u8; 32];
        let expect = unhex(
            "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e",
        );

        let xts = AesXts::new(&key, &key, true).unwrap();
        let mut buf = plain;
        xts.process(&mut buf, &sector_tweak(0)).unwrap();
        assert_eq!(buf[..], expect[..]);

        let xts = AesXts::new(&key, &key, false).unwrap();
        xts.process(&mut buf, &sector_tweak(0)).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn xts_vector_2() {
        let key1 = [0x11u8; 16];
        let key2 = [0x22u8; 16];
        let plain = [0x44u8; 32];
        let expect = unhex(
            "c454185e6a16936e39334038acef838bfb186fff7480adc4289382ecd6d394f0",
        );

        let xts = AesXts::new(&key1, &key2, true).unwrap();
        let mut buf = plain;
        xts.process(&mut buf, &sector_tweak(0x3333333333)).unwrap();
        assert_eq!(buf[..], expect[..]);
    }

    #[test]
    fn xts_round_trip_record() {
        let key1: Vec<u8> = (0..16).collect();
        let key2: Vec<u8> = (16..32).collect();
        let mut buf: Vec<u8> = (0..8192u32).map(|i| (i % 253) as u8).collect();
        let original = buf.clone();

        let enc = AesXts::new(&key1, &key2, true).unwrap();
        enc.process(&mut buf, &sector_tweak(7)).unwrap();
        assert_ne!(buf, original);

        let dec = AesXts::new(&key1, &key2, false).unwrap();
        dec.process(&mut buf, &sector_tweak(7)).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn xts_rejects_partial_units() {
        let xts = AesXts::new(&[0u8; 16], &[1u8; 16], true).unwrap();
        let mut buf = [0u8; 24];
        assert!(matches!(
            xts.process(&mut buf, &sector_tweak(0)),
            Err(Error::InvalidRange)
        ));
    }
}
