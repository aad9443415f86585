//! HMAC (RFC 2104) over any [`Hash`] primitive.

use zeroize::Zeroize;

use super::Hash;

/// Keyed HMAC state.
///
/// Key setup happens once in [`Hmac::new`]: the inner state absorbs
/// `key ⊕ 0x36` and the outer state `key ⊕ 0x5c`, each padded to one hash
/// block. The whole state is [`Clone`], so a caller that reuses the same key
/// (PBKDF2 does, thousands of times) pays for key setup exactly once.
#[derive(Clone)]
pub struct Hmac<H: Hash> {
    inner: H,
    outer: H,
}

impl<H: Hash> Hmac<H> {
    /// Create a keyed HMAC over the hash family of `hash`.
    ///
    /// Keys longer than the hash block size are hashed first, per the RFC.
    pub fn new(hash: &H, key: &[u8]) -> Self {
        let chunk = hash.block_size();

        let mut block = [0u8; 128];
        if key.len() <= chunk {
            block[..key.len()].copy_from_slice(key);
        } else {
            let mut h = hash.fresh();
            h.update(key);
            h.finalize(&mut block);
        }

        let mut xored = [0u8; 128];
        for (x, b) in xored.iter_mut().zip(block.iter()) {
            *x = 0x36 ^ b;
        }
        let mut inner = hash.fresh();
        inner.update(&xored[..chunk]);

        for (x, b) in xored.iter_mut().zip(block.iter()) {
            *x = 0x5c ^ b;
        }
        let mut outer = hash.fresh();
        outer.update(&xored[..chunk]);

        block.zeroize();
        xored.zeroize();

        Hmac { inner, outer }
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    pub fn digest_size(&self) -> usize {
        self.outer.digest_size()
    }

    /// Absorb message bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the state and write `digest_size()` bytes into the front of
    /// `out`.
    pub fn finalize(self, out: &mut [u8]) {
        let n = self.digest_size();
        let mut digest = [0u8; 64];
        self.inner.finalize(&mut digest);

        let mut outer = self.outer;
        outer.update(&digest[..n]);
        outer.finalize(out);

        digest.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha2::Sha2;

    fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
        let mut mac = Hmac::new(&Sha2::sha256(), key);
        mac.update(data);
        let mut out = [0u8; 32];
        mac.finalize(&mut out);
        out.iter().map(|b| format!("{b:02x}")).collect()
    }

    // RFC 4231 test cases 1-7.
    #[test]
    fn rfc4231_case_1() {
        assert_eq!(
            hmac_sha256_hex(&[0x0b; 20], b"Hi There"),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn rfc4231_case_2() {
        assert_eq!(
            hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn rfc4231_case_3() {
        assert_eq!(
            hmac_sha256_hex(&[0xaa; 20], &[0xdd; 50]),
            "773ea91e36800e46854db8ebd09181a72959098b3ef8c122d9635514ced565fe"
        );
    }

    #[test]
    fn rfc4231_case_4() {
        let key: Vec<u8> = (1..=25).collect();
        assert_eq!(
            hmac_sha256_hex(&key, &[0xcd; 50]),
            "82558a389a443c0ea4cc819899f2083a85f0faa3e578f8077a2e3ff46729665b"
        );
    }

    #[test]
    fn rfc4231_case_5_truncated() {
        let mut mac = Hmac::new(&Sha2::sha256(), &[0x0c; 20]);
        mac.update(b"Test With Truncation");
        let mut out = [0u8; 32];
        mac.finalize(&mut out);
        let hex: String = out[..16].iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "a3b6167473100ee06e0c796c2955552b");
    }

    #[test]
    fn rfc4231_case_6_long_key() {
        assert_eq!(
            hmac_sha256_hex(
                &[0xaa; 131],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            ),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn rfc4231_case_7_long_key_and_data() {
        let data: &[u8] = b"This is a test using a larger than block-size key and a larger \
than block-size data. The key needs to be hashed before being used by the HMAC algorithm.";
        assert_eq!(
            hmac_sha256_hex(&[0xaa; 131], data),
            "9b09ffa71b942fcb27635fbcd5b0e944bfdc63644f0713938a7f51535c3a35e2"
        );
    }
}
