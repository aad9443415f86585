//! PBKDF2 (RFC 2898) over an injected HMAC primitive.

use zeroize::Zeroize;

use super::Hash;
use super::hmac::Hmac;

/// Derive `key.len()` bytes from `password` and `salt`.
///
/// The keyed HMAC state is computed once and cloned per iteration, so the
/// cost per iteration is two compression calls rather than a full key setup.
/// For each output block i = 1, 2, …: U₁ = HMAC(password, salt ‖ BE32(i)),
/// Uⱼ = HMAC(password, Uⱼ₋₁), and the block is U₁ ⊕ U₂ ⊕ … ⊕ U_iterations,
/// truncated to the bytes still needed.
///
/// `iterations` must be at least 1.
pub fn pbkdf2<H: Hash>(
    hash: &H,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key: &mut [u8],
) {
    let keyed = Hmac::new(hash, password);
    let size = keyed.digest_size();

    let mut u = [0u8; 64];
    for (index, out) in key.chunks_mut(size).enumerate() {
        let block = (index + 1) as u32;

        let mut mac = keyed.clone();
        mac.update(salt);
        mac.update(&block.to_be_bytes());
        mac.finalize(&mut u);
        out.copy_from_slice(&u[..out.len()]);

        for _ in 1..iterations {
            let mut mac = keyed.clone();
            mac.update(&u[..size]);
            mac.finalize(&mut u);
            for (k, v) in out.iter_mut().zip(u.iter()) {
                *k ^= v;
            }
        }
    }

    u.zeroize();
}
