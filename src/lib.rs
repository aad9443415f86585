//! **cskit** - a Rust library for parsing Apple Core Storage volumes and
//! recovering their encryption keys from a passphrase.
//!
//! # Module map
//! | Module | Purpose |
//! |--------|---------|
//! | [`device`]   | Sector-aligned reads over raw devices and disk images |
//! | [`formats`]  | Core Storage on-disk structure parsers |
//! | [`plist`]    | Minimal XML property-list walker |
//! | [`encoding`] | Base64 for plist `<data>` payloads |
//! | [`crypto`]   | SHA-2, HMAC, PBKDF2, AES/XTS, RFC 3394 key unwrap |
//! | [`volume`]   | The metadata walker, passphrase unwrap, decrypted reads |
//!
//! # Quick start
//! ```no_run
//! use cskit::device::BlockDevice;
//! use cskit::volume::UnlockedVolume;
//! use zeroize::Zeroizing;
//!
//! # fn main() -> cskit::Result<()> {
//! let device = BlockDevice::open("/dev/sdb")?;
//! let mut source =
//!     |_user: usize| -> cskit::Result<_> { Ok(Zeroizing::new(b"passphrase".to_vec())) };
//! let mut volume = UnlockedVolume::unlock(device, &mut source)?;
//!
//! let mut first = vec![0u8; 8192];
//! volume.read(&mut first, 0)?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod device;
pub mod encoding;
pub mod error;
pub mod formats;
pub mod plist;
pub mod utils;
pub mod volume;

pub use error::{Error, Result};
