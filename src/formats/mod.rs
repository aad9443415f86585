//! Parsers for the Core Storage on-disk structures.
//!
//! The submodule follows one convention throughout:
//!
//! * **Metadata only** - parse methods read headers out of byte buffers the
//!   caller already fetched from the device and build an in-memory
//!   description. No I/O and no crypto happens here.
//! * **Crypto is separate** - parsers receive **already-decrypted** bytes.
//!   Fetching blocks, decrypting the encrypted-metadata region, and
//!   unwrapping keys is the business of [`crate::volume`] and
//!   [`crate::crypto`].

pub mod corestorage;
