//! Text encodings used inside Core Storage metadata.
//!
//! The only encoding the metadata actually carries is base64, inside plist
//! `<data>` elements.

pub mod base64;
