//! Core Storage - Apple's logical volume manager format.
//!
//! A Core Storage physical volume opens with a volume header block in
//! sector 0 and chains through typed metadata blocks from there. All
//! multi-byte integers are little-endian.
//!
//! ## Generic block header (72 bytes, prologue of every block)
//! ```text
//! [0x00] Checksum        (u32) - CRC-32C of the rest of the block, unvalidated
//! [0x04] ChecksumSeed    (u32)
//! [0x08] Version         (u16)
//! [0x0A] BlockType       (u16)
//! [0x0C] SequenceNumber  (u32)
//! [0x10] RevisionNumber  (u64)
//! [0x18] (unknown)       (8 bytes)
//! [0x20] BlockNumber     (u64)
//! [0x28] (unknown)       (8 bytes)
//! [0x30] HeaderSize      (u32)
//! [0x34] (unknown)       (12 bytes)
//! [0x40] BlockSize       (u64)
//! ```
//! A wiped block carries the ASCII tag `LVFwiped` at payload offset 0 and
//! is treated as absent.
//!
//! ## Volume header payload (type 0x0010, 440 bytes)
//! The `CS` signature at payload offset 0x10 lands at sector offset 88.
//! ```text
//! [0x00] (unknown)           (16 bytes)
//! [0x10] Signature "CS"      (2 bytes)
//! [0x12] ChecksumAlgorithm   (u32) - 1 = CRC-32C (Castagnoli)
//! [0x16] MetadataBlocks      (u16) - metadata copies, at most 8
//! [0x18] BlockSize           (u32)
//! [0x1C] MetadataSize        (u32)
//! [0x20] MetadataBlock       (8 × u64) - absolute block indices
//! [0x60] KeyDataSize         (u32) - 16
//! [0x64] EncryptionAlgorithm (u32) - 2 = AES-XTS
//! [0x68] KeyData             (16 bytes)
//! [0x78] (unknown)           (112 bytes)
//! [0xE8] PhysicalVolumeUUID  (16 bytes)
//! [0xF8] GroupVolumeUUID     (16 bytes)
//! ```
//!
//! ## Metadata header payload (type 0x0011)
//! ```text
//! [0x00] Checksum            (u32)
//! [0x04] ChecksumSeed        (u32)
//! [0x08] (unknown)           (140 bytes)
//! [0x94] VolumeGroupsOffset  (u32) - block-relative
//! [0x98] XmlOffset           (u32) - block-relative
//! [0x9C] XmlSize             (u32)
//! [0xA0] (unknown)           (32 bytes)
//! [0xC0] PhysicalBlocks      (u64)
//! ```
//!
//! ## Volume groups descriptor (at VolumeGroupsOffset)
//! ```text
//! [0x00] (unknown)                (8 bytes)
//! [0x08] EncryptedMetadataSize    (u64) - in blocks
//! [0x10] (unknown)                (8 bytes)
//! [0x18] EncryptedMetadataBlocks  (u64) - copies, at most 2
//! [0x20] EncryptedMetadataBlock   (2 × u64) - absolute block indices
//! ```
//!
//! ## Encrypted metadata
//! The region is an array of 8192-byte records, each AES-XTS encrypted
//! under (KeyData, PhysicalVolumeUUID) with the little-endian record index
//! as the tweak. Decrypted records start with the generic block header;
//! types 0x0019 and 0x001A embed a plist behind a block-relative
//! (XmlOffset, XmlSize) pair at payload offsets 40 and 56 respectively,
//! and type 0x0505 carries the logical-volume extent.
//!
//! ## Wrapped-key records (base64 `<data>` inside the 0x0019 plist)
//! ```text
//! PassphraseWrappedKEKStruct (284 bytes)      KEKWrappedVolumeKeyStruct (256 bytes)
//! [0x00] SaltType   (u32) - 3                 [0x00] KeyType  (u32)
//! [0x04] SaltSize   (u32) - 16                [0x04] KeySize  (u32) - 24
//! [0x08] Salt       (16 bytes)                [0x08] Key      (24 bytes)
//! [0x18] KeyType    (u32)                     [0x20] (unused)
//! [0x1C] KeySize    (u32) - 24
//! [0x20] Key        (24 bytes) - wrapped KEK
//! [0x38] (unknown)  (116 bytes)
//! [0xAC] Iterations (u32)
//! [0xB0] (unknown)  (108 bytes)
//! ```

use std::io::Read;

use crate::utils::{bytesa, le_u16, le_u32, le_u64, magic};
use crate::{Error, Result};

/// Byte offset of the `CS` signature within sector 0.
pub const SIGNATURE_OFFSET: usize = 88;

/// The Core Storage signature.
pub const SIGNATURE: &[u8; 2] = b"CS";

/// Tag marking a wiped (absent) block, at payload offset 0.
pub const WIPED_TAG: &[u8; 8] = b"LVFwiped";

/// Size of one record in the encrypted-metadata region.
pub const ENCRYPTED_RECORD_SIZE: usize = 8192;

/// Declared size of a `PassphraseWrappedKEKStruct` record.
pub const WRAPPED_KEK_SIZE: usize = 284;

/// Declared size of a `KEKWrappedVolumeKeyStruct` record.
pub const WRAPPED_VOLUME_KEY_SIZE: usize = 256;

/// Block types this crate dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    /// Volume header (plaintext, sector 0 and backups).
    VolumeHeader = 0x0010,
    /// Plaintext metadata header pointing at the encrypted region.
    MetadataHeader = 0x0011,
    /// Group UUID carrier; informational.
    GroupDescriptor = 0x0013,
    /// Encrypted; embeds the CryptoUsers / WrappedVolumeKeys plist.
    CryptoUsers = 0x0019,
    /// Encrypted; embeds the logical-volume UUID/family/size plist.
    VolumeProperties = 0x001A,
    /// Encrypted; logical-volume extent (block count + first block).
    VolumeExtent = 0x0505,
    /// Anything else; skipped.
    Unknown(u16),
}

impl From<u16> for BlockType {
    fn from(v: u16) -> Self {
        match v {
            0x0010 => Self::VolumeHeader,
            0x0011 => Self::MetadataHeader,
            0x0013 => Self::GroupDescriptor,
            0x0019 => Self::CryptoUsers,
            0x001A => Self::VolumeProperties,
            0x0505 => Self::VolumeExtent,
            x => Self::Unknown(x),
        }
    }
}

impl BlockType {
    /// The on-disk type value.
    pub fn raw(self) -> u16 {
        match self {
            Self::VolumeHeader => 0x0010,
            Self::MetadataHeader => 0x0011,
            Self::GroupDescriptor => 0x0013,
            Self::CryptoUsers => 0x0019,
            Self::VolumeProperties => 0x001A,
            Self::VolumeExtent => 0x0505,
            Self::Unknown(x) => x,
        }
    }
}

/// The 72-byte prologue shared by every Core Storage block.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Declared CRC-32C; parsed, never validated.
    pub checksum: u32,
    pub checksum_seed: u32,
    pub version: u16,
    pub block_type: BlockType,
    pub sequence: u32,
    pub revision: u64,
    pub block_number: u64,
    pub header_size: u32,
    pub block_size: u64,
}

impl BlockHeader {
    /// Prologue size in bytes.
    pub const SIZE: usize = 72;

    /// Parse the prologue from the front of a block.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let checksum = le_u32(r)?;
        let checksum_seed = le_u32(r)?;
        let version = le_u16(r)?;
        let block_type = BlockType::from(le_u16(r)?);
        let sequence = le_u32(r)?;
        let revision = le_u64(r)?;
        let _ = bytesa::<8>(r)?;
        let block_number = le_u64(r)?;
        let _ = bytesa::<8>(r)?;
        let header_size = le_u32(r)?;
        let _ = bytesa::<12>(r)?;
        let block_size = le_u64(r)?;

        if (header_size as usize) < Self::SIZE {
            return Err(Error::Parse("header size smaller than prologue"));
        }

        Ok(BlockHeader {
            checksum,
            checksum_seed,
            version,
            block_type,
            sequence,
            revision,
            block_number,
            header_size,
            block_size,
        })
    }

    /// True if `block` carries the wiped tag at payload offset 0.
    pub fn is_wiped(block: &[u8]) -> bool {
        block.len() >= Self::SIZE + WIPED_TAG.len()
            && &block[Self::SIZE..Self::SIZE + WIPED_TAG.len()] == WIPED_TAG
    }
}

/// Volume header (block type 0x0010).
#[derive(Debug, Clone)]
pub struct VolumeHeader {
    pub checksum_algorithm: u32,
    /// Core Storage block size in bytes.
    pub block_size: u32,
    pub metadata_size: u32,
    /// Absolute block indices of the metadata copies; `metadata_blocks` of
    /// them are live.
    pub metadata_block: [u64; 8],
    pub metadata_blocks: u16,
    /// AES-XTS data key for the encrypted-metadata region.
    pub key_data: [u8; 16],
    pub physical_uuid: [u8; 16],
    pub group_uuid: [u8; 16],
}

impl VolumeHeader {
    /// Parse the payload following the prologue.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let _ = bytesa::<16>(r)?;
        magic(r, SIGNATURE)?;
        let checksum_algorithm = le_u32(r)?;
        let metadata_blocks = le_u16(r)?;
        let block_size = le_u32(r)?;
        let metadata_size = le_u32(r)?;
        let mut metadata_block = [0u64; 8];
        for slot in &mut metadata_block {
            *slot = le_u64(r)?;
        }
        let key_data_size = le_u32(r)?;
        let encryption_algorithm = le_u32(r)?;
        let key_data = bytesa::<16>(r)?;
        let _ = bytesa::<112>(r)?;
        let physical_uuid = bytesa::<16>(r)?;
        let group_uuid = bytesa::<16>(r)?;

        if block_size == 0 {
            return Err(Error::Parse("zero block size"));
        }
        if metadata_blocks as usize > metadata_block.len() {
            return Err(Error::Parse("too many metadata copies"));
        }
        if key_data_size != 16 {
            return Err(Error::Parse("unexpected key data size"));
        }
        // 2 = AES-XTS; nothing else has ever been observed in the wild.
        if encryption_algorithm != 2 {
            return Err(Error::Parse("unsupported encryption algorithm"));
        }

        Ok(VolumeHeader {
            checksum_algorithm,
            block_size,
            metadata_size,
            metadata_block,
            metadata_blocks,
            key_data,
            physical_uuid,
            group_uuid,
        })
    }
}

/// Plaintext metadata header (block type 0x0011).
#[derive(Debug, Clone)]
pub struct MetadataHeader {
    /// Block-relative offset of the volume groups descriptor.
    pub volume_groups_offset: u32,
    /// Block-relative offset/size of an informational plist; size 0 means
    /// absent.
    pub xml_offset: u32,
    pub xml_size: u32,
    pub physical_blocks: u64,
}

impl MetadataHeader {
    /// Parse the payload following the prologue.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let _checksum = le_u32(r)?;
        let _checksum_seed = le_u32(r)?;
        let _ = bytesa::<140>(r)?;
        let volume_groups_offset = le_u32(r)?;
        let xml_offset = le_u32(r)?;
        let xml_size = le_u32(r)?;
        let _ = bytesa::<32>(r)?;
        let physical_blocks = le_u64(r)?;

        Ok(MetadataHeader {
            volume_groups_offset,
            xml_offset,
            xml_size,
            physical_blocks,
        })
    }
}

/// Volume groups descriptor, referenced by the metadata header.
#[derive(Debug, Clone)]
pub struct VolumeGroupsDescriptor {
    /// Encrypted-metadata region size, in Core Storage blocks.
    pub encrypted_metadata_size: u64,
    /// Number of live copies, at most 2.
    pub encrypted_metadata_copies: u64,
    /// Absolute block indices of the copies.
    pub encrypted_metadata_block: [u64; 2],
}

impl VolumeGroupsDescriptor {
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let _ = bytesa::<8>(r)?;
        let encrypted_metadata_size = le_u64(r)?;
        let _ = bytesa::<8>(r)?;
        let encrypted_metadata_copies = le_u64(r)?;
        let encrypted_metadata_block = [le_u64(r)?, le_u64(r)?];

        if encrypted_metadata_copies == 0
            || encrypted_metadata_copies as usize > encrypted_metadata_block.len()
        {
            return Err(Error::Parse("encrypted metadata copy count"));
        }

        Ok(VolumeGroupsDescriptor {
            encrypted_metadata_size,
            encrypted_metadata_copies,
            encrypted_metadata_block,
        })
    }
}

/// Block-relative location of an embedded plist.
#[derive(Debug, Clone, Copy)]
pub struct XmlRegion {
    pub offset: u32,
    pub size: u32,
}

impl XmlRegion {
    /// Parse from a 0x0019 payload (40 leading bytes).
    pub fn parse_crypto_users<R: Read>(r: &mut R) -> Result<Self> {
        let _ = bytesa::<40>(r)?;
        Self::parse(r)
    }

    /// Parse from a 0x001A payload (56 leading bytes).
    pub fn parse_volume_properties<R: Read>(r: &mut R) -> Result<Self> {
        let _ = bytesa::<56>(r)?;
        Self::parse(r)
    }

    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let offset = le_u32(r)?;
        let size = le_u32(r)?;
        if size == 0 {
            return Err(Error::Parse("empty plist region"));
        }
        Ok(XmlRegion { offset, size })
    }
}

/// Logical-volume extent (block type 0x0505).
#[derive(Debug, Clone, Copy)]
pub struct VolumeExtent {
    /// Extent length in Core Storage blocks.
    pub blocks: u64,
    /// Absolute block index where the logical volume starts.
    pub first_block: u64,
}

impl VolumeExtent {
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        Ok(VolumeExtent {
            blocks: le_u64(r)?,
            first_block: le_u64(r)?,
        })
    }
}

/// A `PassphraseWrappedKEKStruct` record.
#[derive(Debug, Clone)]
pub struct PassphraseWrappedKek {
    pub salt: [u8; 16],
    /// RFC 3394 wrapped KEK.
    pub wrapped_key: [u8; 24],
    pub iterations: u32,
}

impl PassphraseWrappedKek {
    /// Parse a decoded record; `data` must reach through the iteration
    /// count (the declared record is 284 bytes, the documented prefix 176).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 176 {
            return Err(Error::Parse("short wrapped-KEK record"));
        }
        let mut r = data;
        let salt_type = le_u32(&mut r)?;
        let salt_size = le_u32(&mut r)?;
        let salt = bytesa::<16>(&mut r)?;
        let _key_type = le_u32(&mut r)?;
        let key_size = le_u32(&mut r)?;
        let wrapped_key = bytesa::<24>(&mut r)?;
        let _ = bytesa::<116>(&mut r)?;
        let iterations = le_u32(&mut r)?;

        if salt_type != 3 || salt_size != 16 {
            return Err(Error::Parse("unexpected KEK salt layout"));
        }
        if key_size != 24 {
            return Err(Error::Parse("unexpected wrapped-KEK size"));
        }
        if iterations == 0 {
            return Err(Error::Parse("zero iteration count"));
        }

        Ok(PassphraseWrappedKek {
            salt,
            wrapped_key,
            iterations,
        })
    }
}

/// A `KEKWrappedVolumeKeyStruct` record; only the leading 32 bytes are
/// consumed.
#[derive(Debug, Clone)]
pub struct KekWrappedVolumeKey {
    /// RFC 3394 wrapped volume master key.
    pub wrapped_key: [u8; 24],
}

impl KekWrappedVolumeKey {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 32 {
            return Err(Error::Parse("short wrapped-VMK record"));
        }
        let mut r = data;
        let _key_type = le_u32(&mut r)?;
        let key_size = le_u32(&mut r)?;
        let wrapped_key = bytesa::<24>(&mut r)?;

        if key_size != 24 {
            return Err(Error::Parse("unexpected wrapped-VMK size"));
        }

        Ok(KekWrappedVolumeKey { wrapped_key })
    }
}
