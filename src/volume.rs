//! Core Storage volume recovery: the metadata walk, passphrase unwrap, and
//! the decrypted logical-volume view.
//!
//! ## Recovery pipeline
//!
//! ```text
//! sector 0 ── volume header ──▶ metadata block ──▶ volume groups descriptor
//!                 │                                        │
//!                 │ KeyData + PhysicalVolumeUUID           ▼
//!                 └────────────▶ AES-XTS ◀── encrypted metadata records
//!                                  │
//!             0x0019: CryptoUsers plist ── passphrase ──▶ KEK ──▶ VMK
//!             0x001A: family/logical UUID + volume size
//!             0x0505: logical-volume extent
//! ```
//!
//! Every recovered field is a first-wins latch: the walk processes records
//! in ascending order and later observations (backup metadata copies) are
//! ignored. Once all latches are set the volume is mountable and
//! [`UnlockedVolume`] serves decrypted reads.

use log::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::crypto::Hash;
use crate::crypto::aes::{AesXts, aes_unwrap, sector_tweak};
use crate::crypto::pbkdf2::pbkdf2;
use crate::crypto::sha2::Sha2;
use crate::device::{BlockDevice, RawIo};
use crate::formats::corestorage::{
    BlockHeader, BlockType, ENCRYPTED_RECORD_SIZE, KekWrappedVolumeKey, MetadataHeader,
    PassphraseWrappedKek, SIGNATURE, SIGNATURE_OFFSET, VolumeExtent, VolumeGroupsDescriptor,
    VolumeHeader, XmlRegion,
};
use crate::plist::PlistEntry;
use crate::utils::parse_uuid;
use crate::{Error, Result};

/// Logical-volume XTS unit size; also the encrypted-metadata record size.
const LOGICAL_SECTOR_SIZE: usize = 8192;

/// What the first sector of a device looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Core Storage physical volume (`CS` at offset 88).
    CoreStorage,
    /// An NTFS filesystem; not handled by this crate.
    Ntfs,
    Unknown,
}

/// Classify sector 0.
pub fn probe(sector0: &[u8]) -> Probe {
    if sector0.len() >= SIGNATURE_OFFSET + 2
        && &sector0[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2] == SIGNATURE
    {
        Probe::CoreStorage
    } else if sector0.len() >= 7 && &sector0[3..7] == b"NTFS" {
        Probe::Ntfs
    } else {
        Probe::Unknown
    }
}

/// Opaque provider of passphrase bytes.
///
/// Called once per `CryptoUsers` entry during a walk; `user` is the
/// zero-based index of the entry being tried. Implemented for closures.
pub trait PassphraseSource {
    fn passphrase(&mut self, user: usize) -> Result<Zeroizing<Vec<u8>>>;
}

impl<F> PassphraseSource for F
where
    F: FnMut(usize) -> Result<Zeroizing<Vec<u8>>>,
{
    fn passphrase(&mut self, user: usize) -> Result<Zeroizing<Vec<u8>>> {
        self(user)
    }
}

/// Identity and geometry recovered from the metadata walk. No key material.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Core Storage block size in bytes.
    pub block_size: u32,
    pub physical_uuid: [u8; 16],
    pub group_uuid: [u8; 16],
    pub family_uuid: [u8; 16],
    pub logical_uuid: [u8; 16],
    /// Logical volume size in bytes.
    pub volume_size: u64,
    /// First Core Storage block of the logical volume's contiguous extent.
    pub first_block: u64,
    /// Extent length in Core Storage blocks.
    pub blocks: u64,
}

/// A recovered Core Storage volume serving decrypted reads.
///
/// Owns the device and the volume cipher for the life of the view.
pub struct UnlockedVolume<R> {
    device: BlockDevice<R>,
    cipher: AesXts,
    vmk: Zeroizing<[u8; 16]>,
    info: VolumeInfo,
}

impl<R: RawIo> UnlockedVolume<R> {
    /// Walk the metadata of the Core Storage volume on `device`, derive the
    /// volume key from passphrases supplied by `passphrases`, and return
    /// the decrypting view.
    ///
    /// Fails with [`Error::BadMagic`] if the device does not carry the
    /// Core Storage signature and [`Error::WrongPassphrase`] if no supplied
    /// passphrase unwraps a volume key; the latter is retryable by calling
    /// `unlock` again with a fresh source.
    pub fn unlock<P: PassphraseSource>(
        mut device: BlockDevice<R>,
        passphrases: &mut P,
    ) -> Result<Self> {
        let mut sector0 = [0u8; 512];
        device.read_exact_at(&mut sector0, 0)?;
        if probe(&sector0) != Probe::CoreStorage {
            return Err(Error::BadMagic);
        }

        let mut recovery = Recovery::default();
        recovery.walk(&mut device, &sector0, passphrases)?;
        recovery.into_volume(device)
    }

    /// Recovered identity and geometry.
    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    /// The recovered volume master key.
    pub fn volume_master_key(&self) -> &[u8; 16] {
        &self.vmk
    }

    /// Read decrypted logical-volume bytes at `offset`.
    ///
    /// Returns the bytes delivered; fewer than requested only at the end of
    /// the volume.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= self.info.volume_size {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.info.volume_size - offset) as usize;

        let sector_size = LOGICAL_SECTOR_SIZE as u64;
        let base = self.info.first_block * u64::from(self.info.block_size);
        let mut scratch = Zeroizing::new(vec![0u8; LOGICAL_SECTOR_SIZE]);

        let mut done = 0;
        while done < want {
            let pos = offset + done as u64;
            let sector = pos / sector_size;
            let within = (pos % sector_size) as usize;

            self.device
                .read_exact_at(&mut scratch, base + sector * sector_size)?;
            self.cipher.process(&mut scratch, &sector_tweak(sector))?;

            let take = (LOGICAL_SECTOR_SIZE - within).min(want - done);
            buf[done..done + take].copy_from_slice(&scratch[within..within + take]);
            done += take;
        }

        Ok(want)
    }

    /// Consume the view, returning the underlying device.
    pub fn into_inner(self) -> BlockDevice<R> {
        self.device
    }
}

/// First-wins latches filled in by the walk.
#[derive(Default)]
struct Recovery {
    block_size: Option<u32>,
    key_data: Option<Zeroizing<[u8; 16]>>,
    physical_uuid: Option<[u8; 16]>,
    group_uuid: Option<[u8; 16]>,
    family_uuid: Option<[u8; 16]>,
    logical_uuid: Option<[u8; 16]>,
    volume_size: Option<u64>,
    extent: Option<VolumeExtent>,
    vmk: Option<Zeroizing<[u8; 16]>>,
}

impl Recovery {
    fn walk<R: RawIo, P: PassphraseSource>(
        &mut self,
        device: &mut BlockDevice<R>,
        sector0: &[u8],
        passphrases: &mut P,
    ) -> Result<()> {
        let mut r = sector0;
        let header = BlockHeader::parse(&mut r)?;
        if header.block_type != BlockType::VolumeHeader {
            return Err(Error::UnknownBlockType(header.block_type.raw()));
        }
        if self.block_size.is_some() {
            return Ok(());
        }

        let volume = VolumeHeader::parse(&mut r)?;
        debug!(
            "volume header: block size {}, {} metadata copies",
            volume.block_size, volume.metadata_blocks
        );
        self.block_size = Some(volume.block_size);
        self.key_data = Some(Zeroizing::new(volume.key_data));
        self.physical_uuid = Some(volume.physical_uuid);
        self.group_uuid = Some(volume.group_uuid);

        if volume.metadata_blocks == 0 {
            return Err(Error::Parse("no metadata copies"));
        }
        // Copy 0 only; the rest are backups of the same list.
        let offset = volume.metadata_block[0] * u64::from(volume.block_size);
        self.walk_metadata(device, offset, u64::from(volume.block_size), passphrases)
    }

    fn walk_metadata<R: RawIo, P: PassphraseSource>(
        &mut self,
        device: &mut BlockDevice<R>,
        offset: u64,
        block_size: u64,
        passphrases: &mut P,
    ) -> Result<()> {
        let mut block = vec![0u8; block_size as usize];
        device.read_exact_at(&mut block, offset)?;

        if BlockHeader::is_wiped(&block) {
            debug!("metadata block at {offset:#x} is wiped");
            return Ok(());
        }
        let mut r = block.as_slice();
        let header = BlockHeader::parse(&mut r)?;
        if header.block_type != BlockType::MetadataHeader {
            debug!("unexpected block type {:?} at {offset:#x}", header.block_type);
            return Ok(());
        }
        let metadata = MetadataHeader::parse(&mut r)?;

        let groups_at = metadata.volume_groups_offset as usize;
        let mut groups = block.get(groups_at..).ok_or(Error::InvalidRange)?;
        let descriptor = VolumeGroupsDescriptor::parse(&mut groups)?;

        if metadata.xml_size > 0 {
            self.inspect_metadata_plist(device, offset, &metadata)?;
        }

        // Copy 0 only, as with the metadata list itself.
        let region_offset = descriptor.encrypted_metadata_block[0] * block_size;
        let region_len = descriptor.encrypted_metadata_size * block_size;
        self.walk_encrypted_region(device, region_offset, region_len, passphrases)
    }

    /// The plaintext metadata plist is informational; log it, require
    /// nothing from it.
    fn inspect_metadata_plist<R: RawIo>(
        &mut self,
        device: &mut BlockDevice<R>,
        block_offset: u64,
        metadata: &MetadataHeader,
    ) -> Result<()> {
        let mut xml = vec![0u8; metadata.xml_size as usize];
        device.read_exact_at(&mut xml, block_offset + u64::from(metadata.xml_offset))?;
        match std::str::from_utf8(&xml) {
            Ok(text) => match PlistEntry::parse(text) {
                Ok(plist) => trace!("metadata plist with {} entries", plist.children.len()),
                Err(e) => warn!("metadata plist does not parse: {e}"),
            },
            Err(_) => warn!("metadata plist is not UTF-8"),
        }
        Ok(())
    }

    fn walk_encrypted_region<R: RawIo, P: PassphraseSource>(
        &mut self,
        device: &mut BlockDevice<R>,
        region_offset: u64,
        region_len: u64,
        passphrases: &mut P,
    ) -> Result<()> {
        let key_data = self.key_data.as_ref().ok_or(Error::Parse("no key data"))?;
        let tweak_key = self.physical_uuid.ok_or(Error::Parse("no physical UUID"))?;
        let cipher = AesXts::new(&key_data[..], &tweak_key, false)?;

        let records = region_len / ENCRYPTED_RECORD_SIZE as u64;
        let mut record = Zeroizing::new(vec![0u8; ENCRYPTED_RECORD_SIZE]);

        for index in 0..records {
            let at = region_offset + index * ENCRYPTED_RECORD_SIZE as u64;
            device.read_exact_at(&mut record, at)?;

            // A uniform record holds no block: all-zero ends the region,
            // anything else is unused space.
            let first = record[0];
            if record.iter().all(|&b| b == first) {
                if first == 0 {
                    trace!("encrypted region ends at record {index}");
                    break;
                }
                continue;
            }

            cipher.process(&mut record, &sector_tweak(index))?;
            self.dispatch_encrypted(&record, passphrases)?;
        }
        Ok(())
    }

    fn dispatch_encrypted<P: PassphraseSource>(
        &mut self,
        record: &[u8],
        passphrases: &mut P,
    ) -> Result<()> {
        if BlockHeader::is_wiped(record) {
            return Ok(());
        }
        let mut r = record;
        let header = match BlockHeader::parse(&mut r) {
            Ok(h) => h,
            Err(e) => {
                // Not a block we understand; peripheral records are skipped.
                debug!("undecodable encrypted record: {e}");
                return Ok(());
            }
        };

        match header.block_type {
            BlockType::CryptoUsers => {
                if self.vmk.is_some() {
                    return Ok(());
                }
                let region = XmlRegion::parse_crypto_users(&mut r)?;
                let plist_src = Self::xml_slice(record, region)?;
                let plist = PlistEntry::parse(plist_src)?;
                self.recover_volume_key(&plist, passphrases)
            }
            BlockType::VolumeProperties => {
                let region = XmlRegion::parse_volume_properties(&mut r)?;
                let plist_src = Self::xml_slice(record, region)?;
                let plist = PlistEntry::parse(plist_src)?;
                self.latch_volume_properties(&plist)
            }
            BlockType::VolumeExtent => {
                let extent = VolumeExtent::parse(&mut r)?;
                if self.extent.is_none() {
                    debug!(
                        "logical volume extent: {} blocks from block {}",
                        extent.blocks, extent.first_block
                    );
                    self.extent = Some(extent);
                }
                Ok(())
            }
            other => {
                trace!("skipping encrypted block type {other:?}");
                Ok(())
            }
        }
    }

    fn xml_slice(record: &[u8], region: XmlRegion) -> Result<&str> {
        let start = region.offset as usize;
        let end = start
            .checked_add(region.size as usize)
            .ok_or(Error::InvalidRange)?;
        let raw = record.get(start..end).ok_or(Error::InvalidRange)?;
        std::str::from_utf8(raw).map_err(|_| Error::Parse("plist is not UTF-8"))
    }

    /// Try every crypto user against the passphrase source until one chain
    /// of unwraps yields the volume master key.
    fn recover_volume_key<P: PassphraseSource>(
        &mut self,
        plist: &PlistEntry<'_>,
        passphrases: &mut P,
    ) -> Result<()> {
        let context = plist
            .get("com.apple.corestorage.lvf.encryption.context")
            .ok_or(Error::Parse("missing encryption context"))?;
        let users = context
            .get("CryptoUsers")
            .ok_or(Error::Parse("missing CryptoUsers"))?;
        let wrapped_keys = context
            .get("WrappedVolumeKeys")
            .ok_or(Error::Parse("missing WrappedVolumeKeys"))?;

        for (index, user) in users.children.iter().enumerate() {
            let Some(entry) = user.get("PassphraseWrappedKEKStruct") else {
                continue;
            };
            let kek_record = PassphraseWrappedKek::parse(&entry.as_data()?)?;

            let passphrase = passphrases.passphrase(index)?;
            let mut pass_key = Zeroizing::new([0u8; 16]);
            pbkdf2(
                &Sha2::sha256(),
                &passphrase,
                &kek_record.salt,
                kek_record.iterations,
                &mut pass_key[..],
            );
            drop(passphrase);

            let mut kek = Zeroizing::new([0u8; 16]);
            if aes_unwrap(&pass_key[..], &kek_record.wrapped_key, &mut kek[..]).is_err() {
                debug!("crypto user {index}: KEK did not unwrap");
                continue;
            }

            for wrapped in &wrapped_keys.children {
                let Some(entry) = wrapped.get("KEKWrappedVolumeKeyStruct") else {
                    continue;
                };
                let vmk_record = KekWrappedVolumeKey::parse(&entry.as_data()?)?;
                let mut vmk = Zeroizing::new([0u8; 16]);
                if aes_unwrap(&kek[..], &vmk_record.wrapped_key, &mut vmk[..]).is_ok() {
                    debug!("crypto user {index}: volume master key recovered");
                    self.vmk = Some(vmk);
                    return Ok(());
                }
            }
            debug!("crypto user {index}: no volume key unwrapped");
        }

        // Which unwrap step failed is deliberately not distinguished.
        Err(Error::WrongPassphrase)
    }

    fn latch_volume_properties(&mut self, plist: &PlistEntry<'_>) -> Result<()> {
        let family = plist
            .get("com.apple.corestorage.lv.familyUUID")
            .ok_or(Error::Parse("missing family UUID"))?
            .as_str()?;
        let logical = plist
            .get("com.apple.corestorage.lv.uuid")
            .ok_or(Error::Parse("missing volume UUID"))?
            .as_str()?;
        let size = plist
            .get("com.apple.corestorage.lv.size")
            .ok_or(Error::Parse("missing volume size"))?
            .as_integer()?;

        if self.family_uuid.is_none() {
            self.family_uuid = Some(parse_uuid(family)?);
        }
        if self.logical_uuid.is_none() {
            self.logical_uuid = Some(parse_uuid(logical)?);
        }
        if self.volume_size.is_none() {
            debug!("logical volume size: {size} bytes");
            self.volume_size = Some(size);
        }
        Ok(())
    }

    /// All latches set → derive the volume cipher and hand over the device.
    fn into_volume<R: RawIo>(self, device: BlockDevice<R>) -> Result<UnlockedVolume<R>> {
        let vmk = self.vmk.ok_or(Error::WrongPassphrase)?;
        let block_size = self.block_size.ok_or(Error::Parse("no volume header"))?;
        let family_uuid = self.family_uuid.ok_or(Error::Parse("no volume family"))?;
        let volume_size = self.volume_size.ok_or(Error::Parse("no volume size"))?;
        let extent = self.extent.ok_or(Error::Parse("no volume extent"))?;

        let mut hasher = Sha2::sha256();
        hasher.update(&vmk[..]);
        hasher.update(&family_uuid);
        let mut digest = Zeroizing::new([0u8; 32]);
        hasher.finalize(&mut digest[..]);

        let cipher = AesXts::new(&vmk[..], &digest[..16], false)?;

        Ok(UnlockedVolume {
            device,
            cipher,
            vmk,
            info: VolumeInfo {
                block_size,
                physical_uuid: self.physical_uuid.unwrap_or_default(),
                group_uuid: self.group_uuid.unwrap_or_default(),
                family_uuid,
                logical_uuid: self.logical_uuid.unwrap_or_default(),
                volume_size,
                first_block: extent.first_block,
                blocks: extent.blocks,
            },
        })
    }
}
