//! End-to-end recovery against a synthetic Core Storage image.
//!
//! The fixture builds a 64 MiB in-memory device holding a minimal but
//! complete volume: a volume header in sector 0, one metadata copy at block
//! 1, one encrypted-metadata copy of eight 8192-byte records at block 2,
//! a single crypto user wrapping a known volume master key, and one
//! XTS-encrypted logical-volume sector of known plaintext.

use cskit::Error;
use cskit::crypto::Hash;
use cskit::crypto::aes::{Aes, AesXts, sector_tweak};
use cskit::crypto::pbkdf2::pbkdf2;
use cskit::crypto::sha2::Sha2;
use cskit::device::{BlockDevice, RawIo};
use cskit::encoding::base64;
use cskit::utils::parse_uuid;
use cskit::volume::UnlockedVolume;
use zeroize::Zeroizing;

const BLOCK_SIZE: u64 = 4096;
const RECORD_SIZE: usize = 8192;
const DISK_SIZE: usize = 64 * 1024 * 1024;

const PASSPHRASE: &[u8] = b"password";
const ITERATIONS: u32 = 4096;
const SALT: [u8; 16] = [0u8; 16];

const KEY_DATA: [u8; 16] = [
    0x4B, 0x1E, 0x22, 0x9D, 0x5A, 0xC0, 0x33, 0x78, 0x81, 0x0F, 0x6E, 0xD4, 0x17, 0xAA, 0x29,
    0x5C,
];
const KEK: [u8; 16] = [
    0xA1, 0x07, 0x93, 0x3C, 0x58, 0xEF, 0x12, 0x6B, 0xC4, 0x2D, 0x70, 0x05, 0x9E, 0x41, 0xB8,
    0xF6,
];
const VMK: [u8; 16] = [
    0x80, 0x81, 0x35, 0xC7, 0x02, 0x9B, 0x44, 0xD1, 0x5E, 0x63, 0xF8, 0x0A, 0x27, 0xBC, 0x19,
    0xE2,
];

const PHYSICAL_UUID: &str = "11223344-5566-4788-99AA-BBCCDDEEFF00";
const GROUP_UUID: &str = "A0B1C2D3-E4F5-4061-8273-8495A6B7C8D9";
const FAMILY_UUID: &str = "E5A9BF42-6B2D-4F6A-8E2C-0123456789AB";
const LOGICAL_UUID: &str = "7C3D9E10-1111-4222-8333-A4B5C6D7E8F9";

const VOLUME_SIZE: u64 = 0x40_0000;
const FIRST_BLOCK: u64 = 1024;
const EXTENT_BLOCKS: u64 = VOLUME_SIZE / BLOCK_SIZE;

/// In-memory sector device.
struct MemIo {
    data: Vec<u8>,
}

impl RawIo for MemIo {
    fn raw_sector_size(&self) -> cskit::Result<u32> {
        Ok(512)
    }

    fn raw_read(&mut self, buf: &mut [u8], offset: u64) -> cskit::Result<usize> {
        assert_eq!(offset % 512, 0, "unaligned offset");
        assert_eq!(buf.len() % 512, 0, "unaligned size");
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

/// Write a 72-byte generic block header at the front of `buf`.
fn put_block_header(buf: &mut [u8], block_type: u16, block_number: u64) {
    put_u16(buf, 8, 1); // version
    put_u16(buf, 10, block_type);
    put_u64(buf, 32, block_number);
    put_u32(buf, 48, 72); // header size
    put_u64(buf, 64, BLOCK_SIZE);
}

/// RFC 3394 forward wrap, built from the crate's forward AES.
fn aes_wrap(kek: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    assert_eq!(plain.len() % 8, 0);
    let n = plain.len() / 8;
    let cipher = Aes::new(kek, true).unwrap();

    let mut a = [0xA6u8; 8];
    let mut r: Vec<[u8; 8]> = plain
        .chunks(8)
        .map(|c| <[u8; 8]>::try_from(c).unwrap())
        .collect();

    for j in 0..6 {
        for i in 1..=n {
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i - 1]);
            let mut out = [0u8; 16];
            cipher.ecb(&block, &mut out);

            let t = ((n * j + i) as u64).to_be_bytes();
            for (x, (y, z)) in a.iter_mut().zip(out[..8].iter().zip(t.iter())) {
                *x = y ^ z;
            }
            r[i - 1].copy_from_slice(&out[8..]);
        }
    }

    let mut wrapped = a.to_vec();
    for chunk in r {
        wrapped.extend_from_slice(&chunk);
    }
    wrapped
}

fn wrapped_kek_record() -> Vec<u8> {
    let mut pass_key = [0u8; 16];
    pbkdf2(&Sha2::sha256(), PASSPHRASE, &SALT, ITERATIONS, &mut pass_key);
    let wrapped = aes_wrap(&pass_key, &KEK);

    let mut rec = vec![0u8; 284];
    put_u32(&mut rec, 0, 3); // salt type
    put_u32(&mut rec, 4, 16); // salt size
    rec[8..24].copy_from_slice(&SALT);
    put_u32(&mut rec, 24, 16); // key type
    put_u32(&mut rec, 28, 24); // key size
    rec[32..56].copy_from_slice(&wrapped);
    put_u32(&mut rec, 172, ITERATIONS);
    rec
}

fn wrapped_vmk_record() -> Vec<u8> {
    let wrapped = aes_wrap(&KEK, &VMK);

    let mut rec = vec![0u8; 256];
    put_u32(&mut rec, 0, 16); // key type
    put_u32(&mut rec, 4, 24); // key size
    rec[8..32].copy_from_slice(&wrapped);
    rec
}

fn crypto_users_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><plist version=\"1.0\"><dict>\
         <key>com.apple.corestorage.lvf.encryption.context</key><dict>\
         <key>CryptoUsers</key><array><dict>\
         <key>PassphraseWrappedKEKStruct</key><data>{}</data>\
         </dict></array>\
         <key>WrappedVolumeKeys</key><array><dict>\
         <key>KEKWrappedVolumeKeyStruct</key><data>{}</data>\
         </dict></array>\
         </dict></dict></plist>",
        base64::encode(&wrapped_kek_record()),
        base64::encode(&wrapped_vmk_record()),
    )
}

fn volume_properties_xml() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><plist version=\"1.0\"><dict>\
         <key>com.apple.corestorage.lv.familyUUID</key><string>{FAMILY_UUID}</string>\
         <key>com.apple.corestorage.lv.uuid</key><string>{LOGICAL_UUID}</string>\
         <key>com.apple.corestorage.lv.size</key><integer>{VOLUME_SIZE:#x}</integer>\
         </dict></plist>"
    )
}

/// An encrypted-metadata record embedding a plist at offset 256.
fn plist_record(block_type: u16, lead: usize, xml: &[u8]) -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_SIZE];
    put_block_header(&mut rec, block_type, 0);
    put_u32(&mut rec, 72 + lead, 256); // xml offset
    put_u32(&mut rec, 72 + lead + 4, xml.len() as u32);
    rec[256..256 + xml.len()].copy_from_slice(xml);
    rec
}

fn extent_record() -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_SIZE];
    put_block_header(&mut rec, 0x0505, 0);
    put_u64(&mut rec, 72, EXTENT_BLOCKS);
    put_u64(&mut rec, 80, FIRST_BLOCK);
    rec
}

fn volume_plaintext() -> Vec<u8> {
    (0..RECORD_SIZE).map(|i| (i % 251) as u8).collect()
}

fn tweak_key() -> [u8; 16] {
    let mut hasher = Sha2::sha256();
    hasher.update(&VMK);
    hasher.update(&parse_uuid(FAMILY_UUID).unwrap());
    let mut digest = [0u8; 32];
    hasher.finalize(&mut digest);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

fn build_image() -> Vec<u8> {
    let mut disk = vec![0u8; DISK_SIZE];

    // Sector 0: volume header.
    {
        let sector = &mut disk[..512];
        put_block_header(sector, 0x0010, 0);
        sector[88..90].copy_from_slice(b"CS");
        put_u32(sector, 90, 1); // checksum algorithm: CRC-32C
        put_u16(sector, 94, 1); // one metadata copy
        put_u32(sector, 96, BLOCK_SIZE as u32);
        put_u32(sector, 100, BLOCK_SIZE as u32); // metadata size
        put_u64(sector, 104, 1); // metadata copy 0 at block 1
        put_u32(sector, 168, 16); // key data size
        put_u32(sector, 172, 2); // encryption algorithm: AES-XTS
        sector[176..192].copy_from_slice(&KEY_DATA);
        sector[304..320].copy_from_slice(&parse_uuid(PHYSICAL_UUID).unwrap());
        sector[320..336].copy_from_slice(&parse_uuid(GROUP_UUID).unwrap());
    }

    // Block 1: metadata header with the volume groups descriptor at
    // block-relative offset 512.
    {
        let at = BLOCK_SIZE as usize;
        let block = &mut disk[at..at + BLOCK_SIZE as usize];
        put_block_header(block, 0x0011, 1);
        put_u32(block, 220, 512); // volume groups offset
        put_u32(block, 224, 0); // xml offset
        put_u32(block, 228, 0); // xml size: no informational plist
        put_u64(block, 264, DISK_SIZE as u64 / BLOCK_SIZE);

        put_u64(block, 520, 16); // encrypted metadata size, in blocks
        put_u64(block, 536, 1); // one copy
        put_u64(block, 544, 2); // copy 0 at block 2
    }

    // Block 2: the encrypted-metadata region, eight 8192-byte records.
    //
    //   0: crypto users (0x0019)
    //   1: uniform non-zero, must be skipped
    //   2: volume properties (0x001A)
    //   3: logical volume extent (0x0505)
    //   4: all zero, ends the walk
    //   5: a record that would fail to parse, proving the walk stopped
    {
        let metadata_cipher =
            AesXts::new(&KEY_DATA, &parse_uuid(PHYSICAL_UUID).unwrap(), true).unwrap();
        let region = 2 * BLOCK_SIZE as usize;

        let mut write_record = |index: usize, plain: &[u8]| {
            let mut rec = plain.to_vec();
            metadata_cipher
                .process(&mut rec, &sector_tweak(index as u64))
                .unwrap();
            let at = region + index * RECORD_SIZE;
            disk[at..at + RECORD_SIZE].copy_from_slice(&rec);
        };

        write_record(0, &plist_record(0x0019, 40, crypto_users_xml().as_bytes()));
        write_record(
            2,
            &plist_record(0x001A, 56, volume_properties_xml().as_bytes()),
        );
        write_record(3, &extent_record());

        let bad = plist_record(0x001A, 56, &[0xFF, 0xFE, 0x00, 0x01]);
        write_record(5, &bad);

        let skip = region + RECORD_SIZE;
        disk[skip..skip + RECORD_SIZE].fill(0xFF);
    }

    // The logical volume: one sector of known plaintext at the extent
    // start, XTS-encrypted under (VMK, SHA-256(VMK ‖ family)[0..16]).
    {
        let volume_cipher = AesXts::new(&VMK, &tweak_key(), true).unwrap();
        let mut sector = volume_plaintext();
        volume_cipher.process(&mut sector, &sector_tweak(0)).unwrap();
        let at = (FIRST_BLOCK * BLOCK_SIZE) as usize;
        disk[at..at + RECORD_SIZE].copy_from_slice(&sector);
    }

    disk
}

fn fixture_device() -> BlockDevice<MemIo> {
    BlockDevice::new(MemIo { data: build_image() })
}

#[test]
fn recovers_keys_and_decrypts_the_volume() {
    let mut prompts = Vec::new();
    let mut source = |user: usize| -> cskit::Result<Zeroizing<Vec<u8>>> {
        prompts.push(user);
        Ok(Zeroizing::new(PASSPHRASE.to_vec()))
    };

    let mut volume = UnlockedVolume::unlock(fixture_device(), &mut source).unwrap();

    let info = volume.info();
    assert_eq!(info.block_size, BLOCK_SIZE as u32);
    assert_eq!(info.physical_uuid, parse_uuid(PHYSICAL_UUID).unwrap());
    assert_eq!(info.group_uuid, parse_uuid(GROUP_UUID).unwrap());
    assert_eq!(info.family_uuid, parse_uuid(FAMILY_UUID).unwrap());
    assert_eq!(info.logical_uuid, parse_uuid(LOGICAL_UUID).unwrap());
    assert_eq!(info.volume_size, VOLUME_SIZE);
    assert_eq!(info.first_block, FIRST_BLOCK);
    assert_eq!(info.blocks, EXTENT_BLOCKS);

    assert_eq!(volume.volume_master_key(), &VMK);

    let expected = volume_plaintext();
    let mut first = vec![0u8; RECORD_SIZE];
    assert_eq!(volume.read(&mut first, 0).unwrap(), RECORD_SIZE);
    assert_eq!(first, expected);

    // Unaligned span within the first sector.
    let mut middle = vec![0u8; 192];
    assert_eq!(volume.read(&mut middle, 4000).unwrap(), 192);
    assert_eq!(middle[..], expected[4000..4192]);

    assert_eq!(prompts, [0]);
}

#[test]
fn wrong_passphrase_surfaces_cleanly() {
    let mut source =
        |_user: usize| -> cskit::Result<Zeroizing<Vec<u8>>> { Ok(Zeroizing::new(b"hunter2".to_vec())) };

    let err = match UnlockedVolume::unlock(fixture_device(), &mut source) {
        Err(e) => e,
        Ok(_) => panic!("expected wrong passphrase error"),
    };
    assert!(matches!(err, Error::WrongPassphrase));

    // The message names neither the failing step nor any key bytes.
    assert_eq!(err.to_string(), "wrong passphrase");
}

#[test]
fn reads_clamp_to_volume_size() {
    let mut source = |_user: usize| -> cskit::Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(PASSPHRASE.to_vec()))
    };
    let mut volume = UnlockedVolume::unlock(fixture_device(), &mut source).unwrap();

    let mut buf = vec![0u8; 64];
    assert_eq!(volume.read(&mut buf, VOLUME_SIZE).unwrap(), 0);
    assert_eq!(volume.read(&mut buf, VOLUME_SIZE - 10).unwrap(), 10);
}

#[test]
fn non_core_storage_devices_are_rejected() {
    let mut source = |_user: usize| -> cskit::Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(PASSPHRASE.to_vec()))
    };
    let device = BlockDevice::new(MemIo {
        data: vec![0u8; 4096],
    });
    assert!(matches!(
        UnlockedVolume::unlock(device, &mut source),
        Err(Error::BadMagic)
    ));
}
