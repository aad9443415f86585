//! Sector-aligned access to raw block devices.
//!
//! Raw devices only accept reads that are aligned to - and a whole multiple
//! of - their sector size, which is not known until the device is open.
//! [`BlockDevice`] hides that: it discovers and caches the sector size on
//! first use and serves arbitrary `(offset, size)` reads by widening them to
//! an aligned window and copying the requested span back out.
//!
//! The low-level half is the [`RawIo`] capability, implemented here for
//! [`FileIo`] (regular files and, on Linux, block devices) and by in-memory
//! doubles in the test suite.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, trace};

use crate::{Error, Result};

/// Low-level sector I/O capability.
pub trait RawIo {
    /// The device's sector size in bytes. Never zero.
    fn raw_sector_size(&self) -> Result<u32>;

    /// Read at `offset` into `buf`; the caller guarantees both are
    /// sector-aligned. Returns the bytes read; short only at end of device.
    fn raw_read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// A raw device wrapped with alignment handling.
pub struct BlockDevice<R> {
    raw: R,
    /// Discovered on first use, then immutable for the handle's life.
    sector_size: Option<u32>,
}

impl<R: RawIo> BlockDevice<R> {
    pub fn new(raw: R) -> Self {
        BlockDevice {
            raw,
            sector_size: None,
        }
    }

    /// The cached sector size, queried from the device on first call.
    pub fn sector_size(&mut self) -> Result<u32> {
        if let Some(s) = self.sector_size {
            return Ok(s);
        }
        let s = self.raw.raw_sector_size()?;
        if s == 0 {
            return Err(Error::SectorSize);
        }
        debug!("sector size: {s}");
        self.sector_size = Some(s);
        Ok(s)
    }

    /// Read `buf.len()` bytes at an arbitrary `offset`.
    ///
    /// Returns the bytes delivered; fewer than requested only at end of
    /// device.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sector = u64::from(self.sector_size()?);
        let size = buf.len() as u64;

        let lead = offset % sector;
        let mut real = size + lead;
        if (offset + size) % sector != 0 {
            real += sector - ((offset + size) % sector);
        }

        trace!(
            "read: requested offset={offset} size={size}, aligned offset={} size={real}",
            offset - lead
        );

        let mut scratch = vec![0u8; real as usize];
        let got = self.raw.raw_read(&mut scratch, offset - lead)?;
        if got as u64 <= lead {
            return Ok(0);
        }

        let usable = ((got as u64 - lead) as usize).min(buf.len());
        buf[..usable].copy_from_slice(&scratch[lead as usize..lead as usize + usable]);
        Ok(usable)
    }

    /// Read exactly `buf.len()` bytes at `offset`, or fail with
    /// [`Error::UnexpectedEof`].
    pub fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        if self.read(buf, offset)? != buf.len() {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }
}

impl BlockDevice<FileIo> {
    /// Open a device or image file by path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FileIo::open(path)?))
    }
}

/// [`RawIo`] over a [`File`].
///
/// On Linux block devices the sector size comes from the physical-sector
/// ioctl with a fallback to the logical one; regular files (disk images)
/// report 512.
pub struct FileIo {
    file: File,
}

impl FileIo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("opening: {}", path.as_ref().display());
        Ok(FileIo {
            file: File::open(path)?,
        })
    }
}

impl RawIo for FileIo {
    fn raw_sector_size(&self) -> Result<u32> {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::FileTypeExt;
            use std::os::unix::io::AsRawFd;

            let meta = self.file.metadata()?;
            if meta.file_type().is_block_device() {
                let fd = self.file.as_raw_fd();

                let mut physical: libc::c_uint = 0;
                if unsafe { libc::ioctl(fd, libc::BLKPBSZGET, &mut physical) } == 0
                    && physical != 0
                {
                    return Ok(physical);
                }

                debug!("physical sector query failed, falling back to logical");
                let mut logical: libc::c_int = 0;
                if unsafe { libc::ioctl(fd, libc::BLKSSZGET, &mut logical) } == 0 && logical > 0 {
                    return Ok(logical as u32);
                }

                return Err(Error::SectorSize);
            }
        }

        if self.file.metadata()?.is_file() {
            // Disk images behave like a 512-byte-sector device.
            return Ok(512);
        }
        Err(Error::SectorSize)
    }

    fn raw_read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}
