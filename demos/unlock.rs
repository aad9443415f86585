//! Unlock a Core Storage volume and read its first bytes.
//!
//! Usage: `unlock <device-or-image>`
//!
//! Prompts for a passphrase (with local echo suppressed) and, on success,
//! prints the recovered volume identity and a short hexdump of the start of
//! the decrypted logical volume.

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use cskit::device::BlockDevice;
use cskit::utils::format_uuid;
use cskit::volume::{Probe, UnlockedVolume, probe};
use cskit::{Error, Result};
use zeroize::Zeroizing;

const MAX_ATTEMPTS: u32 = 3;

fn main() {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: unlock <device>");
        process::exit(1);
    };

    match run(&path) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(exit_code(&e));
        }
    }
}

fn run(path: &str) -> Result<i32> {
    let mut device = match BlockDevice::open(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("cannot open {path}: {e}");
            return Ok(1);
        }
    };

    let mut sector0 = [0u8; 512];
    device.read_exact_at(&mut sector0, 0)?;
    match probe(&sector0) {
        Probe::CoreStorage => {}
        Probe::Ntfs => {
            println!("{path}: NTFS filesystem; nothing to unlock");
            return Ok(0);
        }
        Probe::Unknown => {
            eprintln!("{path}: no Core Storage signature");
            return Ok(7);
        }
    }

    for attempt in 1..=MAX_ATTEMPTS {
        let mut source = |user: usize| prompt_passphrase(user);
        match UnlockedVolume::unlock(device, &mut source) {
            Ok(mut volume) => {
                report(&mut volume)?;
                return Ok(0);
            }
            Err(Error::WrongPassphrase) if attempt < MAX_ATTEMPTS => {
                eprintln!("wrong passphrase");
                device = BlockDevice::open(path)?;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("the final attempt returns or errors");
}

fn report<R: cskit::device::RawIo>(volume: &mut UnlockedVolume<R>) -> Result<()> {
    let info = volume.info();
    println!("physical volume : {}", format_uuid(&info.physical_uuid));
    println!("volume group    : {}", format_uuid(&info.group_uuid));
    println!("volume family   : {}", format_uuid(&info.family_uuid));
    println!("logical volume  : {}", format_uuid(&info.logical_uuid));
    println!("volume size     : {} bytes", info.volume_size);
    println!(
        "extent          : {} blocks of {} from block {}",
        info.blocks, info.block_size, info.first_block
    );

    let mut head = [0u8; 32];
    let got = volume.read(&mut head, 0)?;
    let hex: Vec<String> = head[..got].iter().map(|b| format!("{b:02x}")).collect();
    println!("first bytes     : {}", hex.join(" "));
    Ok(())
}

fn prompt_passphrase(user: usize) -> Result<Zeroizing<Vec<u8>>> {
    print!("passphrase for crypto user {user}: ");
    io::stdout().flush()?;

    let guard = EchoGuard::suppress();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    drop(guard);
    println!();

    let mut bytes = std::mem::take(&mut line).into_bytes();
    while bytes.last().is_some_and(|b| matches!(b, b'\n' | b'\r')) {
        bytes.pop();
    }
    Ok(Zeroizing::new(bytes))
}

/// Suppresses terminal echo for its lifetime; restores the previous mode on
/// drop. A non-terminal stdin (piped input) is left untouched.
#[cfg(unix)]
struct EchoGuard {
    original: Option<libc::termios>,
}

#[cfg(unix)]
impl EchoGuard {
    fn suppress() -> Self {
        unsafe {
            let mut term = std::mem::zeroed::<libc::termios>();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut term) == 0 {
                let original = term;
                term.c_lflag &= !libc::ECHO;
                if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) == 0 {
                    return EchoGuard {
                        original: Some(original),
                    };
                }
            }
            EchoGuard { original: None }
        }
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &original);
            }
        }
    }
}

#[cfg(not(unix))]
struct EchoGuard;

#[cfg(not(unix))]
impl EchoGuard {
    fn suppress() -> Self {
        EchoGuard
    }
}

fn exit_code(e: &Error) -> i32 {
    match e {
        Error::SectorSize => 2,
        Error::Io(_) => 4,
        Error::UnexpectedEof => 5,
        Error::UnknownBlockType(_) => 6,
        Error::BadMagic | Error::Parse(_) | Error::InvalidRange => 7,
        _ => 1,
    }
}
