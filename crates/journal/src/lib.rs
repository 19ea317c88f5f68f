#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Crash-safe checkpoint journal for the listing continuation marker.
//!
//! The journal is a single preallocated file holding one marker in a
//! double-buffered pair of slots. A 64-byte flag region names the slot that
//! is authoritative; the other slot is scratch space for the next commit.
//!
//! # File Layout
//!
//! ```text
//! offset    0  ┌─────────────────────┐
//!              │ flag      (64 B)    │  byte 0: 0x00 = slot A, 0x01 = slot B
//! offset   64  ├─────────────────────┤
//!              │ slot A  (2048 B)    │  u32-LE length + UTF-8 marker + zero pad
//! offset 2112  ├─────────────────────┤
//!              │ slot B  (2048 B)    │  same encoding
//!              └─────────────────────┘
//! ```
//!
//! # Commit Protocol
//!
//! [`Journal::commit`] writes the new marker into the inactive slot, makes
//! that write durable, and only then rewrites the flag region to name it.
//! The flag rewrite is one fixed-size write at a fixed offset: it lands
//! entirely or not at all, so a crash at any point leaves the file
//! describing either the previous marker or the new one, never a torn
//! mixture. Loading reads the flag, then only the slot it names; whatever a
//! crash left in the inactive slot is never inspected.
//!
//! The journal has a single writer. Nothing here locks; callers must not
//! commit from two threads.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const FLAG_LEN: usize = 64;
const SLOT_LEN: usize = 2048;
const LEN_PREFIX: usize = size_of::<u32>();
const FLAG_OFFSET: u64 = 0;
const SLOT_OFFSETS: [u64; 2] = [FLAG_LEN as u64, (FLAG_LEN + SLOT_LEN) as u64];
const FILE_LEN: u64 = (FLAG_LEN + 2 * SLOT_LEN) as u64;

/// Longest marker (in bytes) a slot can hold after its length prefix.
pub const MAX_MARKER_LEN: usize = SLOT_LEN - LEN_PREFIX;

/// Errors surfaced by [`Journal`] operations.
///
/// [`JournalError::Corrupt`] at open time is fatal to a run: resuming from a
/// journal that cannot be trusted would silently restart the migration from
/// an arbitrary position.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying file I/O failed.
    #[error("journal I/O error at {}: {source}", path.display())]
    Io {
        /// Journal file path.
        path: PathBuf,
        /// The failed operation's error.
        #[source]
        source: io::Error,
    },

    /// Persisted journal data is malformed.
    #[error("journal {} is corrupt: {detail}", path.display())]
    Corrupt {
        /// Journal file path.
        path: PathBuf,
        /// What was malformed.
        detail: String,
    },

    /// Marker exceeds the fixed slot capacity.
    #[error("marker of {len} bytes exceeds the {MAX_MARKER_LEN}-byte slot capacity")]
    MarkerTooLong {
        /// Byte length of the rejected marker.
        len: usize,
    },
}

/// Identifies one of the two marker slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

impl Slot {
    fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn offset(self) -> u64 {
        SLOT_OFFSETS[self as usize]
    }

    fn flag_byte(self) -> u8 {
        self as u8
    }

    fn from_flag_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }
}

/// Durable, crash-safe store of the last-committed continuation marker.
///
/// Opening an absent file creates it with both slots empty and slot A
/// active, so a fresh journal loads as the empty marker ("start of
/// listing").
#[derive(Debug)]
pub struct Journal {
    file: File,
    path: PathBuf,
    active: Slot,
    marker: String,
}

impl Journal {
    /// Opens the journal at `path`, creating and initializing it when absent.
    ///
    /// # Errors
    ///
    /// [`JournalError::Corrupt`] when an existing file is truncated, names an
    /// unknown slot, or holds a malformed active marker; [`JournalError::Io`]
    /// for filesystem failures.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => Self::create(file, path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Self::load(path),
            Err(source) => Err(JournalError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn create(mut file: File, path: &Path) -> Result<Self, JournalError> {
        file.set_len(FILE_LEN).map_err(|source| io_error(path, source))?;
        write_slot(&mut file, path, Slot::A, "")?;
        write_slot(&mut file, path, Slot::B, "")?;
        write_flag(&mut file, path, Slot::A)?;
        file.sync_all().map_err(|source| io_error(path, source))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            active: Slot::A,
            marker: String::new(),
        })
    }

    fn load(path: &Path) -> Result<Self, JournalError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| io_error(path, source))?;

        let mut flag = [0_u8; FLAG_LEN];
        file.seek(SeekFrom::Start(FLAG_OFFSET))
            .map_err(|source| io_error(path, source))?;
        read_region(&mut file, path, &mut flag, "flag region")?;

        let active = Slot::from_flag_byte(flag[0]).ok_or_else(|| JournalError::Corrupt {
            path: path.to_path_buf(),
            detail: format!("flag byte {:#04x} names no slot", flag[0]),
        })?;

        let marker = read_slot(&mut file, path, active)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            active,
            marker,
        })
    }

    /// The marker loaded at open time or set by the last [`commit`].
    ///
    /// [`commit`]: Journal::commit
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably records `marker` as the new resume position.
    ///
    /// The inactive slot is written and synced before the flag flips, so an
    /// interrupted commit never disturbs the previously committed marker.
    ///
    /// # Errors
    ///
    /// [`JournalError::MarkerTooLong`] leaves the journal untouched;
    /// [`JournalError::Io`] may leave the inactive slot partially written,
    /// which the next load ignores.
    pub fn commit(&mut self, marker: &str) -> Result<(), JournalError> {
        if marker.len() > MAX_MARKER_LEN {
            return Err(JournalError::MarkerTooLong { len: marker.len() });
        }

        let target = self.active.other();
        write_slot(&mut self.file, &self.path, target, marker)?;
        self.file
            .sync_data()
            .map_err(|source| io_error(&self.path, source))?;

        // Slot contents are durable; the flag flip is the commit point.
        write_flag(&mut self.file, &self.path, target)?;
        self.file
            .sync_data()
            .map_err(|source| io_error(&self.path, source))?;

        self.active = target;
        self.marker = marker.to_owned();
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> JournalError {
    JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_region(
    file: &mut File,
    path: &Path,
    buf: &mut [u8],
    what: &str,
) -> Result<(), JournalError> {
    file.read_exact(buf).map_err(|source| {
        if source.kind() == ErrorKind::UnexpectedEof {
            JournalError::Corrupt {
                path: path.to_path_buf(),
                detail: format!("file shorter than its fixed layout ({what})"),
            }
        } else {
            io_error(path, source)
        }
    })
}

fn read_slot(file: &mut File, path: &Path, slot: Slot) -> Result<String, JournalError> {
    let mut buf = [0_u8; SLOT_LEN];
    file.seek(SeekFrom::Start(slot.offset()))
        .map_err(|source| io_error(path, source))?;
    read_region(file, path, &mut buf, "marker slot")?;

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_MARKER_LEN {
        return Err(JournalError::Corrupt {
            path: path.to_path_buf(),
            detail: format!("slot length {len} exceeds the {MAX_MARKER_LEN}-byte capacity"),
        });
    }

    String::from_utf8(buf[LEN_PREFIX..LEN_PREFIX + len].to_vec()).map_err(|_| {
        JournalError::Corrupt {
            path: path.to_path_buf(),
            detail: "active marker is not valid UTF-8".to_owned(),
        }
    })
}

fn write_slot(file: &mut File, path: &Path, slot: Slot, marker: &str) -> Result<(), JournalError> {
    let bytes = marker.as_bytes();
    debug_assert!(bytes.len() <= MAX_MARKER_LEN);

    let mut buf = [0_u8; SLOT_LEN];
    buf[..LEN_PREFIX].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf[LEN_PREFIX..LEN_PREFIX + bytes.len()].copy_from_slice(bytes);

    file.seek(SeekFrom::Start(slot.offset()))
        .map_err(|source| io_error(path, source))?;
    file.write_all(&buf)
        .map_err(|source| io_error(path, source))
}

fn write_flag(file: &mut File, path: &Path, slot: Slot) -> Result<(), JournalError> {
    let mut buf = [0_u8; FLAG_LEN];
    buf[0] = slot.flag_byte();

    file.seek(SeekFrom::Start(FLAG_OFFSET))
        .map_err(|source| io_error(path, source))?;
    file.write_all(&buf)
        .map_err(|source| io_error(path, source))
}
