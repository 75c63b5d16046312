//! # File Header and Streaming Footer
//!
//! Type-safe, zerocopy-based structs for the two bit-exact on-disk records
//! of the database file format.
//!
//! ## Header Layout (24 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  -------------------------------------------
//! 0       8     top_ref[0]
//! 8       8     top_ref[1]
//! 16      4     mnemonic "T-DB"
//! 20      2     file_format_version[2] (one slot per top-ref)
//! 22      1     reserved = 0
//! 23      1     flags: bit 0 selects the live top-ref slot,
//!               bit 1 = server-sync-mode persistent logs
//! ```
//!
//! ## Streaming Footer (16 bytes)
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  -------------------------------------------
//! 0       8     top_ref
//! 8       8     magic cookie 0x3034125237E526C8
//! ```
//!
//! A file whose selected header top-ref is zero and which ends with a valid
//! footer is in *streaming form*: the live top-ref is in the footer, and the
//! file must be converted (header rewritten) before in-place update.
//!
//! ## Endianness
//!
//! All multi-byte fields are little-endian; the zerocopy `U64<LittleEndian>`
//! type handles conversion, and `Unaligned` allows reading straight out of a
//! memory mapping.

use eyre::{ensure, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::CoreError;

pub const HEADER_MNEMONIC: [u8; 4] = *b"T-DB";
pub const HEADER_SIZE: usize = 24;
pub const FOOTER_SIZE: usize = 16;
pub const FOOTER_MAGIC_COOKIE: u64 = 0x3034_1252_37E5_26C8;

/// Current default file format version: 3 with null-in-string support.
pub const DEFAULT_FILE_FORMAT_VERSION: u8 = 3;
const SUPPORTED_FILE_FORMAT_VERSIONS: [u8; 2] = [2, 3];

pub const FLAGS_SELECT_BIT: u8 = 1;
pub const FLAGS_SERVER_SYNC_MODE: u8 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    top_ref: [U64; 2],
    mnemonic: [u8; 4],
    file_format_version: [u8; 2],
    reserved: u8,
    flags: u8,
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == HEADER_SIZE);

impl FileHeader {
    /// Header of a freshly created, empty file.
    pub fn new_empty(server_sync_mode: bool) -> Self {
        Self {
            top_ref: [U64::new(0), U64::new(0)],
            mnemonic: HEADER_MNEMONIC,
            file_format_version: [DEFAULT_FILE_FORMAT_VERSION; 2],
            reserved: 0,
            flags: if server_sync_mode {
                FLAGS_SERVER_SYNC_MODE
            } else {
                0
            },
        }
    }

    /// Header written when converting a streaming-form file for in-place
    /// update: the live top-ref moves into slot 0 and the select bit clears.
    pub fn new_converted(top_ref: u64, server_sync_mode: bool) -> Self {
        let mut header = Self::new_empty(server_sync_mode);
        header.top_ref[0] = U64::new(top_ref);
        header
    }

    /// Reads a header without any validation. The buffer must hold at least
    /// `HEADER_SIZE` bytes.
    pub fn from_bytes_unchecked(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= HEADER_SIZE,
            CoreError::InvalidDatabase(format!(
                "file too small for header: {} < {}",
                bytes.len(),
                HEADER_SIZE
            ))
        );
        Self::ref_from_bytes(&bytes[..HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read file header: {:?}", e))
    }

    /// Reads and validates a header: mnemonic and selected format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::from_bytes_unchecked(bytes)?;

        ensure!(
            header.mnemonic == HEADER_MNEMONIC,
            CoreError::InvalidDatabase("bad mnemonic, not a database file".into())
        );

        let version = header.file_format_version();
        ensure!(
            SUPPORTED_FILE_FORMAT_VERSIONS.contains(&version),
            CoreError::InvalidDatabase(format!(
                "unsupported file format version {}",
                version
            ))
        );

        Ok(header)
    }

    pub fn select_slot(&self) -> usize {
        (self.flags & FLAGS_SELECT_BIT) as usize
    }

    /// The live top-ref, per the select bit.
    pub fn top_ref(&self) -> u64 {
        self.top_ref[self.select_slot()].get()
    }

    pub fn top_ref_slot(&self, slot: usize) -> u64 {
        self.top_ref[slot].get()
    }

    pub fn file_format_version(&self) -> u8 {
        self.file_format_version[self.select_slot()]
    }

    pub fn server_sync_mode(&self) -> bool {
        self.flags & FLAGS_SERVER_SYNC_MODE != 0
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StreamingFooter {
    top_ref: U64,
    magic_cookie: U64,
}

const _: () = assert!(std::mem::size_of::<StreamingFooter>() == FOOTER_SIZE);

impl StreamingFooter {
    pub fn new(top_ref: u64) -> Self {
        Self {
            top_ref: U64::new(top_ref),
            magic_cookie: U64::new(FOOTER_MAGIC_COOKIE),
        }
    }

    /// Reads the footer from the end of `bytes`, if one is present and its
    /// magic cookie matches.
    pub fn from_file_tail(bytes: &[u8]) -> Option<&Self> {
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return None;
        }
        let tail = &bytes[bytes.len() - FOOTER_SIZE..];
        let footer = Self::ref_from_bytes(tail).ok()?;
        (footer.magic_cookie.get() == FOOTER_MAGIC_COOKIE).then_some(footer)
    }

    pub fn top_ref(&self) -> u64 {
        self.top_ref.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_24() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 24);
    }

    #[test]
    fn footer_size_is_16() {
        assert_eq!(std::mem::size_of::<StreamingFooter>(), 16);
    }

    #[test]
    fn empty_header_round_trips() {
        let header = FileHeader::new_empty(false);
        let parsed = FileHeader::from_bytes(header.as_bytes()).unwrap();
        assert_eq!(parsed.top_ref(), 0);
        assert_eq!(parsed.file_format_version(), DEFAULT_FILE_FORMAT_VERSION);
        assert!(!parsed.server_sync_mode());
    }

    #[test]
    fn server_sync_mode_sets_flag_bit() {
        let header = FileHeader::new_empty(true);
        assert_eq!(header.flags() & FLAGS_SERVER_SYNC_MODE, FLAGS_SERVER_SYNC_MODE);
        assert!(header.server_sync_mode());
    }

    #[test]
    fn rejects_bad_mnemonic() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..HEADER_SIZE].copy_from_slice(FileHeader::new_empty(false).as_bytes());
        bytes[16] = b'X';
        let err = FileHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InvalidDatabase(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(FileHeader::new_empty(false).as_bytes());
        bytes[20] = 99;
        assert!(FileHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = [0u8; 10];
        assert!(FileHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn converted_header_puts_top_ref_in_slot_zero() {
        let header = FileHeader::new_converted(4096, false);
        assert_eq!(header.select_slot(), 0);
        assert_eq!(header.top_ref(), 4096);
    }

    #[test]
    fn footer_detected_only_with_magic() {
        let mut file = Vec::new();
        file.extend_from_slice(FileHeader::new_empty(false).as_bytes());
        file.extend_from_slice(&[0u8; 8]);
        file.extend_from_slice(StreamingFooter::new(24).as_bytes());

        let footer = StreamingFooter::from_file_tail(&file).unwrap();
        assert_eq!(footer.top_ref(), 24);

        let len = file.len();
        file[len - 1] ^= 0xFF;
        assert!(StreamingFooter::from_file_tail(&file).is_none());
    }
}
