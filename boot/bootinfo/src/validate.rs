//! # Validation and Error Handling
//!
//! Header validation and the error types of the decoder.
//!
//! Errors come in two tiers:
//!
//! - [`TagDefect`]: a single tag is malformed. Never fatal; the tag is
//!   treated as absent.
//! - [`ParseError`]: the document as a whole cannot be trusted. Fatal; no
//!   partial result is produced.

use core::fmt;

use crate::layout::{BootHeader, TagHeader};
use crate::{BOOT_MAGIC, MAX_TOTAL_SIZE, PROTOCOL_VERSION};

// =============================================================================
// Header Errors
// =============================================================================

/// Reasons the fixed boot header is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HeaderError {
    /// The boot information pointer is null
    NullPointer,

    /// Fewer bytes than a full header are available
    Truncated {
        /// Bytes available
        available: usize,
    },

    /// The magic number does not identify a DeltaBoot blob
    InvalidMagic {
        /// The value found
        found: u32,
    },

    /// `total_size` cannot hold the header and an end tag
    TotalSizeTooSmall {
        /// The reported size
        size: u32,
    },

    /// `total_size` exceeds the sanity ceiling
    TotalSizeTooLarge {
        /// The reported size
        size: u32,
    },

    /// `total_size` claims more bytes than the caller supplied
    TotalSizeExceedsBuffer {
        /// The reported size
        size: u32,
        /// Bytes actually available
        available: usize,
    },

    /// The blob was built for a protocol version older than we understand
    UnsupportedVersion {
        /// The reported version
        version: u32,
    },

    /// The reserved field is not zero
    ReservedNotZero {
        /// The value found
        value: u32,
    },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullPointer => write!(f, "boot info pointer is null"),
            Self::Truncated { available } => {
                write!(f, "only {} bytes available, header needs {}", available, BootHeader::SIZE)
            }
            Self::InvalidMagic { found } => {
                write!(f, "invalid magic: expected {:#010x}, got {:#010x}", BOOT_MAGIC, found)
            }
            Self::TotalSizeTooSmall { size } => {
                write!(f, "total size {} bytes cannot hold header and end tag", size)
            }
            Self::TotalSizeTooLarge { size } => {
                write!(f, "total size {} bytes exceeds {} byte limit", size, MAX_TOTAL_SIZE)
            }
            Self::TotalSizeExceedsBuffer { size, available } => {
                write!(f, "total size {} bytes exceeds the {} bytes supplied", size, available)
            }
            Self::UnsupportedVersion { version } => {
                write!(f, "protocol version {:#x} older than {:#x}", version, PROTOCOL_VERSION)
            }
            Self::ReservedNotZero { value } => {
                write!(f, "reserved field is {:#x}, must be 0", value)
            }
        }
    }
}

// =============================================================================
// Parse Errors
// =============================================================================

/// Document-level defects that abort the whole parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The header failed validation
    InvalidHeader(HeaderError),

    /// The tag list ended without an end tag
    MissingEndTag,

    /// No valid memory map tag was found
    MissingMemoryMap,

    /// More tags than the limit were visited
    TooManyTags {
        /// The limit that was exceeded
        limit: u32,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader(e) => write!(f, "invalid boot header: {}", e),
            Self::MissingEndTag => write!(f, "end tag not found"),
            Self::MissingMemoryMap => write!(f, "no valid memory map tag"),
            Self::TooManyTags { limit } => write!(f, "more than {} tags", limit),
        }
    }
}

impl From<HeaderError> for ParseError {
    fn from(e: HeaderError) -> Self {
        Self::InvalidHeader(e)
    }
}

// =============================================================================
// Tag Defects
// =============================================================================

/// Reasons a single tag is skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagDefect {
    /// Tag type is unknown, vendor-specific or not decoded by this build
    Unrecognized,

    /// The tag's claimed size runs past the end of the blob
    OutOfBounds {
        /// Tag offset
        offset: usize,
        /// Claimed size
        size: u32,
    },

    /// The tag is smaller than its kind requires
    TooSmall {
        /// Claimed size
        size: u32,
        /// Minimum for this kind
        minimum: u32,
    },

    /// A field that must be non-zero is zero
    ZeroField(&'static str),

    /// A string field has no terminating zero byte
    Unterminated,

    /// Memory map entries are narrower than an entry record
    EntrySizeTooSmall {
        /// Declared entry size
        entry_size: u32,
    },

    /// Memory map entries do not fit inside the tag
    EntriesOverflow {
        /// Declared entry size
        entry_size: u32,
        /// Declared entry count
        entry_count: u32,
    },
}

impl fmt::Display for TagDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized => write!(f, "unrecognized tag type"),
            Self::OutOfBounds { offset, size } => {
                write!(f, "tag at offset {} with size {} extends beyond boot info", offset, size)
            }
            Self::TooSmall { size, minimum } => {
                write!(f, "size {} below minimum {}", size, minimum)
            }
            Self::ZeroField(field) => write!(f, "{} is zero", field),
            Self::Unterminated => write!(f, "string is not null-terminated"),
            Self::EntrySizeTooSmall { entry_size } => {
                write!(f, "entry size {} below minimum", entry_size)
            }
            Self::EntriesOverflow { entry_size, entry_count } => {
                write!(f, "{} entries of {} bytes do not fit in tag", entry_count, entry_size)
            }
        }
    }
}

// =============================================================================
// Result Type
// =============================================================================

/// Result type for header validation
pub type ValidationResult<T> = Result<T, HeaderError>;

// =============================================================================
// Validation Functions
// =============================================================================

/// Smallest blob: the header itself plus an end tag
const MIN_TOTAL_SIZE: u32 = (BootHeader::SIZE + TagHeader::SIZE) as u32;

/// Check the fields of an already-decoded header
///
/// Independent of how many bytes back the header; see [`validate_header`]
/// for the slice form.
pub fn validate_fields(header: &BootHeader) -> ValidationResult<()> {
    if header.magic != BOOT_MAGIC {
        return Err(HeaderError::InvalidMagic { found: header.magic });
    }

    if header.total_size < MIN_TOTAL_SIZE {
        return Err(HeaderError::TotalSizeTooSmall { size: header.total_size });
    }

    if header.total_size > MAX_TOTAL_SIZE {
        return Err(HeaderError::TotalSizeTooLarge { size: header.total_size });
    }

    if header.version < PROTOCOL_VERSION {
        return Err(HeaderError::UnsupportedVersion { version: header.version });
    }

    if header.reserved != 0 {
        return Err(HeaderError::ReservedNotZero { value: header.reserved });
    }

    Ok(())
}

/// Validate the boot header at the start of `bytes`
///
/// # Returns
///
/// The decoded header if it is sane and `total_size` fits inside `bytes`.
pub fn validate_header(bytes: &[u8]) -> ValidationResult<BootHeader> {
    let header = BootHeader::from_bytes(bytes)
        .ok_or(HeaderError::Truncated { available: bytes.len() })?;

    validate_fields(&header)?;

    if header.total_size as usize > bytes.len() {
        return Err(HeaderError::TotalSizeExceedsBuffer {
            size: header.total_size,
            available: bytes.len(),
        });
    }

    Ok(header)
}

/// Whether `bytes` starts with a trustworthy boot header
///
/// Usable on its own for an early fail-fast check.
#[must_use]
pub fn is_valid(bytes: &[u8]) -> bool {
    validate_header(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::header_bytes;

    #[test]
    fn test_valid_header() {
        let mut bytes = header_bytes(BOOT_MAGIC, 24, 1, 0);
        bytes.extend_from_slice(&[0u8; 8]);
        let header = validate_header(&bytes).unwrap();
        assert_eq!(header.total_size, 24);
        assert!(is_valid(&bytes));
    }

    #[test]
    fn test_newer_version_accepted() {
        let mut bytes = header_bytes(BOOT_MAGIC, 24, 7, 0);
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(is_valid(&bytes));
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (header_bytes(0xDEAD_BEEF, 24, 1, 0), HeaderError::InvalidMagic { found: 0xDEAD_BEEF }),
            (header_bytes(BOOT_MAGIC, 23, 1, 0), HeaderError::TotalSizeTooSmall { size: 23 }),
            (
                header_bytes(BOOT_MAGIC, MAX_TOTAL_SIZE + 1, 1, 0),
                HeaderError::TotalSizeTooLarge { size: MAX_TOTAL_SIZE + 1 },
            ),
            (header_bytes(BOOT_MAGIC, 24, 0, 0), HeaderError::UnsupportedVersion { version: 0 }),
            (header_bytes(BOOT_MAGIC, 24, 1, 1), HeaderError::ReservedNotZero { value: 1 }),
        ];

        for (mut bytes, expected) in cases {
            bytes.extend_from_slice(&[0u8; 8]);
            assert_eq!(validate_header(&bytes), Err(expected));
            assert!(!is_valid(&bytes));
        }
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(validate_header(&[]), Err(HeaderError::Truncated { available: 0 }));
        assert_eq!(validate_header(&[0u8; 12]), Err(HeaderError::Truncated { available: 12 }));
    }

    #[test]
    fn test_total_size_beyond_buffer() {
        let bytes = header_bytes(BOOT_MAGIC, 64, 1, 0);
        assert_eq!(
            validate_header(&bytes),
            Err(HeaderError::TotalSizeExceedsBuffer { size: 64, available: 16 })
        );
    }

    #[test]
    fn test_error_display() {
        let e = ParseError::from(HeaderError::ReservedNotZero { value: 1 });
        let s = format!("{}", e);
        assert!(s.contains("reserved"));
        assert_eq!(format!("{}", ParseError::TooManyTags { limit: 1000 }), "more than 1000 tags");
    }
}
