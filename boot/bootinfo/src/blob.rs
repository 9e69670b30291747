//! # Boot Blob Arena
//!
//! The boot information as an immutable byte arena.
//!
//! A [`BootBlob`] is only constructed from a validated header and covers
//! exactly `total_size` bytes. Positions inside it are plain offsets; every
//! read is a checked slice access, so a bad offset yields `None` rather
//! than a read past the end.

use core::fmt;

use crate::layout::{BootHeader, TagHeader};
use crate::validate::{validate_header, ValidationResult};

// =============================================================================
// Boot Blob
// =============================================================================

/// Validated view over the boot information bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BootBlob<'boot> {
    /// Exactly `total_size` bytes, header included
    bytes: &'boot [u8],
    /// The validated header
    header: BootHeader,
}

impl<'boot> BootBlob<'boot> {
    /// Validate the header at the start of `bytes` and build the arena
    ///
    /// Bytes past `total_size` are ignored.
    ///
    /// # Errors
    ///
    /// Returns the header defect if the header is not trustworthy.
    pub fn new(bytes: &'boot [u8]) -> ValidationResult<Self> {
        let header = validate_header(bytes)?;
        Ok(Self {
            bytes: &bytes[..header.total_size as usize],
            header,
        })
    }

    /// The validated header
    #[must_use]
    pub const fn header(&self) -> &BootHeader {
        &self.header
    }

    /// Declared size of the blob in bytes
    #[must_use]
    pub const fn total_size(&self) -> u32 {
        self.header.total_size
    }

    /// All bytes of the blob
    #[must_use]
    pub const fn as_bytes(&self) -> &'boot [u8] {
        self.bytes
    }

    /// Borrow `len` bytes at `offset`, or `None` if any of them lie outside
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'boot [u8]> {
        let end = offset.checked_add(len)?;
        self.bytes.get(offset..end)
    }

    /// Read a tag header at `offset`
    #[must_use]
    pub fn tag_at(&self, offset: usize) -> Option<RawTag> {
        let bytes: &[u8; TagHeader::SIZE] = self.slice(offset, TagHeader::SIZE)?.try_into().ok()?;
        Some(RawTag {
            offset,
            header: TagHeader::from_array(bytes),
        })
    }

    /// The payload of `tag`, if its claimed size lies inside the blob
    #[must_use]
    pub fn payload(&self, tag: &RawTag) -> Option<&'boot [u8]> {
        let len = tag.header.payload_len()?;
        self.slice(tag.payload_offset()?, len as usize)
    }
}

impl fmt::Debug for BootBlob<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootBlob")
            .field("total_size", &self.header.total_size)
            .field("version", &self.header.version)
            .finish()
    }
}

// =============================================================================
// Raw Tag
// =============================================================================

/// A tag position whose 8 header bytes are known to be in bounds
///
/// Nothing beyond the header is guaranteed; the payload is fetched with
/// [`BootBlob::payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTag {
    /// Offset of the tag header from the start of the blob
    pub offset: usize,
    /// The decoded tag header
    pub header: TagHeader,
}

impl RawTag {
    /// Tag type
    #[must_use]
    pub const fn tag_type(&self) -> u16 {
        self.header.tag_type
    }

    /// Declared size including the header
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.header.size
    }

    /// Offset of the first payload byte, or `None` if it is not representable
    #[must_use]
    pub const fn payload_offset(&self) -> Option<usize> {
        self.offset.checked_add(TagHeader::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BlobBuilder;

    #[test]
    fn test_blob_trims_to_total_size() {
        let mut bytes = BlobBuilder::new().end().build();
        bytes.extend_from_slice(&[0xAA; 32]);
        let blob = BootBlob::new(&bytes).unwrap();
        assert_eq!(blob.as_bytes().len(), 24);
        assert_eq!(blob.total_size(), 24);
    }

    #[test]
    fn test_slice_bounds() {
        let bytes = BlobBuilder::new().end().build();
        let blob = BootBlob::new(&bytes).unwrap();
        assert!(blob.slice(16, 8).is_some());
        assert!(blob.slice(16, 9).is_none());
        assert!(blob.slice(usize::MAX, 2).is_none());
        assert!(blob.tag_at(17).is_none());
    }

    #[test]
    fn test_payload_bounds() {
        let bytes = BlobBuilder::new()
            .tag_with_size(0x8000, 4096, &[1, 2, 3, 4])
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let tag = blob.tag_at(16).unwrap();
        assert_eq!(tag.size(), 4096);
        assert!(blob.payload(&tag).is_none());
    }

    #[test]
    fn test_payload_offset_overflow() {
        let bytes = BlobBuilder::new().end().build();
        let blob = BootBlob::new(&bytes).unwrap();
        let tag = RawTag {
            offset: usize::MAX,
            header: TagHeader { tag_type: 5, flags: 0, size: 16 },
        };
        assert_eq!(tag.payload_offset(), None);
        assert!(blob.payload(&tag).is_none());
    }
}
