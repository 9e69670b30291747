//! Host-side blob construction for unit tests.

use crate::{tag_types, BOOT_MAGIC, PROTOCOL_VERSION};

/// Encode a raw boot header
pub fn header_bytes(magic: u32, total_size: u32, version: u32, reserved: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&magic.to_le_bytes());
    bytes.extend_from_slice(&total_size.to_le_bytes());
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&reserved.to_le_bytes());
    bytes
}

/// Encode one memory map entry
pub fn mmap_entry(base: u64, length: u64, region_type: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&base.to_le_bytes());
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&region_type.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

/// Assembles a boot blob tag by tag, padding each tag to 8 bytes
///
/// `total_size` is patched in by [`BlobBuilder::build`] unless overridden.
pub struct BlobBuilder {
    bytes: Vec<u8>,
    total_size: Option<u32>,
}

impl BlobBuilder {
    pub fn new() -> Self {
        Self {
            bytes: header_bytes(BOOT_MAGIC, 0, PROTOCOL_VERSION, 0),
            total_size: None,
        }
    }

    /// Force the header's `total_size` instead of the real length
    pub fn total_size(mut self, size: u32) -> Self {
        self.total_size = Some(size);
        self
    }

    /// Overwrite the header's reserved field
    pub fn reserved(mut self, value: u32) -> Self {
        self.bytes[12..16].copy_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a tag whose `size` field is exactly header + payload
    pub fn tag(self, tag_type: u16, payload: &[u8]) -> Self {
        let size = 8 + payload.len() as u32;
        self.tag_with_size(tag_type, size, payload)
    }

    /// Append a tag with an arbitrary declared `size`
    pub fn tag_with_size(mut self, tag_type: u16, size: u32, payload: &[u8]) -> Self {
        self.bytes.extend_from_slice(&tag_type.to_le_bytes());
        self.bytes.extend_from_slice(&0u16.to_le_bytes());
        self.bytes.extend_from_slice(&size.to_le_bytes());
        self.bytes.extend_from_slice(payload);
        while self.bytes.len() % 8 != 0 {
            self.bytes.push(0);
        }
        self
    }

    /// Append a memory map tag with standard 24-byte entries
    pub fn memory_map(self, entries: &[(u64, u64, u32)]) -> Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&24u32.to_le_bytes());
        payload.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for &(base, length, region_type) in entries {
            payload.extend_from_slice(&mmap_entry(base, length, region_type));
        }
        self.tag(tag_types::MEMORY_MAP, &payload)
    }

    /// Append a null-terminated string tag
    pub fn string(self, tag_type: u16, s: &str) -> Self {
        let mut payload = s.as_bytes().to_vec();
        payload.push(0);
        self.tag(tag_type, &payload)
    }

    /// Append a tag with an 8-byte address payload
    pub fn address(self, tag_type: u16, address: u64) -> Self {
        self.tag(tag_type, &address.to_le_bytes())
    }

    /// Append an end tag
    pub fn end(self) -> Self {
        self.tag(tag_types::END, &[])
    }

    pub fn build(mut self) -> Vec<u8> {
        let size = self.total_size.unwrap_or(self.bytes.len() as u32);
        self.bytes[4..8].copy_from_slice(&size.to_le_bytes());
        self.bytes
    }
}

/// A blob holding a single usable region of `length` bytes and an end tag
pub fn minimal_blob(length: u64) -> Vec<u8> {
    BlobBuilder::new()
        .memory_map(&[(0, length, 1)])
        .end()
        .build()
}
