//! # DeltaBoot Wire Layouts
//!
//! Fixed-size records of the DeltaBoot protocol.
//!
//! All records are little-endian and densely packed. The `#[repr(C)]`
//! structs below document the layout and are checked against the protocol
//! sizes at compile time; decoding always goes through `from_le_bytes`, so
//! no record is ever read through a cast pointer.
//!
//! ## Boot Information Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ magic: u32          (0x44424F4B)   │ Offset 0
//! │ total_size: u32                    │ Offset 4
//! │ version: u32        (>= 0x0001)    │ Offset 8
//! │ reserved: u32       (0)            │ Offset 12
//! ├────────────────────────────────────┤
//! │ Tag: type u16, flags u16, size u32 │ Offset 16
//! │      payload...                    │
//! ├────────────────────────────────────┤ ← Padding to 8-byte alignment
//! │ Tag ...                            │
//! ├────────────────────────────────────┤
//! │ End Tag: type=0, flags=0, size=8   │
//! └────────────────────────────────────┘
//! ```

use core::mem::{offset_of, size_of};

use static_assertions::const_assert_eq;

// =============================================================================
// Boot Header
// =============================================================================

/// The fixed record at the start of every boot blob
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootHeader {
    /// Protocol magic, must equal [`crate::BOOT_MAGIC`]
    pub magic: u32,
    /// Byte length of the whole blob, header included
    pub total_size: u32,
    /// Protocol version of the blob
    pub version: u32,
    /// Must be zero
    pub reserved: u32,
}

impl BootHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 16;

    /// Decode a header from the first [`Self::SIZE`] bytes of `bytes`
    ///
    /// Returns `None` if fewer than [`Self::SIZE`] bytes are available.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let header: &[u8; BootHeader::SIZE] = bytes.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self::from_array(header))
    }

    /// Decode a header from exactly [`Self::SIZE`] bytes
    #[must_use]
    pub const fn from_array(b: &[u8; BootHeader::SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            total_size: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            version: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            reserved: u32::from_le_bytes([b[12], b[13], b[14], b[15]]),
        }
    }
}

// =============================================================================
// Tag Header
// =============================================================================

/// The record prefixing every tag
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    /// Tag kind (see [`crate::tag_types`])
    pub tag_type: u16,
    /// Type-specific flags
    pub flags: u16,
    /// Total size of the tag including this header
    pub size: u32,
}

impl TagHeader {
    /// Size of the tag header in bytes
    pub const SIZE: usize = 8;

    /// Decode a tag header from exactly [`Self::SIZE`] bytes
    #[must_use]
    pub const fn from_array(b: &[u8; TagHeader::SIZE]) -> Self {
        Self {
            tag_type: u16::from_le_bytes([b[0], b[1]]),
            flags: u16::from_le_bytes([b[2], b[3]]),
            size: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    /// Payload length the header claims, if the size is sane
    #[must_use]
    pub const fn payload_len(&self) -> Option<u32> {
        self.size.checked_sub(Self::SIZE as u32)
    }
}

// =============================================================================
// Payload Records
// =============================================================================

/// One memory map entry as laid out on the wire
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMemoryMapEntry {
    /// Physical base address
    pub base: u64,
    /// Length in bytes
    pub length: u64,
    /// Region type
    pub region_type: u32,
    /// Region attributes
    pub attributes: u32,
}

impl RawMemoryMapEntry {
    /// Minimum entry size a memory map may declare
    pub const SIZE: usize = 24;
}

/// Framebuffer tag payload as laid out on the wire
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct RawFramebuffer {
    /// Physical address
    pub address: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per scanline
    pub pitch: u32,
    /// Bits per pixel
    pub bpp: u8,
    /// `{shift, size}` pairs for red, green, blue and reserved
    pub channels: [u8; 8],
    /// Padding up to an 8-byte multiple
    pub padding: [u8; 3],
}

impl RawFramebuffer {
    /// Size of the framebuffer payload in bytes
    pub const SIZE: usize = 32;
}

/// SMP tag payload head; CPU entries follow
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSmpHead {
    /// Number of CPU entries
    pub cpu_count: u32,
    /// APIC id of the bootstrap processor
    pub bsp_id: u32,
}

/// One SMP CPU entry as laid out on the wire
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCpu {
    /// CPU id
    pub id: u32,
    /// CPU flags
    pub flags: u32,
}

impl RawCpu {
    /// Size of one CPU entry in bytes
    pub const SIZE: usize = 8;
}

/// Initial ramdisk tag payload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInitrd {
    /// Physical start address
    pub start: u64,
    /// Length in bytes
    pub length: u64,
}

// =============================================================================
// Minimum Tag Sizes
// =============================================================================

/// Smallest valid `size` for each decoded tag kind, header included
pub mod min_size {
    use super::{RawFramebuffer, RawInitrd, RawSmpHead, TagHeader};
    use core::mem::size_of;

    /// Memory map: header + `entry_size` + `entry_count`
    pub const MEMORY_MAP: u32 = (TagHeader::SIZE + 8) as u32;
    /// Framebuffer: header + full payload
    pub const FRAMEBUFFER: u32 = (TagHeader::SIZE + RawFramebuffer::SIZE) as u32;
    /// ACPI RSDP: header + address
    pub const ACPI_RSDP: u32 = (TagHeader::SIZE + 8) as u32;
    /// SMP: header + `cpu_count` + `bsp_id`
    pub const SMP: u32 = (TagHeader::SIZE + size_of::<RawSmpHead>()) as u32;
    /// Initrd: header + start + length
    pub const INITRD: u32 = (TagHeader::SIZE + size_of::<RawInitrd>()) as u32;
    /// Strings need at least one payload byte for the terminator
    pub const STRING: u32 = (TagHeader::SIZE + 1) as u32;
}

// =============================================================================
// Compile-Time Assertions
// =============================================================================

const_assert_eq!(size_of::<BootHeader>(), BootHeader::SIZE);
const_assert_eq!(size_of::<TagHeader>(), TagHeader::SIZE);
const_assert_eq!(size_of::<RawMemoryMapEntry>(), RawMemoryMapEntry::SIZE);
const_assert_eq!(size_of::<RawFramebuffer>(), RawFramebuffer::SIZE);
const_assert_eq!(size_of::<RawSmpHead>(), 8);
const_assert_eq!(size_of::<RawCpu>(), RawCpu::SIZE);
const_assert_eq!(size_of::<RawInitrd>(), 16);
const_assert_eq!(min_size::FRAMEBUFFER, 40);

// Field offsets the decoders read by hand
const_assert_eq!(offset_of!(RawMemoryMapEntry, length), 8);
const_assert_eq!(offset_of!(RawMemoryMapEntry, region_type), 16);
const_assert_eq!(offset_of!(RawMemoryMapEntry, attributes), 20);
const_assert_eq!(offset_of!(RawFramebuffer, width), 8);
const_assert_eq!(offset_of!(RawFramebuffer, height), 12);
const_assert_eq!(offset_of!(RawFramebuffer, pitch), 16);
const_assert_eq!(offset_of!(RawFramebuffer, bpp), 20);
const_assert_eq!(offset_of!(RawFramebuffer, channels), 21);
const_assert_eq!(offset_of!(RawSmpHead, bsp_id), 4);
const_assert_eq!(offset_of!(RawCpu, flags), 4);
const_assert_eq!(offset_of!(RawInitrd, length), 8);
