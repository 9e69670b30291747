//! # DeltaOS Boot Info - DeltaBoot Handoff Decoder
//!
//! This crate turns the single pointer a DeltaBoot bootloader hands to the
//! kernel into a validated, strongly-typed [`ParsedBootInfo`].
//!
//! ## Design Philosophy
//!
//! 1. **Bounds First**: The blob is an immutable byte arena; every read goes
//!    through an explicit bounds check, never through pointer arithmetic
//! 2. **Zero-Copy**: Parsed data borrows from the blob with the `'boot` lifetime
//! 3. **No Allocation**: Usable before any allocator exists
//! 4. **All-or-Nothing**: Either a complete result or a single [`ParseError`]
//! 5. **Forward Compatible**: Unknown tag kinds are skipped, never fatal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use delta_bootinfo::ParsedBootInfo;
//!
//! fn kernel_main(info_ptr: *const u8) -> ! {
//!     // Single unsafe boundary
//!     let Ok(boot_info) = (unsafe { ParsedBootInfo::from_ptr(info_ptr) }) else {
//!         halt();
//!     };
//!
//!     let _mb = boot_info.total_usable_memory_mb;
//!     halt();
//! }
//! # fn halt() -> ! { loop {} }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       DELTABOOT DECODER STACK                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Layer 3: Parse Orchestrator (boot_info)                                │
//! │           └─ End tag, memory map and tag-count invariants               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Layer 2: Tag Interpreter (info::Tag, memory, framebuffer, smp)         │
//! │           └─ Per-kind decoding, defective tags are skipped              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Layer 1: Tag Cursor (info::next_tag) over BootBlob                     │
//! │           └─ Aligned, overflow-checked walk, header always in bounds    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Layer 0: Header Validator (validate)                                   │
//! │           └─ Magic, size window, version, reserved                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Bounds-checked byte arena over the boot blob
pub mod blob;

/// Parse orchestration and the aggregate result
pub mod boot_info;

/// Framebuffer tag decoding
#[cfg(feature = "framebuffer")]
pub mod framebuffer;

/// Tag cursor and tag interpreter
pub mod info;

/// Wire layouts of the DeltaBoot records
pub mod layout;

/// Memory map abstractions
pub mod memory;

/// CPU topology tag decoding
#[cfg(feature = "smp")]
pub mod smp;

/// Header validation and error types
pub mod validate;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use blob::{BootBlob, RawTag};
pub use boot_info::{parse, BootInfoParser, ParseLimits, ParsedBootInfo};
#[cfg(feature = "framebuffer")]
pub use framebuffer::{ColorChannel, FramebufferInfo};
pub use info::{
    next_tag, AcpiRsdp, BootloaderNameTag, CmdlineTag, InitrdInfo, Tag, TagIterator,
};
pub use layout::{BootHeader, TagHeader};
pub use memory::{MemoryMap, MemoryRegion, MemoryRegionKind, MemoryStats};
#[cfg(feature = "smp")]
pub use smp::{CpuEntry, CpuFlags, SmpInfo};
pub use validate::{is_valid, validate_header, HeaderError, ParseError, TagDefect, ValidationResult};

// =============================================================================
// Constants
// =============================================================================

/// Boot information magic number (`"DBOK"` read as a little-endian `u32`)
///
/// The first field of every blob handed over by a DeltaBoot loader.
pub const BOOT_MAGIC: u32 = 0x4442_4F4B;

/// Magic number of the kernel's request header
///
/// A DeltaBoot loader scans the kernel image for this value to find the
/// list of information the kernel asks for.
pub const REQUEST_MAGIC: u32 = 0x4442_0001;

/// Oldest protocol version this decoder understands
pub const PROTOCOL_VERSION: u32 = 0x0001;

/// Required alignment for tags within the boot information (8 bytes)
pub const TAG_ALIGNMENT: u32 = 8;

/// Upper bound on `total_size` (16 MiB)
///
/// Bounds every offset computation and caps the amount of memory a parse
/// can be made to scan.
pub const MAX_TOTAL_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum number of tags visited before the blob is declared runaway
pub const MAX_TAGS: u32 = 1000;

/// Bytes per megabyte used when reporting usable memory
pub const BYTES_PER_MB: u64 = 1024 * 1024;

// =============================================================================
// Tag Type Constants
// =============================================================================

/// Tag type identifiers as defined by the DeltaBoot protocol
pub mod tag_types {
    /// End tag (terminates tag list)
    pub const END: u16 = 0x0000;
    /// Boot command line
    pub const CMDLINE: u16 = 0x0001;
    /// Physical memory map
    pub const MEMORY_MAP: u16 = 0x0002;
    /// Display framebuffer
    pub const FRAMEBUFFER: u16 = 0x0003;
    /// Loaded boot modules
    pub const MODULES: u16 = 0x0004;
    /// ACPI RSDP pointer
    pub const ACPI_RSDP: u16 = 0x0005;
    /// Multi-processor information
    pub const SMP: u16 = 0x0006;
    /// Boot timestamp
    pub const BOOT_TIME: u16 = 0x0007;
    /// Bootloader identification
    pub const BOOTLOADER: u16 = 0x0008;
    /// Kernel file information
    pub const KERNEL_FILE: u16 = 0x0009;
    /// EFI system table
    pub const EFI_SYSTAB: u16 = 0x000A;
    /// Initial ramdisk
    pub const INITRD: u16 = 0x000B;
    /// First vendor-specific tag type; all types from here on are skipped
    pub const VENDOR_START: u16 = 0x8000;

    /// Check whether a tag type lies in the vendor extension range
    #[must_use]
    pub const fn is_vendor(tag_type: u16) -> bool {
        tag_type >= VENDOR_START
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Align a value up to the specified alignment, or `None` on overflow
///
/// # Arguments
///
/// * `value` - The value to align
/// * `alignment` - The alignment (must be a power of 2)
#[must_use]
pub const fn checked_align_up(value: u32, alignment: u32) -> Option<u32> {
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

// =============================================================================
// Compile-Time Assertions
// =============================================================================

const _: () = {
    assert!(TAG_ALIGNMENT.is_power_of_two());
    assert!(MAX_TOTAL_SIZE == 16 * 1024 * 1024);
    assert!(MAX_TAGS == 1000);

    // "DBOK" as it appears in memory
    let bytes = BOOT_MAGIC.to_le_bytes();
    assert!(bytes[0] == b'K' && bytes[1] == b'O' && bytes[2] == b'B' && bytes[3] == b'D');
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_align_up() {
        assert_eq!(checked_align_up(0, 8), Some(0));
        assert_eq!(checked_align_up(8, 8), Some(8));
        assert_eq!(checked_align_up(13, 8), Some(16));
        assert_eq!(checked_align_up(u32::MAX - 7, 8), Some(u32::MAX - 7));
        assert_eq!(checked_align_up(u32::MAX - 6, 8), None);
        assert_eq!(checked_align_up(u32::MAX, 8), None);
    }

    #[test]
    fn test_vendor_range() {
        assert!(!tag_types::is_vendor(tag_types::INITRD));
        assert!(tag_types::is_vendor(0x8000));
        assert!(tag_types::is_vendor(0xFFFF));
    }
}
