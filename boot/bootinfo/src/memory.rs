//! # Memory Map Abstractions
//!
//! Type-safe, zero-copy access to the memory map tag.
//!
//! ## Key Features
//!
//! - **Zero-Copy**: Entries are decoded in place from the blob
//! - **Wide-Entry Tolerant**: Entries are strided by the declared
//!   `entry_size`, so future loaders may append fields
//! - **Overflow Safe**: Accounting never wraps

use core::fmt;

use crate::layout::{min_size, RawMemoryMapEntry};
use crate::validate::TagDefect;
use crate::BYTES_PER_MB;

// =============================================================================
// Memory Region Kind
// =============================================================================

/// Kind of memory region as reported by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MemoryRegionKind {
    /// Reserved memory (do not use)
    Reserved,

    /// Free RAM available for general allocation
    Usable,

    /// ACPI tables; reclaimable once they have been parsed
    AcpiReclaimable,

    /// ACPI non-volatile storage; must be preserved
    AcpiNvs,

    /// Defective memory
    Bad,

    /// Used by the bootloader; reclaimable
    Bootloader,

    /// The kernel image
    Kernel,

    /// Video memory
    Framebuffer,

    /// Initial ramdisk
    Initrd,

    /// Loaded boot modules
    Modules,

    /// A type we don't recognize, with its raw value
    Unknown(u32),
}

impl MemoryRegionKind {
    /// Create from raw type value
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::Reserved,
            1 => Self::Usable,
            2 => Self::AcpiReclaimable,
            3 => Self::AcpiNvs,
            4 => Self::Bad,
            5 => Self::Bootloader,
            6 => Self::Kernel,
            7 => Self::Framebuffer,
            8 => Self::Initrd,
            9 => Self::Modules,
            other => Self::Unknown(other),
        }
    }

    /// Get raw type value
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        match self {
            Self::Reserved => 0,
            Self::Usable => 1,
            Self::AcpiReclaimable => 2,
            Self::AcpiNvs => 3,
            Self::Bad => 4,
            Self::Bootloader => 5,
            Self::Kernel => 6,
            Self::Framebuffer => 7,
            Self::Initrd => 8,
            Self::Modules => 9,
            Self::Unknown(v) => *v,
        }
    }

    /// Check if this region is usable for general allocation
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Usable)
    }

    /// Check if this region can be reclaimed once boot data is consumed
    #[must_use]
    pub const fn is_reclaimable(&self) -> bool {
        matches!(self, Self::Usable | Self::AcpiReclaimable | Self::Bootloader)
    }
}

impl fmt::Display for MemoryRegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "Reserved"),
            Self::Usable => write!(f, "Usable"),
            Self::AcpiReclaimable => write!(f, "ACPI Reclaimable"),
            Self::AcpiNvs => write!(f, "ACPI NVS"),
            Self::Bad => write!(f, "Bad Memory"),
            Self::Bootloader => write!(f, "Bootloader"),
            Self::Kernel => write!(f, "Kernel"),
            Self::Framebuffer => write!(f, "Framebuffer"),
            Self::Initrd => write!(f, "Initrd"),
            Self::Modules => write!(f, "Modules"),
            Self::Unknown(v) => write!(f, "Unknown({})", v),
        }
    }
}

// =============================================================================
// Memory Region
// =============================================================================

/// A single memory region from the memory map
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Starting physical address
    base: u64,
    /// Length in bytes
    length: u64,
    /// Region kind
    kind: MemoryRegionKind,
    /// Raw attribute bits
    attributes: u32,
}

impl MemoryRegion {
    /// Create a new memory region
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionKind, attributes: u32) -> Self {
        Self { base, length, kind, attributes }
    }

    /// Decode the leading 24 bytes of a memory map entry
    fn from_entry(entry: &[u8; RawMemoryMapEntry::SIZE]) -> Self {
        let e = entry;
        let base = u64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]);
        let length = u64::from_le_bytes([e[8], e[9], e[10], e[11], e[12], e[13], e[14], e[15]]);
        let region_type = u32::from_le_bytes([e[16], e[17], e[18], e[19]]);
        let attributes = u32::from_le_bytes([e[20], e[21], e[22], e[23]]);

        Self::new(base, length, MemoryRegionKind::from_raw(region_type), attributes)
    }

    /// Get the starting physical address
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.base
    }

    /// Get the ending physical address (exclusive, saturating)
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    /// Get the length in bytes
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Get the region kind
    #[must_use]
    pub const fn kind(&self) -> MemoryRegionKind {
        self.kind
    }

    /// Get the raw attribute bits
    #[must_use]
    pub const fn attributes(&self) -> u32 {
        self.attributes
    }

    /// Check if this region is usable for allocation
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.kind.is_usable()
    }

    /// Check if an address falls within this region
    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.length
    }

    /// Get the number of 4KB pages in this region
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.length / 4096
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("start", &format_args!("{:#x}", self.base))
            .field("end", &format_args!("{:#x}", self.end()))
            .field("size", &format_args!("{:#x} ({} KB)", self.length, self.length / 1024))
            .field("kind", &self.kind)
            .field("attributes", &format_args!("{:#x}", self.attributes))
            .finish()
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#012x} - {:#012x} ({:>8} KB) {}",
            self.base,
            self.end(),
            self.length / 1024,
            self.kind
        )
    }
}

// =============================================================================
// Memory Map
// =============================================================================

/// Validated memory map from the bootloader
///
/// Every one of the `entry_count` entries is known to lie inside the tag,
/// so iteration never needs to stop early.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap<'boot> {
    /// Stride between entries as declared by the bootloader
    entry_size: u32,
    /// Number of entries
    entry_count: u32,
    /// Exactly `entry_size * entry_count` bytes of entry data
    entries: &'boot [u8],
}

impl<'boot> MemoryMap<'boot> {
    /// Decode a memory map from its tag payload
    ///
    /// Payload layout: `entry_size: u32`, `entry_count: u32`, entries.
    ///
    /// # Errors
    ///
    /// Fails if the entries are narrower than an entry record or if
    /// `entry_count` entries of `entry_size` bytes do not fit the payload.
    pub fn parse(payload: &'boot [u8]) -> Result<Self, TagDefect> {
        let head = payload.get(..8).ok_or(TagDefect::TooSmall {
            size: payload.len() as u32 + 8,
            minimum: min_size::MEMORY_MAP,
        })?;
        let entry_size = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let entry_count = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

        if (entry_size as usize) < RawMemoryMapEntry::SIZE {
            return Err(TagDefect::EntrySizeTooSmall { entry_size });
        }

        let overflow = TagDefect::EntriesOverflow { entry_size, entry_count };
        let entries_len = (entry_size as usize)
            .checked_mul(entry_count as usize)
            .ok_or(overflow)?;
        let entries = payload
            .get(8..)
            .and_then(|rest| rest.get(..entries_len))
            .ok_or(overflow)?;

        Ok(Self { entry_size, entry_count, entries })
    }

    /// Get the declared entry size
    #[must_use]
    pub const fn entry_size(&self) -> u32 {
        self.entry_size
    }

    /// Get the number of entries
    #[must_use]
    pub const fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Check if the memory map is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Iterate over all memory regions
    #[must_use]
    pub fn regions(&self) -> MemoryRegionIterator<'boot> {
        MemoryRegionIterator {
            entries: self.entries.chunks_exact(self.entry_size as usize),
        }
    }

    /// Iterate over usable memory regions only
    pub fn usable_regions(&self) -> impl Iterator<Item = MemoryRegion> + 'boot {
        self.regions().filter(MemoryRegion::is_usable)
    }

    /// Total length of usable regions in bytes
    ///
    /// An entry whose addition would overflow is left out and the running
    /// total carried on unchanged.
    #[must_use]
    pub fn total_usable_bytes(&self) -> u64 {
        self.usable_regions()
            .fold(0u64, |total, r| total.checked_add(r.length()).unwrap_or(total))
    }

    /// Total usable memory in whole megabytes, saturated into `u32`
    #[must_use]
    pub fn total_usable_mb(&self) -> u32 {
        u32::try_from(self.total_usable_bytes() / BYTES_PER_MB).unwrap_or(u32::MAX)
    }

    /// Find the largest usable region
    #[must_use]
    pub fn largest_usable_region(&self) -> Option<MemoryRegion> {
        self.usable_regions().max_by_key(MemoryRegion::length)
    }

    /// Find the region containing the given address
    #[must_use]
    pub fn find_region_containing(&self, addr: u64) -> Option<MemoryRegion> {
        self.regions().find(|r| r.contains(addr))
    }
}

impl fmt::Debug for MemoryMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMap")
            .field("entry_size", &self.entry_size)
            .field("entry_count", &self.entry_count)
            .field("total_usable", &format_args!("{} MB", self.total_usable_mb()))
            .finish()
    }
}

// =============================================================================
// Memory Region Iterator
// =============================================================================

/// Iterator over memory regions
#[derive(Debug, Clone)]
pub struct MemoryRegionIterator<'boot> {
    entries: core::slice::ChunksExact<'boot, u8>,
}

impl Iterator for MemoryRegionIterator<'_> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<Self::Item> {
        // Only the leading fields are ours; wider entries carry extras
        let entry = self.entries.next()?;
        let head: &[u8; RawMemoryMapEntry::SIZE] =
            entry.get(..RawMemoryMapEntry::SIZE)?.try_into().ok()?;
        Some(MemoryRegion::from_entry(head))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for MemoryRegionIterator<'_> {}

// =============================================================================
// Memory Statistics
// =============================================================================

/// Statistics about the memory map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total memory (all types)
    pub total: u64,
    /// Usable memory
    pub usable: u64,
    /// Reserved, bad and unrecognized memory
    pub reserved: u64,
    /// ACPI reclaimable memory
    pub acpi_reclaimable: u64,
    /// ACPI NVS memory
    pub acpi_nvs: u64,
    /// Memory held by the bootloader, kernel, initrd and modules
    pub boot_owned: u64,
    /// Video memory
    pub framebuffer: u64,
    /// Number of regions
    pub region_count: usize,
    /// Number of usable regions
    pub usable_region_count: usize,
}

impl MemoryStats {
    /// Calculate statistics from a memory map
    #[must_use]
    pub fn from_map(map: &MemoryMap<'_>) -> Self {
        let mut stats = Self::default();

        for region in map.regions() {
            let len = region.length();
            stats.total = stats.total.saturating_add(len);
            stats.region_count += 1;

            let bucket = match region.kind() {
                MemoryRegionKind::Usable => {
                    stats.usable_region_count += 1;
                    &mut stats.usable
                }
                MemoryRegionKind::AcpiReclaimable => &mut stats.acpi_reclaimable,
                MemoryRegionKind::AcpiNvs => &mut stats.acpi_nvs,
                MemoryRegionKind::Bootloader
                | MemoryRegionKind::Kernel
                | MemoryRegionKind::Initrd
                | MemoryRegionKind::Modules => &mut stats.boot_owned,
                MemoryRegionKind::Framebuffer => &mut stats.framebuffer,
                MemoryRegionKind::Reserved
                | MemoryRegionKind::Bad
                | MemoryRegionKind::Unknown(_) => &mut stats.reserved,
            };
            *bucket = bucket.saturating_add(len);
        }

        stats
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Statistics:")?;
        writeln!(
            f,
            "  Total:           {:>10} KB ({} MB)",
            self.total / 1024,
            self.total / BYTES_PER_MB
        )?;
        writeln!(
            f,
            "  Usable:          {:>10} KB ({} MB)",
            self.usable / 1024,
            self.usable / BYTES_PER_MB
        )?;
        writeln!(f, "  Reserved:        {:>10} KB", self.reserved / 1024)?;
        writeln!(f, "  ACPI Reclaim:    {:>10} KB", self.acpi_reclaimable / 1024)?;
        writeln!(f, "  ACPI NVS:        {:>10} KB", self.acpi_nvs / 1024)?;
        writeln!(f, "  Boot Owned:      {:>10} KB", self.boot_owned / 1024)?;
        writeln!(f, "  Framebuffer:     {:>10} KB", self.framebuffer / 1024)?;
        writeln!(
            f,
            "  Regions:         {:>10} ({} usable)",
            self.region_count, self.usable_region_count
        )
    }
}
