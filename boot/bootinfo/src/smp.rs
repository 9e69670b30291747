//! # SMP Tag
//!
//! CPU topology as discovered by the loader.

use core::fmt;

use bitflags::bitflags;

use crate::layout::{min_size, RawCpu, TagHeader};
use crate::validate::TagDefect;

bitflags! {
    /// Per-CPU flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpuFlags: u32 {
        /// CPU is usable
        const ENABLED = 1 << 0;
        /// CPU is the bootstrap processor
        const BSP = 1 << 1;
    }
}

/// One CPU entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuEntry {
    /// CPU (APIC) id
    pub id: u32,
    /// Flags; unknown bits are kept
    pub flags: CpuFlags,
}

impl CpuEntry {
    /// Whether the CPU may be started
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.flags.contains(CpuFlags::ENABLED)
    }

    /// Whether this is the bootstrap processor
    #[must_use]
    pub const fn is_bsp(&self) -> bool {
        self.flags.contains(CpuFlags::BSP)
    }
}

/// Validated SMP information
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SmpInfo<'boot> {
    /// CPU count as declared by the loader
    cpu_count: u32,
    /// Bootstrap processor id
    bsp_id: u32,
    /// Entry bytes actually present in the tag
    cpus: &'boot [u8],
}

impl<'boot> SmpInfo<'boot> {
    /// Decode and validate an SMP tag payload
    ///
    /// # Errors
    ///
    /// Fails if the payload is shorter than the fixed fields or if
    /// `cpu_count` is zero.
    pub fn parse(payload: &'boot [u8]) -> Result<Self, TagDefect> {
        let head = payload.get(..8).ok_or(TagDefect::TooSmall {
            size: (payload.len() + TagHeader::SIZE) as u32,
            minimum: min_size::SMP,
        })?;
        let cpu_count = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let bsp_id = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

        if cpu_count == 0 {
            return Err(TagDefect::ZeroField("cpu_count"));
        }

        Ok(Self { cpu_count, bsp_id, cpus: &payload[8..] })
    }

    /// CPU count as declared by the loader
    #[must_use]
    pub const fn cpu_count(&self) -> u32 {
        self.cpu_count
    }

    /// Bootstrap processor id
    #[must_use]
    pub const fn bsp_id(&self) -> u32 {
        self.bsp_id
    }

    /// Iterate over the CPU entries that fit inside the tag
    ///
    /// Yields at most `cpu_count` entries.
    pub fn cpus(&self) -> impl Iterator<Item = CpuEntry> + 'boot {
        self.cpus
            .chunks_exact(RawCpu::SIZE)
            .take(self.cpu_count as usize)
            .map(|c| CpuEntry {
                id: u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                flags: CpuFlags::from_bits_retain(u32::from_le_bytes([c[4], c[5], c[6], c[7]])),
            })
    }

    /// Number of enabled CPUs among the present entries
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.cpus().filter(CpuEntry::is_enabled).count()
    }
}

impl fmt::Debug for SmpInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmpInfo")
            .field("cpu_count", &self.cpu_count)
            .field("bsp_id", &self.bsp_id)
            .field("entries", &(self.cpus.len() / RawCpu::SIZE))
            .finish()
    }
}
