//! # Boot Information Parsing
//!
//! Drives the tag cursor and interpreter over a validated blob and enforces
//! the document-level rules.
//!
//! ## Parse States
//!
//! ```text
//! Unvalidated ──header ok──► HeaderValid ──► Scanning(n) ──End──► Terminated
//!      │                                        │  │
//!      └──────────────── Failed ◄───────────────┘  └─ n > limit ─► Failed
//! ```
//!
//! `Terminated` is only reported as success if a memory map was recorded.
//! Nothing partial is ever returned.

use core::slice;

use crate::blob::BootBlob;
use crate::info::{AcpiRsdp, BootloaderNameTag, CmdlineTag, InitrdInfo, Tag, TagIterator};
use crate::layout::BootHeader;
use crate::memory::{MemoryMap, MemoryStats};
use crate::validate::{validate_fields, HeaderError, ParseError};
use crate::{MAX_TAGS, MAX_TOTAL_SIZE};

#[cfg(feature = "framebuffer")]
use crate::framebuffer::FramebufferInfo;
#[cfg(feature = "smp")]
use crate::smp::SmpInfo;

// =============================================================================
// Parsed Boot Information
// =============================================================================

/// Everything the kernel learned from the bootloader
///
/// Borrowed fields point into the caller's blob. A field is `None` if the
/// tag was absent or defective; when a kind appears more than once, the
/// last valid tag wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedBootInfo<'boot> {
    /// Physical memory map (always present in a successful parse)
    pub memory_map: Option<MemoryMap<'boot>>,
    /// Linear framebuffer
    #[cfg(feature = "framebuffer")]
    pub framebuffer: Option<FramebufferInfo>,
    /// Kernel command line
    pub cmdline: Option<CmdlineTag<'boot>>,
    /// ACPI RSDP pointer
    pub acpi_rsdp: Option<AcpiRsdp>,
    /// CPU topology
    #[cfg(feature = "smp")]
    pub smp: Option<SmpInfo<'boot>>,
    /// Initial ramdisk
    pub initrd: Option<InitrdInfo>,
    /// Bootloader identification
    pub bootloader: Option<BootloaderNameTag<'boot>>,
    /// Usable memory in megabytes
    pub total_usable_memory_mb: u32,
    /// Number of CPUs, 1 unless an SMP tag says otherwise
    pub cpu_count: u32,
}

impl<'boot> ParsedBootInfo<'boot> {
    const fn empty() -> Self {
        Self {
            memory_map: None,
            #[cfg(feature = "framebuffer")]
            framebuffer: None,
            cmdline: None,
            acpi_rsdp: None,
            #[cfg(feature = "smp")]
            smp: None,
            initrd: None,
            bootloader: None,
            total_usable_memory_mb: 0,
            cpu_count: 1,
        }
    }

    /// Parse boot information from a raw pointer
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `ptr` is null or points to at least 16 readable bytes
    /// - if the header there passes validation, `total_size` bytes from
    ///   `ptr` are readable
    /// - the memory remains valid and unmodified for lifetime `'boot`
    ///
    /// # Errors
    ///
    /// See [`BootInfoParser::parse`]. A null pointer is an invalid header.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, ParseError> {
        if ptr.is_null() {
            log::error!("bootinfo: null boot info pointer");
            return Err(HeaderError::NullPointer.into());
        }

        // Safety: the caller guarantees the header bytes are readable
        let head = unsafe { slice::from_raw_parts(ptr, BootHeader::SIZE) };
        let header = BootHeader::from_bytes(head)
            .ok_or(HeaderError::Truncated { available: head.len() })?;
        validate_fields(&header).map_err(|e| {
            log::error!("bootinfo: {}", e);
            ParseError::from(e)
        })?;

        // Safety: the header is sane, so the caller guarantees `total_size` bytes
        let bytes = unsafe { slice::from_raw_parts(ptr, header.total_size as usize) };
        parse(bytes)
    }

    /// The command line as a string, if present
    #[must_use]
    pub fn cmdline_str(&self) -> Option<&'boot str> {
        self.cmdline.map(|c| c.as_str())
    }

    /// The bootloader name as a string, if present
    #[must_use]
    pub fn bootloader_name(&self) -> Option<&'boot str> {
        self.bootloader.map(|b| b.as_str())
    }

    /// Statistics over the memory map
    #[must_use]
    pub fn memory_stats(&self) -> Option<MemoryStats> {
        self.memory_map.as_ref().map(MemoryStats::from_map)
    }

    fn record(&mut self, tag: Tag<'boot>) {
        match tag {
            Tag::End => {}
            Tag::MemoryMap(map) => {
                self.total_usable_memory_mb = map.total_usable_mb();
                self.memory_map = Some(map);
            }
            #[cfg(feature = "framebuffer")]
            Tag::Framebuffer(fb) => self.framebuffer = Some(fb),
            Tag::Cmdline(c) => self.cmdline = Some(c),
            Tag::AcpiRsdp(a) => self.acpi_rsdp = Some(a),
            #[cfg(feature = "smp")]
            Tag::Smp(smp) => {
                self.cpu_count = smp.cpu_count();
                self.smp = Some(smp);
            }
            Tag::Initrd(i) => self.initrd = Some(i),
            Tag::Bootloader(b) => self.bootloader = Some(b),
        }
    }
}

// =============================================================================
// Parser Configuration
// =============================================================================

/// Resource limits for a parse
///
/// Limits can be tightened below the protocol ceilings but never raised
/// above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum number of tags visited
    pub max_tags: u32,
    /// Maximum accepted `total_size`
    pub max_total_size: u32,
}

impl ParseLimits {
    /// The protocol ceilings
    pub const DEFAULT: Self = Self {
        max_tags: MAX_TAGS,
        max_total_size: MAX_TOTAL_SIZE,
    };

    /// Clamp both limits to the protocol ceilings
    #[must_use]
    pub const fn clamped(self) -> Self {
        Self {
            max_tags: if self.max_tags < MAX_TAGS { self.max_tags } else { MAX_TAGS },
            max_total_size: if self.max_total_size < MAX_TOTAL_SIZE {
                self.max_total_size
            } else {
                MAX_TOTAL_SIZE
            },
        }
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Boot information parser
///
/// # Example
///
/// ```rust
/// use delta_bootinfo::{BootInfoParser, ParseLimits};
///
/// let parser = BootInfoParser::new().with_limits(ParseLimits {
///     max_tags: 64,
///     max_total_size: 64 * 1024,
/// });
/// assert!(parser.parse(&[0u8; 8]).is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootInfoParser {
    limits: ParseLimits,
}

impl BootInfoParser {
    /// Create a parser with the protocol limits
    #[must_use]
    pub const fn new() -> Self {
        Self { limits: ParseLimits::DEFAULT }
    }

    /// Use tighter limits
    #[must_use]
    pub const fn with_limits(mut self, limits: ParseLimits) -> Self {
        self.limits = limits.clamped();
        self
    }

    /// The limits in effect
    #[must_use]
    pub const fn limits(&self) -> ParseLimits {
        self.limits
    }

    /// Parse the blob at the start of `bytes`
    ///
    /// # Errors
    ///
    /// - [`ParseError::InvalidHeader`] if the header is rejected
    /// - [`ParseError::TooManyTags`] if the tag limit is exceeded
    /// - [`ParseError::MissingEndTag`] if the list is not terminated
    /// - [`ParseError::MissingMemoryMap`] if no valid memory map was found
    pub fn parse<'boot>(&self, bytes: &'boot [u8]) -> Result<ParsedBootInfo<'boot>, ParseError> {
        let blob = BootBlob::new(bytes).map_err(|e| {
            log::error!("bootinfo: {}", e);
            ParseError::from(e)
        })?;
        self.parse_blob(blob)
    }

    /// Parse an already validated blob
    ///
    /// # Errors
    ///
    /// As for [`BootInfoParser::parse`].
    pub fn parse_blob<'boot>(
        &self,
        blob: BootBlob<'boot>,
    ) -> Result<ParsedBootInfo<'boot>, ParseError> {
        if blob.total_size() > self.limits.max_total_size {
            let e = HeaderError::TotalSizeTooLarge { size: blob.total_size() };
            log::error!("bootinfo: {}", e);
            return Err(e.into());
        }

        let mut info = ParsedBootInfo::empty();
        let mut terminated = false;
        let mut raw_tags = TagIterator::new(blob);

        let tags = raw_tags
            .by_ref()
            .take(self.limits.max_tags as usize)
            .filter_map(|raw| Tag::from_raw(&blob, &raw));

        for tag in tags {
            if tag == Tag::End {
                terminated = true;
                break;
            }
            log::debug!("bootinfo: {:?}", tag);
            info.record(tag);
        }

        if !terminated && raw_tags.next().is_some() {
            log::error!("bootinfo: more than {} tags", self.limits.max_tags);
            return Err(ParseError::TooManyTags { limit: self.limits.max_tags });
        }

        if !terminated {
            log::error!("bootinfo: tag list has no end tag");
            return Err(ParseError::MissingEndTag);
        }

        if info.memory_map.is_none() {
            log::error!("bootinfo: no valid memory map");
            return Err(ParseError::MissingMemoryMap);
        }

        log::debug!(
            "bootinfo: {} MB usable, {} cpu(s)",
            info.total_usable_memory_mb,
            info.cpu_count
        );
        Ok(info)
    }
}

/// Parse the blob at the start of `bytes` with the protocol limits
///
/// # Errors
///
/// See [`BootInfoParser::parse`].
pub fn parse(bytes: &[u8]) -> Result<ParsedBootInfo<'_>, ParseError> {
    BootInfoParser::new().parse(bytes)
}
