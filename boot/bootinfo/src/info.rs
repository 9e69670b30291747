//! # Tag Cursor and Interpreter
//!
//! Walking the tag list and decoding individual tags.
//!
//! ## Walk Rules
//!
//! ```text
//! ┌─────────────┐
//! │ BootHeader  │  16 bytes
//! ├─────────────┤ ← first tag, offset 16
//! │   Tag 0     │  size = 8 + payload
//! ├─────────────┤ ← offset + align_up(size, 8)
//! │   Tag 1     │
//! ├─────────────┤
//! │  End Tag    │  iteration never continues past this
//! └─────────────┘
//! ```
//!
//! The cursor only guarantees that a tag's 8 header bytes are in bounds.
//! Whether the claimed size fits is checked when the payload is taken.

use core::fmt;
use core::str;

use crate::blob::{BootBlob, RawTag};
use crate::layout::{min_size, BootHeader, TagHeader};
use crate::memory::MemoryMap;
use crate::validate::TagDefect;
use crate::{checked_align_up, tag_types, TAG_ALIGNMENT};

#[cfg(feature = "framebuffer")]
use crate::framebuffer::FramebufferInfo;
#[cfg(feature = "smp")]
use crate::smp::SmpInfo;

// =============================================================================
// Tag Cursor
// =============================================================================

/// Step from one tag to the next
///
/// With `previous == None` this yields the first tag. Returns `None` when
/// `previous` is an end tag, claims fewer than 8 bytes, when advancing
/// overflows, or when the next header would not fit inside the blob.
#[must_use]
pub fn next_tag(blob: &BootBlob<'_>, previous: Option<&RawTag>) -> Option<RawTag> {
    let Some(prev) = previous else {
        return blob.tag_at(BootHeader::SIZE);
    };

    if prev.tag_type() == tag_types::END {
        return None;
    }

    if (prev.size() as usize) < TagHeader::SIZE {
        return None;
    }

    let stride = checked_align_up(prev.size(), TAG_ALIGNMENT)?;
    let next = prev.offset.checked_add(stride as usize)?;

    log::trace!("tag {:#06x} at {} -> next at {}", prev.tag_type(), prev.offset, next);
    blob.tag_at(next)
}

/// Iterator over raw tag positions
///
/// A thin wrapper around [`next_tag`]. The end tag itself is yielded; the
/// iterator stops after it.
#[derive(Debug, Clone)]
pub struct TagIterator<'boot> {
    blob: BootBlob<'boot>,
    current: Option<RawTag>,
    done: bool,
}

impl<'boot> TagIterator<'boot> {
    /// Create a new tag iterator positioned before the first tag
    #[must_use]
    pub const fn new(blob: BootBlob<'boot>) -> Self {
        Self { blob, current: None, done: false }
    }
}

impl Iterator for TagIterator<'_> {
    type Item = RawTag;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.current = next_tag(&self.blob, self.current.as_ref());
        if self.current.is_none() {
            self.done = true;
        }
        self.current
    }
}

impl core::iter::FusedIterator for TagIterator<'_> {}

// =============================================================================
// Tag Enum
// =============================================================================

/// A decoded, validated tag
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Tag<'boot> {
    /// End of the tag list
    End,

    /// Boot command line
    Cmdline(CmdlineTag<'boot>),

    /// Physical memory map
    MemoryMap(MemoryMap<'boot>),

    /// Framebuffer information
    #[cfg(feature = "framebuffer")]
    Framebuffer(FramebufferInfo),

    /// ACPI RSDP pointer
    AcpiRsdp(AcpiRsdp),

    /// CPU topology
    #[cfg(feature = "smp")]
    Smp(SmpInfo<'boot>),

    /// Initial ramdisk
    Initrd(InitrdInfo),

    /// Bootloader name
    Bootloader(BootloaderNameTag<'boot>),
}

impl<'boot> Tag<'boot> {
    /// Decode the tag at `raw`
    ///
    /// # Errors
    ///
    /// Returns why the tag cannot be used. [`TagDefect::Unrecognized`] is
    /// returned for every type this build does not decode, including the
    /// vendor range.
    pub fn parse(blob: &BootBlob<'boot>, raw: &RawTag) -> Result<Self, TagDefect> {
        let tag_type = raw.tag_type();

        // The end tag carries nothing; its header is all we need
        if tag_type == tag_types::END {
            return Ok(Self::End);
        }

        let minimum = match tag_type {
            tag_types::MEMORY_MAP => min_size::MEMORY_MAP,
            #[cfg(feature = "framebuffer")]
            tag_types::FRAMEBUFFER => min_size::FRAMEBUFFER,
            tag_types::ACPI_RSDP => min_size::ACPI_RSDP,
            #[cfg(feature = "smp")]
            tag_types::SMP => min_size::SMP,
            tag_types::INITRD => min_size::INITRD,
            tag_types::CMDLINE | tag_types::BOOTLOADER => min_size::STRING,
            _ => return Err(TagDefect::Unrecognized),
        };

        if raw.size() < minimum {
            return Err(TagDefect::TooSmall { size: raw.size(), minimum });
        }

        let payload = blob.payload(raw).ok_or(TagDefect::OutOfBounds {
            offset: raw.offset,
            size: raw.size(),
        })?;

        match tag_type {
            tag_types::MEMORY_MAP => MemoryMap::parse(payload).map(Self::MemoryMap),
            #[cfg(feature = "framebuffer")]
            tag_types::FRAMEBUFFER => FramebufferInfo::parse(payload).map(Self::Framebuffer),
            tag_types::ACPI_RSDP => AcpiRsdp::parse(payload).map(Self::AcpiRsdp),
            #[cfg(feature = "smp")]
            tag_types::SMP => SmpInfo::parse(payload).map(Self::Smp),
            tag_types::INITRD => InitrdInfo::parse(payload).map(Self::Initrd),
            tag_types::CMDLINE => CmdlineTag::parse(payload).map(Self::Cmdline),
            tag_types::BOOTLOADER => BootloaderNameTag::parse(payload).map(Self::Bootloader),
            _ => Err(TagDefect::Unrecognized),
        }
    }

    /// Decode the tag at `raw`, logging and discarding defects
    ///
    /// Unrecognized types are dropped silently.
    #[must_use]
    pub fn from_raw(blob: &BootBlob<'boot>, raw: &RawTag) -> Option<Self> {
        match Self::parse(blob, raw) {
            Ok(tag) => Some(tag),
            Err(TagDefect::Unrecognized) => None,
            Err(defect) => {
                log::warn!(
                    "bootinfo: skipping tag {:#06x} at offset {}: {}",
                    raw.tag_type(),
                    raw.offset,
                    defect
                );
                None
            }
        }
    }

    /// Get the tag type
    #[must_use]
    pub const fn tag_type(&self) -> u16 {
        match self {
            Self::End => tag_types::END,
            Self::Cmdline(_) => tag_types::CMDLINE,
            Self::MemoryMap(_) => tag_types::MEMORY_MAP,
            #[cfg(feature = "framebuffer")]
            Self::Framebuffer(_) => tag_types::FRAMEBUFFER,
            Self::AcpiRsdp(_) => tag_types::ACPI_RSDP,
            #[cfg(feature = "smp")]
            Self::Smp(_) => tag_types::SMP,
            Self::Initrd(_) => tag_types::INITRD,
            Self::Bootloader(_) => tag_types::BOOTLOADER,
        }
    }
}

impl fmt::Debug for Tag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::End => f.write_str("End"),
            Self::Cmdline(c) => f.debug_tuple("Cmdline").field(&c.as_str()).finish(),
            Self::MemoryMap(m) => f.debug_tuple("MemoryMap").field(m).finish(),
            #[cfg(feature = "framebuffer")]
            Self::Framebuffer(fb) => f.debug_tuple("Framebuffer").field(fb).finish(),
            Self::AcpiRsdp(a) => f.debug_tuple("AcpiRsdp").field(a).finish(),
            #[cfg(feature = "smp")]
            Self::Smp(s) => f.debug_tuple("Smp").field(s).finish(),
            Self::Initrd(i) => f.debug_tuple("Initrd").field(i).finish(),
            Self::Bootloader(b) => f.debug_tuple("Bootloader").field(&b.as_str()).finish(),
        }
    }
}

// =============================================================================
// Specific Tag Types
// =============================================================================

/// Bytes up to (not including) the first zero, or `None` if there is none
fn terminated(data: &[u8]) -> Option<&[u8]> {
    data.iter().position(|&b| b == 0).map(|len| &data[..len])
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Command line tag
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CmdlineTag<'boot> {
    /// Bytes before the terminator
    data: &'boot [u8],
}

impl<'boot> CmdlineTag<'boot> {
    /// Decode a command line payload
    ///
    /// # Errors
    ///
    /// Fails if there is no zero byte inside the payload.
    pub fn parse(payload: &'boot [u8]) -> Result<Self, TagDefect> {
        terminated(payload).map(|data| Self { data }).ok_or(TagDefect::Unterminated)
    }

    /// Get the command line as a string
    ///
    /// Returns an empty string if the data is not valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> &'boot str {
        str::from_utf8(self.data).unwrap_or("")
    }

    /// Get the raw bytes (without the null terminator)
    #[must_use]
    pub const fn as_bytes(&self) -> &'boot [u8] {
        self.data
    }
}

impl fmt::Debug for CmdlineTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CmdlineTag").field(&self.as_str()).finish()
    }
}

/// Bootloader name tag
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BootloaderNameTag<'boot> {
    data: &'boot [u8],
}

impl<'boot> BootloaderNameTag<'boot> {
    /// Decode a bootloader name payload
    ///
    /// # Errors
    ///
    /// Fails if there is no zero byte inside the payload.
    pub fn parse(payload: &'boot [u8]) -> Result<Self, TagDefect> {
        terminated(payload).map(|data| Self { data }).ok_or(TagDefect::Unterminated)
    }

    /// Get the bootloader name as a string
    #[must_use]
    pub fn as_str(&self) -> &'boot str {
        str::from_utf8(self.data).unwrap_or("")
    }

    /// Get the raw bytes (without the null terminator)
    #[must_use]
    pub const fn as_bytes(&self) -> &'boot [u8] {
        self.data
    }
}

impl fmt::Debug for BootloaderNameTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BootloaderNameTag").field(&self.as_str()).finish()
    }
}

/// ACPI root system description pointer
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AcpiRsdp {
    /// Physical address of the RSDP
    pub address: u64,
}

impl AcpiRsdp {
    /// Decode an ACPI RSDP payload
    ///
    /// # Errors
    ///
    /// Fails if the payload is short or the address is zero.
    pub fn parse(payload: &[u8]) -> Result<Self, TagDefect> {
        let address = read_u64(payload, 0).ok_or(TagDefect::TooSmall {
            size: (payload.len() + TagHeader::SIZE) as u32,
            minimum: min_size::ACPI_RSDP,
        })?;
        if address == 0 {
            return Err(TagDefect::ZeroField("rsdp_address"));
        }
        Ok(Self { address })
    }
}

impl fmt::Debug for AcpiRsdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AcpiRsdp").field(&format_args!("{:#x}", self.address)).finish()
    }
}

/// Initial ramdisk location
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InitrdInfo {
    /// Physical start address
    pub start: u64,
    /// Length in bytes
    pub length: u64,
}

impl InitrdInfo {
    /// Decode an initrd payload
    ///
    /// # Errors
    ///
    /// Fails if the payload is short or either field is zero.
    pub fn parse(payload: &[u8]) -> Result<Self, TagDefect> {
        let short = TagDefect::TooSmall {
            size: (payload.len() + TagHeader::SIZE) as u32,
            minimum: min_size::INITRD,
        };
        let start = read_u64(payload, 0).ok_or(short)?;
        let length = read_u64(payload, 8).ok_or(short)?;

        if start == 0 {
            return Err(TagDefect::ZeroField("start"));
        }
        if length == 0 {
            return Err(TagDefect::ZeroField("length"));
        }
        Ok(Self { start, length })
    }

    /// Exclusive end address, or `None` if it would not be representable
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }
}

impl fmt::Debug for InitrdInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitrdInfo")
            .field("start", &format_args!("{:#x}", self.start))
            .field("length", &format_args!("{:#x}", self.length))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BlobBuilder;

    fn walk(bytes: &[u8]) -> Vec<RawTag> {
        let blob = BootBlob::new(bytes).unwrap();
        TagIterator::new(blob).collect()
    }

    #[test]
    fn test_walk_stops_at_end() {
        let bytes = BlobBuilder::new()
            .string(tag_types::CMDLINE, "quiet")
            .end()
            .tag(0x8001, &[0; 8])
            .build();
        let tags = walk(&bytes);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].offset, 16);
        assert_eq!(tags[0].size(), 14);
        assert_eq!(tags[1].offset, 32);
        assert_eq!(tags[1].tag_type(), tag_types::END);
    }

    #[test]
    fn test_first_tag_needs_room() {
        // Smallest legal blob: header plus end tag
        let bytes = BlobBuilder::new().end().build();
        let blob = BootBlob::new(&bytes).unwrap();
        assert!(next_tag(&blob, None).is_some());

        let mut tiny = BlobBuilder::new().end().build();
        tiny[4..8].copy_from_slice(&23u32.to_le_bytes());
        assert!(BootBlob::new(&tiny).is_err());
    }

    #[test]
    fn test_undersized_tag_stops_walk() {
        let bytes = BlobBuilder::new()
            .tag_with_size(0x8000, 4, &[])
            .end()
            .build();
        let tags = walk(&bytes);
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_huge_sizes_never_escape_bounds() {
        for size in [u32::MAX, u32::MAX - 7, u32::MAX - 8, 0x8000_0000, 4096, 17, 8] {
            let bytes = BlobBuilder::new()
                .tag_with_size(0x8000, size, &[0; 8])
                .end()
                .build();
            let blob = BootBlob::new(&bytes).unwrap();
            for tag in TagIterator::new(blob) {
                assert!(tag.offset + TagHeader::SIZE <= blob.total_size() as usize);
            }
        }
    }

    #[test]
    fn test_parse_cmdline_and_bootloader() {
        let bytes = BlobBuilder::new()
            .string(tag_types::CMDLINE, "root=/dev/sda1 quiet")
            .string(tag_types::BOOTLOADER, "DeltaBoot 0.1")
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let tags: Vec<_> = TagIterator::new(blob)
            .filter_map(|raw| Tag::from_raw(&blob, &raw))
            .collect();

        assert_eq!(tags.len(), 3);
        match tags[0] {
            Tag::Cmdline(c) => assert_eq!(c.as_str(), "root=/dev/sda1 quiet"),
            other => panic!("unexpected {:?}", other),
        }
        match tags[1] {
            Tag::Bootloader(b) => assert_eq!(b.as_str(), "DeltaBoot 0.1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tags[2], Tag::End);
    }

    #[test]
    fn test_unterminated_string_skipped() {
        let bytes = BlobBuilder::new()
            .tag(tag_types::CMDLINE, b"abcde")
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raw = next_tag(&blob, None).unwrap();
        assert_eq!(Tag::parse(&blob, &raw), Err(TagDefect::Unterminated));
        assert!(Tag::from_raw(&blob, &raw).is_none());
    }

    #[test]
    fn test_terminator_must_be_inside_declared_size() {
        // Padding after the tag holds zeros, but they are not granted by `size`
        let bytes = BlobBuilder::new()
            .tag(tag_types::BOOTLOADER, b"abc")
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raw = next_tag(&blob, None).unwrap();
        assert_eq!(Tag::parse(&blob, &raw), Err(TagDefect::Unterminated));
    }

    #[test]
    fn test_empty_string_tag_too_small() {
        let bytes = BlobBuilder::new().tag(tag_types::CMDLINE, &[]).end().build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raw = next_tag(&blob, None).unwrap();
        assert_eq!(
            Tag::parse(&blob, &raw),
            Err(TagDefect::TooSmall { size: 8, minimum: 9 })
        );
    }

    #[test]
    fn test_acpi_and_initrd() {
        let mut initrd = Vec::new();
        initrd.extend_from_slice(&0x20_0000u64.to_le_bytes());
        initrd.extend_from_slice(&0x8000u64.to_le_bytes());

        let bytes = BlobBuilder::new()
            .address(tag_types::ACPI_RSDP, 0xE_0000)
            .tag(tag_types::INITRD, &initrd)
            .address(tag_types::ACPI_RSDP, 0)
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raws: Vec<_> = TagIterator::new(blob).collect();

        assert_eq!(Tag::parse(&blob, &raws[0]), Ok(Tag::AcpiRsdp(AcpiRsdp { address: 0xE_0000 })));
        let Ok(Tag::Initrd(info)) = Tag::parse(&blob, &raws[1]) else {
            panic!("initrd not decoded");
        };
        assert_eq!(info.start, 0x20_0000);
        assert_eq!(info.end(), Some(0x20_8000));
        assert_eq!(Tag::parse(&blob, &raws[2]), Err(TagDefect::ZeroField("rsdp_address")));
    }

    #[test]
    fn test_payload_past_blob_end() {
        let bytes = BlobBuilder::new()
            .tag_with_size(tag_types::ACPI_RSDP, 64, &0x1000u64.to_le_bytes())
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raw = next_tag(&blob, None).unwrap();
        assert_eq!(
            Tag::parse(&blob, &raw),
            Err(TagDefect::OutOfBounds { offset: 16, size: 64 })
        );
    }

    #[test]
    fn test_offset_near_usize_max_out_of_bounds() {
        let bytes = BlobBuilder::new().end().build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raw = RawTag {
            offset: usize::MAX,
            header: TagHeader { tag_type: tag_types::ACPI_RSDP, flags: 0, size: 16 },
        };
        assert_eq!(
            Tag::parse(&blob, &raw),
            Err(TagDefect::OutOfBounds { offset: usize::MAX, size: 16 })
        );
    }

    #[test]
    fn test_invalid_initrd_skipped() {
        let initrd = |start: u64, length: u64| {
            let mut p = Vec::new();
            p.extend_from_slice(&start.to_le_bytes());
            p.extend_from_slice(&length.to_le_bytes());
            p
        };

        let bytes = BlobBuilder::new()
            .tag(tag_types::INITRD, &initrd(0, 0x8000))
            .tag(tag_types::INITRD, &initrd(0x20_0000, 0))
            .tag(tag_types::INITRD, &[0; 8])
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        let raws: Vec<_> = TagIterator::new(blob).collect();

        assert_eq!(Tag::parse(&blob, &raws[0]), Err(TagDefect::ZeroField("start")));
        assert_eq!(Tag::parse(&blob, &raws[1]), Err(TagDefect::ZeroField("length")));
        assert_eq!(
            Tag::parse(&blob, &raws[2]),
            Err(TagDefect::TooSmall { size: 16, minimum: 24 })
        );
        assert!(raws[..3].iter().all(|raw| Tag::from_raw(&blob, raw).is_none()));
    }

    #[test]
    fn test_reserved_types_unrecognized() {
        let bytes = BlobBuilder::new()
            .tag(tag_types::MODULES, &[0; 16])
            .tag(tag_types::BOOT_TIME, &[0; 8])
            .tag(0xBEEF, &[0; 8])
            .end()
            .build();
        let blob = BootBlob::new(&bytes).unwrap();
        for raw in TagIterator::new(blob).filter(|r| r.tag_type() != tag_types::END) {
            assert_eq!(Tag::parse(&blob, &raw), Err(TagDefect::Unrecognized));
        }
    }
}
