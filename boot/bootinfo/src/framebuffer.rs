//! # Framebuffer Tag
//!
//! Linear framebuffer description handed over by the loader.

use core::fmt;

use crate::layout::{min_size, RawFramebuffer, TagHeader};
use crate::validate::TagDefect;

/// Position and width of one color component within a pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorChannel {
    /// Bit offset of the component
    pub shift: u8,
    /// Width of the component in bits
    pub size: u8,
}

impl ColorChannel {
    /// Bit mask of this component within a pixel value
    #[must_use]
    pub const fn mask(&self) -> u32 {
        if self.size == 0 || self.shift >= 32 {
            return 0;
        }
        let bits = if self.size >= 32 { u32::MAX } else { (1u32 << self.size) - 1 };
        bits << self.shift
    }
}

/// Validated framebuffer information
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// Framebuffer physical address
    pub address: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pitch (bytes per line)
    pub pitch: u32,
    /// Bits per pixel
    pub bpp: u8,
    /// Red component
    pub red: ColorChannel,
    /// Green component
    pub green: ColorChannel,
    /// Blue component
    pub blue: ColorChannel,
    /// Reserved (unused) component
    pub reserved: ColorChannel,
}

impl FramebufferInfo {
    /// Decode and validate a framebuffer tag payload
    ///
    /// # Errors
    ///
    /// Fails if the payload is short, or if the address, width, height or
    /// depth is zero.
    pub fn parse(payload: &[u8]) -> Result<Self, TagDefect> {
        let d: &[u8; RawFramebuffer::SIZE] = payload
            .get(..RawFramebuffer::SIZE)
            .and_then(|p| p.try_into().ok())
            .ok_or(TagDefect::TooSmall {
                size: (payload.len() + TagHeader::SIZE) as u32,
                minimum: min_size::FRAMEBUFFER,
            })?;

        let channel = |i: usize| ColorChannel { shift: d[21 + 2 * i], size: d[22 + 2 * i] };
        let info = Self {
            address: u64::from_le_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]]),
            width: u32::from_le_bytes([d[8], d[9], d[10], d[11]]),
            height: u32::from_le_bytes([d[12], d[13], d[14], d[15]]),
            pitch: u32::from_le_bytes([d[16], d[17], d[18], d[19]]),
            bpp: d[20],
            red: channel(0),
            green: channel(1),
            blue: channel(2),
            reserved: channel(3),
        };

        if info.width == 0 {
            return Err(TagDefect::ZeroField("width"));
        }
        if info.height == 0 {
            return Err(TagDefect::ZeroField("height"));
        }
        if info.bpp == 0 {
            return Err(TagDefect::ZeroField("bpp"));
        }
        if info.address == 0 {
            return Err(TagDefect::ZeroField("address"));
        }

        Ok(info)
    }

    /// Get framebuffer size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.pitch as u64 * self.height as u64
    }

    /// Bytes occupied by one pixel, rounded up
    #[must_use]
    pub const fn bytes_per_pixel(&self) -> u32 {
        (self.bpp as u32).div_ceil(8)
    }
}

impl fmt::Debug for FramebufferInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferInfo")
            .field("address", &format_args!("{:#x}", self.address))
            .field("resolution", &format_args!("{}x{}", self.width, self.height))
            .field("bpp", &self.bpp)
            .field("pitch", &self.pitch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(address: u64, width: u32, height: u32, bpp: u8) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&address.to_le_bytes());
        p.extend_from_slice(&width.to_le_bytes());
        p.extend_from_slice(&height.to_le_bytes());
        p.extend_from_slice(&(width * 4).to_le_bytes());
        p.push(bpp);
        p.extend_from_slice(&[16, 8, 8, 8, 0, 8, 24, 8]);
        p.extend_from_slice(&[0; 3]);
        p
    }

    #[test]
    fn test_parse_framebuffer() {
        let fb = FramebufferInfo::parse(&payload(0xFD00_0000, 1024, 768, 32)).unwrap();
        assert_eq!(fb.address, 0xFD00_0000);
        assert_eq!(fb.width, 1024);
        assert_eq!(fb.height, 768);
        assert_eq!(fb.pitch, 4096);
        assert_eq!(fb.bytes_per_pixel(), 4);
        assert_eq!(fb.size(), 4096 * 768);
        assert_eq!(fb.red, ColorChannel { shift: 16, size: 8 });
        assert_eq!(fb.blue, ColorChannel { shift: 0, size: 8 });
        assert_eq!(fb.red.mask(), 0x00FF_0000);
        assert_eq!(fb.reserved.mask(), 0xFF00_0000);
    }

    #[test]
    fn test_rejects_zero_fields() {
        assert_eq!(
            FramebufferInfo::parse(&payload(0, 1024, 768, 32)),
            Err(TagDefect::ZeroField("address"))
        );
        assert_eq!(
            FramebufferInfo::parse(&payload(0x1000, 0, 768, 32)),
            Err(TagDefect::ZeroField("width"))
        );
        assert_eq!(
            FramebufferInfo::parse(&payload(0x1000, 1024, 0, 32)),
            Err(TagDefect::ZeroField("height"))
        );
        assert_eq!(
            FramebufferInfo::parse(&payload(0x1000, 1024, 768, 0)),
            Err(TagDefect::ZeroField("bpp"))
        );
    }

    #[test]
    fn test_rejects_short_payload() {
        let p = payload(0x1000, 1024, 768, 32);
        assert_eq!(
            FramebufferInfo::parse(&p[..20]),
            Err(TagDefect::TooSmall { size: 28, minimum: 40 })
        );
    }
}
