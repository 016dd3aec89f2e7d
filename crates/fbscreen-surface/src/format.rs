//! Pixel formats and per-pixel conversion.
//!
//! Conversions go through a packed `0xAARRGGBB` value. 32-bit formats are
//! stored in native byte order, `Rgb888` as R, G, B bytes, `Rgb16` as a
//! native-endian 5-6-5 word.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit xRGB, alpha ignored
    Rgb32,
    /// 32-bit ARGB
    Argb32,
    /// 24-bit packed RGB
    Rgb888,
    /// 16-bit RGB 5-6-5
    Rgb16,
}

impl PixelFormat {
    /// Device format for a driver-reported color depth. Anything that is not
    /// 32 or 24 bits is treated as 16-bit.
    pub fn from_depth(depth: u32) -> Self {
        match depth {
            32 => Self::Rgb32,
            24 => Self::Rgb888,
            16 => Self::Rgb16,
            other => {
                warn!("Unsupported framebuffer depth {}, assuming 16 bpp", other);
                Self::Rgb16
            }
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb32 | Self::Argb32 => 4,
            Self::Rgb888 => 3,
            Self::Rgb16 => 2,
        }
    }

    pub fn depth(self) -> u32 {
        self.bytes_per_pixel() as u32 * 8
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Argb32)
    }

    /// Decode one pixel from the start of `px`.
    #[inline]
    pub fn read(self, px: &[u8]) -> u32 {
        match self {
            Self::Rgb32 => u32::from_ne_bytes([px[0], px[1], px[2], px[3]]) | 0xff00_0000,
            Self::Argb32 => u32::from_ne_bytes([px[0], px[1], px[2], px[3]]),
            Self::Rgb888 => {
                0xff00_0000 | (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32
            }
            Self::Rgb16 => {
                let v = u16::from_ne_bytes([px[0], px[1]]) as u32;
                let r = (v >> 11) & 0x1f;
                let g = (v >> 5) & 0x3f;
                let b = v & 0x1f;
                // Replicate high bits so full intensity maps to 0xff
                let r = (r << 3) | (r >> 2);
                let g = (g << 2) | (g >> 4);
                let b = (b << 3) | (b >> 2);
                0xff00_0000 | r << 16 | g << 8 | b
            }
        }
    }

    /// Encode `argb` into the start of `px`.
    #[inline]
    pub fn write(self, argb: u32, px: &mut [u8]) {
        match self {
            Self::Rgb32 => px[..4].copy_from_slice(&(argb | 0xff00_0000).to_ne_bytes()),
            Self::Argb32 => px[..4].copy_from_slice(&argb.to_ne_bytes()),
            Self::Rgb888 => {
                px[0] = (argb >> 16) as u8;
                px[1] = (argb >> 8) as u8;
                px[2] = argb as u8;
            }
            Self::Rgb16 => {
                let r = (argb >> 19) & 0x1f;
                let g = (argb >> 10) & 0x3f;
                let b = (argb >> 3) & 0x1f;
                let v = (r << 11 | g << 5 | b) as u16;
                px[..2].copy_from_slice(&v.to_ne_bytes());
            }
        }
    }

    /// Whether rows in `self` can be copied byte-for-byte into `dst`.
    pub fn is_layout_compatible(self, dst: PixelFormat) -> bool {
        self == dst
            || matches!(
                (self, dst),
                (Self::Argb32, Self::Rgb32) | (Self::Rgb32, Self::Argb32)
            )
    }
}

/// Convert `width` pixels from `src` (in `src_format`) into `dst`.
pub fn convert_row(
    src_format: PixelFormat,
    src: &[u8],
    dst_format: PixelFormat,
    dst: &mut [u8],
    width: usize,
) {
    let sbpp = src_format.bytes_per_pixel();
    let dbpp = dst_format.bytes_per_pixel();

    if src_format == dst_format
        || (src_format == PixelFormat::Argb32 && dst_format == PixelFormat::Rgb32)
    {
        dst[..width * dbpp].copy_from_slice(&src[..width * sbpp]);
        return;
    }

    if src_format.is_layout_compatible(dst_format) {
        // Rgb32 into Argb32: force opaque alpha
        let src: &[u8] = &src[..width * 4];
        for (s, d) in src.chunks_exact(4).zip(dst[..width * 4].chunks_exact_mut(4)) {
            d.copy_from_slice(s);
            d[alpha_byte()] = 0xff;
        }
        return;
    }

    for (s, d) in src[..width * sbpp]
        .chunks_exact(sbpp)
        .zip(dst[..width * dbpp].chunks_exact_mut(dbpp))
    {
        dst_format.write(src_format.read(s), d);
    }
}

const fn alpha_byte() -> usize {
    if cfg!(target_endian = "little") {
        3
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_mapping() {
        assert_eq!(PixelFormat::from_depth(32), PixelFormat::Rgb32);
        assert_eq!(PixelFormat::from_depth(24), PixelFormat::Rgb888);
        assert_eq!(PixelFormat::from_depth(16), PixelFormat::Rgb16);
        assert_eq!(PixelFormat::from_depth(8), PixelFormat::Rgb16);
        assert_eq!(PixelFormat::from_depth(0), PixelFormat::Rgb16);
    }

    #[test]
    fn test_rgb16_extremes() {
        let mut px = [0u8; 2];
        PixelFormat::Rgb16.write(0xffff_ffff, &mut px);
        assert_eq!(u16::from_ne_bytes(px), 0xffff);
        assert_eq!(PixelFormat::Rgb16.read(&px), 0xffff_ffff);

        PixelFormat::Rgb16.write(0xffff_0000, &mut px);
        assert_eq!(u16::from_ne_bytes(px), 0xf800);
        assert_eq!(PixelFormat::Rgb16.read(&px), 0xffff_0000);
    }

    #[test]
    fn test_rgb888_byte_order() {
        let mut px = [0u8; 3];
        PixelFormat::Rgb888.write(0xff12_3456, &mut px);
        assert_eq!(px, [0x12, 0x34, 0x56]);
        assert_eq!(PixelFormat::Rgb888.read(&px), 0xff12_3456);
    }

    #[test]
    fn test_convert_row_argb_to_rgb888() {
        let mut src = [0u8; 8];
        PixelFormat::Argb32.write(0x80ff_0000, &mut src[0..4]);
        PixelFormat::Argb32.write(0xff00_00ff, &mut src[4..8]);

        let mut dst = [0u8; 6];
        convert_row(PixelFormat::Argb32, &src, PixelFormat::Rgb888, &mut dst, 2);
        assert_eq!(dst, [0xff, 0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn test_convert_row_rgb32_to_argb_is_opaque() {
        let mut src = [0u8; 4];
        src.copy_from_slice(&0x0011_2233u32.to_ne_bytes());
        let mut dst = [0u8; 4];
        convert_row(PixelFormat::Rgb32, &src, PixelFormat::Argb32, &mut dst, 1);
        assert_eq!(u32::from_ne_bytes(dst), 0xff11_2233);
    }
}
