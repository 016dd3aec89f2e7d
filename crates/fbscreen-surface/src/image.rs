//! Images
//!
//! [`Image`] owns its pixels (composited scenes, captures). [`ImageView`] and
//! [`ImageViewMut`] are borrowed projections over someone else's bytes, such as
//! the mapped framebuffer, described by width, height, stride and format.

use std::io::{self, Write};

use crate::format::PixelFormat;
use crate::geometry::{Rect, Size};

/// Bytes needed to hold `height` rows of `width` pixels at `stride`.
fn required_len(width: u32, height: u32, stride: usize, format: PixelFormat) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    stride * (height as usize - 1) + width as usize * format.bytes_per_pixel()
}

fn layout_ok(len: usize, width: u32, height: u32, stride: usize, format: PixelFormat) -> bool {
    stride >= width as usize * format.bytes_per_pixel()
        && len >= required_len(width, height, stride, format)
}

/// Read-only pixel view
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> ImageView<'a> {
    /// `None` if `data` is too short for the described layout.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Option<Self> {
        layout_ok(data.len(), width, height, stride, format).then_some(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    /// Layout already validated by the caller.
    pub(crate) fn new_unchecked(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Self {
        debug_assert!(layout_ok(data.len(), width, height, stride, format));
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(Size::new(self.width, self.height))
    }

    /// Bytes of `len` pixels starting at (`x`, `y`). Caller keeps it in bounds.
    pub fn span(&self, x: u32, y: u32, len: u32) -> &'a [u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        &self.data[start..start + len as usize * bpp]
    }

    pub fn row(&self, y: u32) -> &'a [u8] {
        self.span(0, y, self.width)
    }

    /// Pixel as `0xAARRGGBB`.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.format.read(self.span(x, y, 1))
    }

    /// Copy `rect`, clipped to this view, into a new packed image.
    pub fn copy(&self, rect: Rect) -> Image {
        let rect = rect.intersected(&self.rect());
        let mut out = Image::new(rect.width, rect.height, self.format);
        for row in 0..rect.height {
            let src = self.span(rect.x as u32, rect.y as u32 + row, rect.width);
            out.row_mut(row).copy_from_slice(src);
        }
        out
    }
}

/// Writable pixel view
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> ImageViewMut<'a> {
    pub fn new(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Option<Self> {
        if !layout_ok(data.len(), width, height, stride, format) {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    pub(crate) fn new_unchecked(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Self {
        debug_assert!(layout_ok(data.len(), width, height, stride, format));
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(Size::new(self.width, self.height))
    }

    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &*self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn span_mut(&mut self, x: u32, y: u32, len: u32) -> &mut [u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        &mut self.data[start..start + len as usize * bpp]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, argb: u32) {
        let format = self.format;
        format.write(argb, self.span_mut(x, y, 1));
    }

    /// Fill `rect`, clipped to this view.
    pub fn fill_rect(&mut self, rect: Rect, argb: u32) {
        let rect = rect.intersected(&self.rect());
        if rect.is_empty() {
            return;
        }

        let format = self.format;
        let bpp = format.bytes_per_pixel();
        let mut encoded = [0u8; 4];
        format.write(argb, &mut encoded);

        for y in rect.y as u32..rect.bottom() as u32 {
            for px in self.span_mut(rect.x as u32, y, rect.width).chunks_exact_mut(bpp) {
                px.copy_from_slice(&encoded[..bpp]);
            }
        }
    }
}

/// Owned, tightly packed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Zero-filled image.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap existing pixel data; `None` if it does not fit the layout.
    pub fn from_data(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Option<Self> {
        layout_ok(data.len(), width, height, stride, format).then_some(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// 0x0 image, returned for captures that resolve to nothing.
    pub fn empty(format: PixelFormat) -> Self {
        Self::new(0, 0, format)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(self.size())
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn view_mut(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            data: &mut self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let width = self.width;
        self.view_mut_span(0, y, width)
    }

    fn view_mut_span(&mut self, x: u32, y: u32, len: u32) -> &mut [u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        &mut self.data[start..start + len as usize * bpp]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.view().pixel(x, y)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, argb: u32) {
        self.view_mut().set_pixel(x, y, argb);
    }

    pub fn fill(&mut self, argb: u32) {
        let rect = self.rect();
        self.view_mut().fill_rect(rect, argb);
    }

    pub fn fill_rect(&mut self, rect: Rect, argb: u32) {
        self.view_mut().fill_rect(rect, argb);
    }

    /// Write as binary PPM (P6); alpha is dropped.
    pub fn write_ppm<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        let view = self.view();
        let mut line = Vec::with_capacity(self.width as usize * 3);
        for y in 0..self.height {
            line.clear();
            for x in 0..self.width {
                let argb = view.pixel(x, y);
                line.extend_from_slice(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8]);
            }
            out.write_all(&line)?;
        }
        Ok(())
    }
}
