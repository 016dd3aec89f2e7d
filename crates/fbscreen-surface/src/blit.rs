//! Surface Blitter
//!
//! Copies the damaged parts of a composited image into the mapped surface.
//! Source and destination may differ in stride and pixel format, so the copy
//! runs row by row through [`convert_row`].

use tracing::trace;

use crate::format::convert_row;
use crate::geometry::{Point, Rect};
use crate::image::{ImageView, ImageViewMut};

/// Rectangles that changed since the last blit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DamageRegion {
    rects: Vec<Rect>,
}

impl DamageRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add(rect);
        region
    }

    /// Add a rectangle; empty rectangles are dropped.
    pub fn add(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.rects.push(rect);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }

    pub fn bounding_rect(&self) -> Rect {
        self.rects.iter().fold(Rect::default(), |acc, r| acc.united(r))
    }

    pub fn contains(&self, p: Point) -> bool {
        self.rects.iter().any(|r| r.contains(p))
    }

    /// Every rectangle clipped to `bounds`.
    pub fn clipped(&self, bounds: &Rect) -> Self {
        self.rects.iter().map(|r| r.intersected(bounds)).collect()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

impl FromIterator<Rect> for DamageRegion {
    fn from_iter<T: IntoIterator<Item = Rect>>(iter: T) -> Self {
        let mut region = Self::new();
        region.extend(iter);
        region
    }
}

impl Extend<Rect> for DamageRegion {
    fn extend<T: IntoIterator<Item = Rect>>(&mut self, iter: T) {
        for rect in iter {
            self.add(rect);
        }
    }
}

/// Blit target bound to one surface layout, created once and reused for every
/// frame.
#[derive(Debug)]
pub struct Blitter {
    target: Rect,
    frames: u64,
    pixels: u64,
}

impl Blitter {
    pub fn new(target: &ImageViewMut<'_>) -> Self {
        Self {
            target: target.rect(),
            frames: 0,
            pixels: 0,
        }
    }

    /// Copy each damaged rectangle of `src` into `dst` at the same
    /// coordinates. Rectangles are clipped to both images first. Returns the
    /// rectangles actually copied.
    pub fn blit(
        &mut self,
        dst: &mut ImageViewMut<'_>,
        src: &ImageView<'_>,
        damage: &DamageRegion,
    ) -> DamageRegion {
        let mut touched = DamageRegion::new();
        if damage.is_empty() {
            return touched;
        }

        debug_assert_eq!(dst.rect(), self.target, "blitter reused on a different surface");

        let bounds = self.target.intersected(&dst.rect()).intersected(&src.rect());
        let (src_format, dst_format) = (src.format(), dst.format());

        for rect in damage.iter() {
            let r = rect.intersected(&bounds);
            if r.is_empty() {
                continue;
            }

            let (x, width) = (r.x as u32, r.width);
            for y in r.y as u32..r.bottom() as u32 {
                convert_row(
                    src_format,
                    src.span(x, y, width),
                    dst_format,
                    dst.span_mut(x, y, width),
                    width as usize,
                );
            }

            self.pixels += r.area();
            touched.add(r);
        }

        self.frames += 1;
        trace!("Blitted {} rects ({:?})", touched.len(), touched.bounding_rect());
        touched
    }

    /// Number of non-empty blits performed.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn pixels_copied(&self) -> u64 {
        self.pixels
    }
}
