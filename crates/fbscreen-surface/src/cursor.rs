//! Cursor overlay host
//!
//! Tracks where the pointer is and what it looks like. Drawing the cursor
//! into the scene is the compositor's job; this only reports which screen
//! areas must be repainted when the cursor moves or changes.

use tracing::debug;

use crate::blit::DamageRegion;
use crate::geometry::{Point, Rect};

/// Size assumed until the compositor supplies an image.
pub const DEFAULT_CURSOR_SIZE: u32 = 16;

#[derive(Debug, Clone)]
pub struct CursorOverlay {
    /// Hotspot position in surface coordinates
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub xhot: u32,
    pub yhot: u32,
    pub serial: u32,
    /// ARGB pixels, row-major
    pub pixels: Vec<u32>,
    pub visible: bool,
    pub dirty: bool,
    /// Previous position to detect movement
    pub prev_x: i32,
    pub prev_y: i32,
    screen: Rect,
}

impl CursorOverlay {
    /// New cursor at the center of `screen`.
    pub fn new(screen: Rect) -> Self {
        let x = screen.x + (screen.width / 2) as i32;
        let y = screen.y + (screen.height / 2) as i32;
        Self {
            x,
            y,
            width: DEFAULT_CURSOR_SIZE,
            height: DEFAULT_CURSOR_SIZE,
            xhot: 0,
            yhot: 0,
            serial: 0,
            pixels: Vec::new(),
            visible: true,
            dirty: true,
            prev_x: x,
            prev_y: y,
            screen,
        }
    }

    /// Area covered by the cursor image, clipped to the screen.
    pub fn rect(&self) -> Rect {
        let hot = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        Rect::new(
            self.x.saturating_sub(hot(self.xhot)),
            self.y.saturating_sub(hot(self.yhot)),
            self.width,
            self.height,
        )
        .intersected(&self.screen)
    }

    /// Move the hotspot; returns the old and new cursor areas.
    pub fn update_position(&mut self, x: i32, y: i32) -> DamageRegion {
        if self.x == x && self.y == y {
            return DamageRegion::new();
        }

        let old = self.rect();
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.x = x;
        self.y = y;
        self.dirty = true;

        if self.visible {
            [old, self.rect()].into_iter().collect()
        } else {
            DamageRegion::new()
        }
    }

    /// Check if cursor moved since the previous position update
    pub fn has_moved(&self) -> bool {
        self.x != self.prev_x || self.y != self.prev_y
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Replace the cursor image. Images with the current serial are ignored.
    pub fn update_image(
        &mut self,
        serial: u32,
        width: u32,
        height: u32,
        xhot: u32,
        yhot: u32,
        pixels: Vec<u32>,
    ) -> DamageRegion {
        if serial == self.serial && !self.pixels.is_empty() {
            return DamageRegion::new();
        }

        let old = self.rect();
        self.serial = serial;
        self.width = width;
        self.height = height;
        self.xhot = xhot;
        self.yhot = yhot;
        self.pixels = pixels;
        self.dirty = true;
        debug!("Cursor image {} ({}x{}, hot {},{})", serial, width, height, xhot, yhot);

        if self.visible {
            [old, self.rect()].into_iter().collect()
        } else {
            DamageRegion::new()
        }
    }

    pub fn set_visible(&mut self, visible: bool) -> DamageRegion {
        if self.visible == visible {
            return DamageRegion::new();
        }
        self.visible = visible;
        self.dirty = true;
        DamageRegion::from_rect(self.rect())
    }

    /// Clear and return the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_centered() {
        let cursor = CursorOverlay::new(Rect::new(0, 0, 640, 480));
        assert_eq!(cursor.position(), Point::new(320, 240));
        assert!(!cursor.has_moved());
        assert_eq!(cursor.rect(), Rect::new(320, 240, 16, 16));
    }

    #[test]
    fn test_move_damages_old_and_new_area() {
        let mut cursor = CursorOverlay::new(Rect::new(0, 0, 640, 480));
        cursor.take_dirty();

        let damage = cursor.update_position(630, 10);
        assert_eq!(damage.rects(), &[Rect::new(320, 240, 16, 16), Rect::new(630, 10, 10, 16)]);
        assert!(cursor.has_moved());
        assert!(cursor.take_dirty());

        assert!(cursor.update_position(630, 10).is_empty());
    }

    #[test]
    fn test_image_update_respects_serial_and_hotspot() {
        let mut cursor = CursorOverlay::new(Rect::new(0, 0, 100, 100));
        let damage = cursor.update_image(7, 8, 8, 4, 4, vec![0xffffffff; 64]);
        assert_eq!(damage.len(), 2);
        assert_eq!(cursor.rect(), Rect::new(46, 46, 8, 8));

        assert!(cursor.update_image(7, 8, 8, 4, 4, vec![0; 64]).is_empty());
        assert_eq!(cursor.pixels[0], 0xffffffff);
    }

    #[test]
    fn test_extreme_positions_clip_to_nothing() {
        let mut cursor = CursorOverlay::new(Rect::new(0, 0, 100, 100));
        cursor.update_image(1, 8, 8, 4, 4, vec![0; 64]);

        let damage = cursor.update_position(i32::MIN, i32::MIN);
        assert_eq!(damage.rects(), &[Rect::new(46, 46, 8, 8)]);
        assert!(cursor.rect().is_empty());

        cursor.update_position(i32::MAX, 0);
        assert!(cursor.rect().is_empty());
    }

    #[test]
    fn test_hidden_cursor_reports_no_move_damage() {
        let mut cursor = CursorOverlay::new(Rect::new(0, 0, 100, 100));
        assert_eq!(cursor.set_visible(false).len(), 1);
        assert!(cursor.update_position(10, 10).is_empty());
        assert!(cursor.set_visible(false).is_empty());
    }
}
