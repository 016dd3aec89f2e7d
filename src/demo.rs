//! Demo scene: a tile bouncing across a solid background. Each step repaints
//! only the old and new tile areas, so redraws stay damage-driven.

use fbscreen_surface::{DamageRegion, Image, PixelFormat, Rect, Size};

use crate::config::DemoConfig;

/// Opaque ARGB from a config color
pub fn opaque(rgb: u32) -> u32 {
    0xff00_0000 | (rgb & 0x00ff_ffff)
}

pub struct Scene {
    image: Image,
    tile: Rect,
    dx: i32,
    dy: i32,
    background: u32,
    foreground: u32,
}

impl Scene {
    pub fn new(size: Size, config: &DemoConfig) -> Self {
        let side = config.tile_size.min(size.width).min(size.height);
        let mut image = Image::new(size.width, size.height, PixelFormat::Argb32);
        image.fill(opaque(config.background));

        let tile = Rect::new(0, 0, side, side);
        image.fill_rect(tile, opaque(config.foreground));

        Self {
            image,
            tile,
            dx: 4,
            dy: 3,
            background: opaque(config.background),
            foreground: opaque(config.foreground),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn tile(&self) -> Rect {
        self.tile
    }

    /// Everything; used for the first frame.
    pub fn full_damage(&self) -> DamageRegion {
        DamageRegion::from_rect(self.image.rect())
    }

    /// Move the tile one step, bouncing off the edges.
    pub fn advance(&mut self) -> DamageRegion {
        let bounds = self.image.rect();
        let old = self.tile;

        let max_x = (bounds.width - old.width) as i32;
        let max_y = (bounds.height - old.height) as i32;
        let (x, dx) = bounce(old.x, self.dx, max_x);
        let (y, dy) = bounce(old.y, self.dy, max_y);
        self.dx = dx;
        self.dy = dy;

        let new = Rect::new(x, y, old.width, old.height);
        if new == old {
            return DamageRegion::new();
        }

        self.image.fill_rect(old, self.background);
        self.image.fill_rect(new, self.foreground);
        self.tile = new;

        [old, new].into_iter().collect()
    }
}

fn bounce(pos: i32, step: i32, max: i32) -> (i32, i32) {
    if max <= 0 {
        return (0, step);
    }
    let next = pos + step;
    if next < 0 {
        (-next, -step)
    } else if next > max {
        (2 * max - next, -step)
    } else {
        (next, step)
    }
}
