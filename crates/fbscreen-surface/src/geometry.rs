//! Geometry Module
//!
//! Rectangle primitives and the negotiation between what the driver reports
//! and what the user asked for (`size=`, `offset=`, `mmsize=`).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::HardwareInfo;

/// Size substituted when negotiation ends up with a zero width or height.
pub const FALLBACK_SIZE: Size = Size::new(320, 240);

/// Resolution assumed when no physical size is known at all.
pub const DEFAULT_DPI: u32 = 100;

/// Pixel position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel (or millimeter) extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin covering `size`.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, p: Point) -> bool {
        (p.x as i64) >= self.x as i64
            && (p.x as i64) < self.right()
            && (p.y as i64) >= self.y as i64
            && (p.y as i64) < self.bottom()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }

    /// Overlap of two rectangles; empty (all zero) if they do not meet.
    pub fn intersected(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x1 <= x0 as i64 || y1 <= y0 as i64 {
            return Rect::default();
        }

        Rect::new(x0, y0, (x1 - x0 as i64) as u32, (y1 - y0 as i64) as u32)
    }

    /// Bounding box of two rectangles. Empty operands are ignored.
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());

        Rect::new(
            x0,
            y0,
            (x1 - x0 as i64).min(u32::MAX as i64) as u32,
            (y1 - y0 as i64).min(u32::MAX as i64) as u32,
        )
    }
}

/// Physical screen size in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub width_mm: u32,
    pub height_mm: u32,
}

/// Final surface geometry: the visible rectangle inside the hardware
/// framebuffer plus its physical size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub rect: Rect,
    pub physical: PhysicalSize,
}

/// What the user asked for. `None` means the token was absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryRequest {
    pub size: Option<Size>,
    pub offset: Option<Point>,
    /// Physical size in mm; a zero component counts as not supplied.
    pub physical: Option<Size>,
}

/// Reconciles driver-reported geometry with user overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryNegotiator {
    /// Used when the resulting width or height would be zero
    pub fallback_size: Size,
    /// Used to derive millimeters when no physical size is known
    pub assumed_dpi: u32,
}

impl Default for GeometryNegotiator {
    fn default() -> Self {
        Self {
            fallback_size: FALLBACK_SIZE,
            assumed_dpi: DEFAULT_DPI,
        }
    }
}

impl GeometryNegotiator {
    pub fn negotiate(&self, hw: &HardwareInfo, request: &GeometryRequest) -> Geometry {
        let rect = self.visible_rect(hw.size(), request.size, request.offset);

        // User millimeters win over the driver's, if the user gave any. The
        // driver's describe the whole panel, so they follow the visible share.
        let physical_request = request
            .physical
            .filter(|mm| mm.width > 0 || mm.height > 0)
            .or_else(|| hw.physical_mm.and_then(|mm| visible_share(mm, hw.size(), rect.size())));
        let physical = self.physical_size(physical_request, rect.size());

        debug!(
            "Negotiated geometry {}x{}+{}+{} ({}x{} mm) on {}x{} hardware",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            physical.width_mm,
            physical.height_mm,
            hw.width,
            hw.height
        );

        Geometry { rect, physical }
    }

    /// Choose the visible rectangle within `hw`.
    ///
    /// Without a requested size the whole framebuffer is used and any
    /// requested offset is ignored. A requested size is clamped to the
    /// hardware; a nonzero offset is clamped so the rectangle stays inside,
    /// a zero (or absent) offset centers it.
    pub fn visible_rect(&self, hw: Size, size: Option<Size>, offset: Option<Point>) -> Rect {
        let Some(requested) = size else {
            if offset.is_some() {
                debug!("offset= given without size=, ignoring");
            }
            return self.with_fallback(Rect::from_size(hw), hw);
        };

        let width = requested.width.min(hw.width);
        let height = requested.height.min(hw.height);
        let size = self.substitute_empty(Size::new(width, height));

        let offset = offset.unwrap_or_default();
        let (x, y) = if offset.x != 0 || offset.y != 0 {
            (
                clamp_offset(hw.width, size.width, offset.x),
                clamp_offset(hw.height, size.height, offset.y),
            )
        } else {
            (
                centered_offset(hw.width, size.width),
                centered_offset(hw.height, size.height),
            )
        };

        Rect::new(x, y, size.width, size.height)
    }

    /// Millimeter size for `resolution`. Both given: used as-is. One given:
    /// the other follows the pixel aspect ratio. None: `assumed_dpi`.
    pub fn physical_size(&self, requested: Option<Size>, resolution: Size) -> PhysicalSize {
        let (mut width_mm, mut height_mm) = requested
            .map(|mm| (mm.width, mm.height))
            .unwrap_or((0, 0));

        if width_mm == 0 && height_mm == 0 {
            let dpi = self.assumed_dpi.max(1) as f64;
            width_mm = (resolution.width as f64 * 25.4 / dpi).round() as u32;
            height_mm = (resolution.height as f64 * 25.4 / dpi).round() as u32;
        } else if height_mm == 0 {
            height_mm = scale(resolution.height, width_mm, resolution.width);
        } else if width_mm == 0 {
            width_mm = scale(resolution.width, height_mm, resolution.height);
        }

        PhysicalSize {
            width_mm,
            height_mm,
        }
    }

    fn with_fallback(&self, rect: Rect, hw: Size) -> Rect {
        if !rect.is_empty() {
            return rect;
        }
        let size = self.substitute_empty(rect.size());
        Rect::new(
            centered_offset(hw.width, size.width),
            centered_offset(hw.height, size.height),
            size.width,
            size.height,
        )
    }

    fn substitute_empty(&self, size: Size) -> Size {
        if size.is_empty() {
            warn!(
                "Unable to find screen geometry, using {}x{}",
                self.fallback_size.width, self.fallback_size.height
            );
            self.fallback_size
        } else {
            size
        }
    }
}

/// Panel millimeters scaled to the part of the panel `visible` covers.
fn visible_share(panel_mm: Size, hw: Size, visible: Size) -> Option<Size> {
    if hw.width == 0 || hw.height == 0 {
        return None;
    }
    let share = |mm: u32, part: u32, whole: u32| {
        let scaled = (mm as u64 * part as u64 + whole as u64 / 2) / whole as u64;
        scaled.min(u32::MAX as u64) as u32
    };
    Some(Size::new(
        share(panel_mm.width, visible.width, hw.width),
        share(panel_mm.height, visible.height, hw.height),
    ))
}

fn clamp_offset(hw: u32, len: u32, requested: i32) -> i32 {
    if requested < 0 || requested as u64 + len as u64 > hw as u64 {
        to_i32(hw.saturating_sub(len))
    } else {
        requested
    }
}

fn centered_offset(hw: u32, len: u32) -> i32 {
    to_i32(hw.saturating_sub(len) / 2)
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// `a * b / c` in integer arithmetic, 0 when `c` is 0.
fn scale(a: u32, b: u32, c: u32) -> u32 {
    if c == 0 {
        return 0;
    }
    (a as u64 * b as u64 / c as u64).min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hw(width: u32, height: u32) -> HardwareInfo {
        HardwareInfo {
            width,
            height,
            depth: 32,
            stride: width * 4,
            physical_mm: None,
        }
    }

    #[test]
    fn test_size_and_offset_within_bounds() {
        let request = GeometryRequest {
            size: Some(Size::new(800, 600)),
            offset: Some(Point::new(100, 50)),
            physical: None,
        };
        let geometry = GeometryNegotiator::default().negotiate(&hw(1024, 768), &request);

        assert_eq!(geometry.rect, Rect::new(100, 50, 800, 600));
        assert_eq!(
            geometry.physical,
            PhysicalSize {
                width_mm: 203,
                height_mm: 152
            }
        );
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let request = GeometryRequest {
            size: Some(Size::new(2000, 2000)),
            ..Default::default()
        };
        let geometry = GeometryNegotiator::default().negotiate(&hw(1024, 768), &request);

        assert_eq!(geometry.rect, Rect::new(0, 0, 1024, 768));
    }

    #[test]
    fn test_no_request_uses_full_hardware() {
        let request = GeometryRequest {
            offset: Some(Point::new(10, 10)),
            ..Default::default()
        };
        let rect = GeometryNegotiator::default()
            .negotiate(&hw(640, 480), &request)
            .rect;

        assert_eq!(rect, Rect::new(0, 0, 640, 480));
    }

    #[test]
    fn test_zero_offset_centers() {
        let negotiator = GeometryNegotiator::default();
        let rect = negotiator.visible_rect(Size::new(1024, 768), Some(Size::new(800, 600)), None);
        assert_eq!(rect, Rect::new(112, 84, 800, 600));

        let rect = negotiator.visible_rect(
            Size::new(1024, 768),
            Some(Size::new(800, 600)),
            Some(Point::new(0, 0)),
        );
        assert_eq!(rect, Rect::new(112, 84, 800, 600));
    }

    #[test]
    fn test_overflowing_offset_is_pulled_back() {
        let rect = GeometryNegotiator::default().visible_rect(
            Size::new(1024, 768),
            Some(Size::new(800, 600)),
            Some(Point::new(500, 20)),
        );
        assert_eq!(rect, Rect::new(224, 20, 800, 600));
    }

    #[test]
    fn test_zero_size_falls_back() {
        let negotiator = GeometryNegotiator::default();
        let rect = negotiator.visible_rect(Size::new(1024, 768), Some(Size::new(0, 600)), None);
        assert_eq!(rect.size(), FALLBACK_SIZE);

        // Driver reporting nothing at all
        let rect = negotiator.visible_rect(Size::new(0, 0), None, None);
        assert_eq!(rect, Rect::new(0, 0, 320, 240));
    }

    #[test]
    fn test_fallback_is_overridable() {
        let negotiator = GeometryNegotiator {
            fallback_size: Size::new(64, 48),
            ..Default::default()
        };
        let rect = negotiator.visible_rect(Size::new(100, 100), Some(Size::new(0, 0)), None);
        assert_eq!(rect, Rect::new(18, 26, 64, 48));
    }

    #[test]
    fn test_physical_size_single_dimension() {
        let negotiator = GeometryNegotiator::default();
        let res = Size::new(800, 600);

        let mm = negotiator.physical_size(Some(Size::new(400, 0)), res);
        assert_eq!((mm.width_mm, mm.height_mm), (400, 300));

        let mm = negotiator.physical_size(Some(Size::new(0, 150)), res);
        assert_eq!((mm.width_mm, mm.height_mm), (200, 150));

        let mm = negotiator.physical_size(Some(Size::new(310, 170)), res);
        assert_eq!((mm.width_mm, mm.height_mm), (310, 170));
    }

    #[test]
    fn test_driver_physical_size_used_when_user_gives_none() {
        let mut info = hw(1024, 768);
        info.physical_mm = Some(Size::new(260, 195));
        let geometry = GeometryNegotiator::default().negotiate(&info, &GeometryRequest::default());
        assert_eq!(
            geometry.physical,
            PhysicalSize {
                width_mm: 260,
                height_mm: 195
            }
        );

        let request = GeometryRequest {
            physical: Some(Size::new(100, 0)),
            ..Default::default()
        };
        let geometry = GeometryNegotiator::default().negotiate(&info, &request);
        assert_eq!(geometry.physical.width_mm, 100);
        assert_eq!(geometry.physical.height_mm, 75);
    }

    #[test]
    fn test_driver_physical_size_follows_visible_area() {
        let mut info = hw(1024, 768);
        info.physical_mm = Some(Size::new(260, 195));
        let request = GeometryRequest {
            size: Some(Size::new(512, 384)),
            ..Default::default()
        };

        let geometry = GeometryNegotiator::default().negotiate(&info, &request);
        assert_eq!(geometry.rect, Rect::new(256, 192, 512, 384));
        assert_eq!(
            geometry.physical,
            PhysicalSize {
                width_mm: 130,
                height_mm: 98
            }
        );
    }

    #[test]
    fn test_rect_intersection_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersected(&b), Rect::new(5, 5, 5, 5));
        assert_eq!(a.united(&b), Rect::new(0, 0, 15, 15));
        assert!(a.intersected(&Rect::new(20, 20, 1, 1)).is_empty());
        assert_eq!(Rect::default().united(&b), b);
        assert!(Rect::new(-5, -5, 5, 5).intersected(&a).is_empty());
    }

    proptest! {
        #[test]
        fn negotiated_size_never_exceeds_hardware(
            hw_w in 1u32..4096,
            hw_h in 1u32..4096,
            req_w in 1u32..8192,
            req_h in 1u32..8192,
            off_x in 0i32..8192,
            off_y in 0i32..8192,
        ) {
            let rect = GeometryNegotiator::default().visible_rect(
                Size::new(hw_w, hw_h),
                Some(Size::new(req_w, req_h)),
                Some(Point::new(off_x, off_y)),
            );
            prop_assert!(rect.width <= hw_w);
            prop_assert!(rect.height <= hw_h);
        }

        #[test]
        fn clamped_rect_lies_inside_hardware(
            hw_w in 1u32..4096,
            hw_h in 1u32..4096,
            req_w in 1u32..8192,
            req_h in 1u32..8192,
            off_x in -8192i32..8192,
            off_y in -8192i32..8192,
        ) {
            let rect = GeometryNegotiator::default().visible_rect(
                Size::new(hw_w, hw_h),
                Some(Size::new(req_w, req_h)),
                Some(Point::new(off_x, off_y)),
            );
            prop_assert!(rect.x >= 0 && rect.y >= 0);
            prop_assert!(rect.right() <= hw_w as i64);
            prop_assert!(rect.bottom() <= hw_h as i64);
        }

        #[test]
        fn zero_size_always_falls_back(
            hw_w in 320u32..4096,
            hw_h in 240u32..4096,
            zero_width in any::<bool>(),
            other in 0u32..4096,
        ) {
            let requested = if zero_width { Size::new(0, other) } else { Size::new(other, 0) };
            let rect = GeometryNegotiator::default().visible_rect(
                Size::new(hw_w, hw_h),
                Some(requested),
                None,
            );
            prop_assert_eq!(rect.size(), FALLBACK_SIZE);
        }
    }
}
