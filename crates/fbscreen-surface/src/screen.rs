//! Screen Module
//!
//! The Surface Manager: owns the device handle and the mapping, exposes the
//! negotiated geometry and format, and turns damage-driven redraw requests
//! into blits.
//!
//! Lifecycle: `Uninitialized → Initialized → TornDown`, or
//! `Uninitialized → Failed`. A failed initialization leaves nothing open.

use std::collections::HashMap;
use std::os::fd::AsFd;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::blit::{Blitter, DamageRegion};
use crate::config::{ConfigFlags, DeviceConfig};
use crate::cursor::CursorOverlay;
use crate::device::{
    DeviceHandle, DeviceLocator, DeviceSource, HardwareInfo, HardwareProbe, platform_probe,
};
use crate::error::{Result, SurfaceError};
use crate::format::PixelFormat;
use crate::geometry::{Geometry, GeometryNegotiator, PhysicalSize, Rect};
use crate::image::{Image, ImageView};
use crate::mmap::MappedRegion;

/// Compositor-side window identifier
pub type WindowId = u64;

/// Window lookup provided by the compositor for window-restricted captures.
pub trait WindowLookup {
    /// Window bounds in surface coordinates.
    fn window_geometry(&self, id: WindowId) -> Option<Rect>;
}

impl WindowLookup for HashMap<WindowId, Rect> {
    fn window_geometry(&self, id: WindowId) -> Option<Rect> {
        self.get(&id).copied()
    }
}

/// Lookup for compositors without windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWindows;

impl WindowLookup for NoWindows {
    fn window_geometry(&self, _id: WindowId) -> Option<Rect> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurfaceState {
    Uninitialized,
    Initialized,
    Failed,
    TornDown,
}

/// Everything that exists only while initialized.
struct ActiveSurface {
    // Declaration order is drop order: unmap before close.
    mapping: MappedRegion,
    device: DeviceHandle,
    config: DeviceConfig,
    geometry: Geometry,
    format: PixelFormat,
    /// Created on first non-empty redraw, then reused
    blitter: Option<Blitter>,
    cursor: Option<CursorOverlay>,
}

/// Framebuffer display surface
pub struct SurfaceManager {
    args: Vec<String>,
    locator: DeviceLocator,
    probe: Box<dyn HardwareProbe>,
    negotiator: GeometryNegotiator,
    state: SurfaceState,
    active: Option<ActiveSurface>,
}

impl SurfaceManager {
    /// Create an uninitialized surface from raw configuration tokens.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            locator: DeviceLocator::default(),
            probe: platform_probe(),
            negotiator: GeometryNegotiator::default(),
            state: SurfaceState::Uninitialized,
            active: None,
        }
    }

    pub fn with_locator(mut self, locator: DeviceLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn HardwareProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_negotiator(mut self, negotiator: GeometryNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Locate, open, query, negotiate and map. On failure the surface is
    /// `Failed` and every resource acquired along the way has been released.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != SurfaceState::Uninitialized {
            return Err(SurfaceError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }

        match self.bring_up() {
            Ok(active) => {
                info!(
                    "Framebuffer surface ready: {}x{}+{}+{} {:?}, {}x{} mm",
                    active.geometry.rect.width,
                    active.geometry.rect.height,
                    active.geometry.rect.x,
                    active.geometry.rect.y,
                    active.format,
                    active.geometry.physical.width_mm,
                    active.geometry.physical.height_mm
                );
                self.active = Some(active);
                self.state = SurfaceState::Initialized;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to initialize framebuffer surface: {}", e);
                self.state = SurfaceState::Failed;
                Err(e)
            }
        }
    }

    fn bring_up(&self) -> Result<ActiveSurface> {
        let config = DeviceConfig::parse(&self.args)?;
        let source = self.locator.locate(&config)?;
        let device = DeviceHandle::open(source, self.probe.as_ref())?;

        let info = *device.info();
        let format = PixelFormat::from_depth(info.depth);
        let geometry = self.negotiator.negotiate(&info, &config.geometry_request());

        // `device` is dropped (closed) if this fails
        let mapping = MappedRegion::map(device.as_fd(), &info, geometry.rect, format)?;

        let cursor = if config.flags.contains(ConfigFlags::HIDE_CURSOR) {
            debug!("Cursor overlay disabled");
            None
        } else {
            Some(CursorOverlay::new(Rect::from_size(geometry.rect.size())))
        };

        Ok(ActiveSurface {
            mapping,
            device,
            config,
            geometry,
            format,
            blitter: None,
            cursor,
        })
    }

    fn active(&self, operation: &'static str) -> Result<&ActiveSurface> {
        self.active.as_ref().ok_or(SurfaceError::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn active_mut(&mut self, operation: &'static str) -> Result<&mut ActiveSurface> {
        let state = self.state;
        self.active
            .as_mut()
            .ok_or(SurfaceError::InvalidState { operation, state })
    }

    /// Copy the damaged parts of `source` onto the device. Returns the
    /// rectangles actually written (clipped to the surface).
    pub fn redraw(&mut self, source: &Image, damage: &DamageRegion) -> Result<DamageRegion> {
        let active = self.active_mut("redraw")?;
        if damage.is_empty() {
            return Ok(DamageRegion::new());
        }

        let mut surface = active.mapping.surface_mut();
        let blitter = active.blitter.get_or_insert_with(|| Blitter::new(&surface));
        Ok(blitter.blit(&mut surface, &source.view(), damage))
    }

    /// Read pixels back from the mapped surface.
    ///
    /// Without a window, (`x`, `y`, `width`, `height`) is in surface
    /// coordinates. With a window, it is relative to the window and clipped to
    /// its bounds. A negative width or height extends to the right or bottom
    /// edge. Unknown windows yield an empty image.
    pub fn capture(
        &self,
        windows: &dyn WindowLookup,
        window: Option<WindowId>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<Image> {
        let active = self.active("capture")?;
        let surface = active.mapping.surface();

        let rect = match window {
            None => Rect::new(
                x,
                y,
                extent(width, surface.width(), x),
                extent(height, surface.height(), y),
            ),
            Some(id) => {
                let Some(bounds) = windows.window_geometry(id) else {
                    debug!("capture: unknown window {}", id);
                    return Ok(Image::empty(active.format));
                };
                Rect::new(
                    bounds.x.saturating_add(x),
                    bounds.y.saturating_add(y),
                    extent(width, bounds.width, x),
                    extent(height, bounds.height, y),
                )
                .intersected(&bounds)
            }
        };

        trace!("capture {:?} from {:?}", rect, window);
        Ok(surface.copy(rect))
    }

    /// Unmap and close. Safe to call in any state, any number of times.
    pub fn teardown(&mut self) {
        match self.active.take() {
            Some(active) => {
                let name = active.device.source().display_name();
                drop(active);
                self.state = SurfaceState::TornDown;
                info!("Released framebuffer {}", name);
            }
            None => trace!("teardown: nothing to release ({:?})", self.state),
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// Visible rectangle within the hardware framebuffer, and physical size.
    pub fn geometry(&self) -> Option<Geometry> {
        self.active.as_ref().map(|a| a.geometry)
    }

    /// Surface bounds in the compositor's coordinates (origin at 0,0).
    pub fn screen_rect(&self) -> Option<Rect> {
        self.geometry().map(|g| Rect::from_size(g.rect.size()))
    }

    pub fn physical_size(&self) -> Option<PhysicalSize> {
        self.geometry().map(|g| g.physical)
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.active.as_ref().map(|a| a.format)
    }

    pub fn depth(&self) -> Option<u32> {
        self.format().map(PixelFormat::depth)
    }

    pub fn hardware_info(&self) -> Option<&HardwareInfo> {
        self.active.as_ref().map(|a| a.device.info())
    }

    pub fn device_source(&self) -> Option<&DeviceSource> {
        self.active.as_ref().map(|a| a.device.source())
    }

    /// Parsed tokens, for the integration layer's flags (`tty=`,
    /// `nographicsmodeswitch`).
    pub fn config(&self) -> Option<&DeviceConfig> {
        self.active.as_ref().map(|a| &a.config)
    }

    /// Read-only view of the mapped surface.
    pub fn surface(&self) -> Option<ImageView<'_>> {
        self.active.as_ref().map(|a| a.mapping.surface())
    }

    pub fn cursor(&self) -> Option<&CursorOverlay> {
        self.active.as_ref().and_then(|a| a.cursor.as_ref())
    }

    pub fn cursor_mut(&mut self) -> Option<&mut CursorOverlay> {
        self.active.as_mut().and_then(|a| a.cursor.as_mut())
    }

    /// Non-empty blits performed so far.
    pub fn frames_blitted(&self) -> u64 {
        self.active
            .as_ref()
            .and_then(|a| a.blitter.as_ref())
            .map_or(0, Blitter::frames)
    }
}

impl Drop for SurfaceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Requested extent, or the rest of `total` past `offset` when negative.
fn extent(requested: i32, total: u32, offset: i32) -> u32 {
    let len = if requested < 0 {
        total as i64 - offset as i64
    } else {
        requested as i64
    };
    len.clamp(0, u32::MAX as i64) as u32
}
