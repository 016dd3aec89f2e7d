//! fbscreen surface
//!
//! Exposes a raw, memory-mapped framebuffer device as a single display surface
//! for a compositor. The compositor hands over a fully composited image plus
//! the rectangles that changed; this crate gets those bytes onto the device.
//!
//! Pipeline: [`DeviceConfig`] tokens → [`DeviceLocator`] → [`DeviceHandle`]
//! → [`GeometryNegotiator`] → [`MappedRegion`] → [`Blitter`], all owned by
//! the [`SurfaceManager`] facade.

pub mod blit;
pub mod config;
pub mod cursor;
pub mod device;
pub mod error;
pub mod format;
pub mod geometry;
pub mod image;
pub mod mmap;
pub mod screen;

pub use blit::{Blitter, DamageRegion};
pub use config::{ConfigFlags, DeviceConfig, MissingDevicePolicy};
pub use cursor::CursorOverlay;
pub use device::{
    AccessMode, DeviceHandle, DeviceLocator, DeviceSource, FixedProbe, HardwareInfo, HardwareProbe,
};
pub use error::{Result, SurfaceError};
pub use format::PixelFormat;
pub use geometry::{
    FALLBACK_SIZE, Geometry, GeometryNegotiator, GeometryRequest, PhysicalSize, Point, Rect, Size,
};
pub use image::{Image, ImageView, ImageViewMut};
pub use mmap::MappedRegion;
pub use screen::{NoWindows, SurfaceManager, SurfaceState, WindowId, WindowLookup};
