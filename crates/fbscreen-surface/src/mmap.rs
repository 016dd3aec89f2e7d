//! Memory Mapper
//!
//! Maps the device's framebuffer memory into the process and locates the
//! negotiated visible rectangle inside it.
//!
//! Two addresses are tracked and never mixed up: `mapping_base`, exactly what
//! `mmap` returned and the only address ever handed to `munmap`, and
//! `surface_origin`, the first byte of the visible rectangle used for all pixel
//! I/O.

use std::num::NonZeroUsize;
use std::os::fd::BorrowedFd;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};
use tracing::{debug, warn};

use crate::device::HardwareInfo;
use crate::error::{Result, SurfaceError};
use crate::format::PixelFormat;
use crate::geometry::Rect;
use crate::image::{ImageView, ImageViewMut};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// System page size.
pub fn page_size() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => FALLBACK_PAGE_SIZE,
    }
}

/// Round `len` up to a multiple of `page` (a power of two).
pub fn page_align(len: usize, page: usize) -> usize {
    let mask = page - 1;
    (len + mask) & !mask
}

/// Shared read-write mapping of framebuffer memory.
///
/// Unmapped on drop, with the base address and length mmap returned.
#[derive(Debug)]
pub struct MappedRegion {
    mapping_base: NonNull<libc::c_void>,
    mapped_len: usize,
    surface_origin: NonNull<u8>,
    surface_offset: usize,
    visible: Rect,
    stride: usize,
    format: PixelFormat,
}

impl MappedRegion {
    /// Map `stride × height` bytes (page aligned) from device offset 0 and
    /// locate `visible` within them.
    pub fn map(
        fd: BorrowedFd<'_>,
        info: &HardwareInfo,
        visible: Rect,
        format: PixelFormat,
    ) -> Result<Self> {
        let stride = info.stride as usize;
        let mapped_len = page_align(stride * info.height as usize, page_size());

        let bpp = format.bytes_per_pixel();
        let surface_offset = visible.y.max(0) as usize * stride + visible.x.max(0) as usize * bpp;
        let visible_end = if visible.is_empty() {
            surface_offset
        } else {
            surface_offset + (visible.height as usize - 1) * stride + visible.width as usize * bpp
        };

        if visible.x < 0
            || visible.y < 0
            || visible.width as usize * bpp > stride
            || visible_end > mapped_len
        {
            warn!(
                "Visible area {:?} does not fit in {} mapped bytes (stride {})",
                visible, mapped_len, stride
            );
            return Err(SurfaceError::MapFailed { errno: Errno::EINVAL });
        }

        let len = NonZeroUsize::new(mapped_len)
            .ok_or(SurfaceError::MapFailed { errno: Errno::EINVAL })?;

        // SAFETY: a fresh mapping chosen by the kernel; nothing else aliases it.
        let mapping_base = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }
        .map_err(|errno| SurfaceError::MapFailed { errno })?;

        // SAFETY: surface_offset < visible_end <= mapped_len, checked above.
        let surface_origin = unsafe {
            NonNull::new_unchecked(mapping_base.as_ptr().cast::<u8>().add(surface_offset))
        };

        debug!(
            "Mapped {} bytes of framebuffer memory, surface at offset {}",
            mapped_len, surface_offset
        );

        Ok(Self {
            mapping_base,
            mapped_len,
            surface_origin,
            surface_offset,
            visible,
            stride,
            format,
        })
    }

    /// Address returned by `mmap`.
    pub fn mapping_base(&self) -> *const u8 {
        self.mapping_base.as_ptr().cast::<u8>().cast_const()
    }

    /// First byte of the visible rectangle.
    pub fn surface_origin(&self) -> *const u8 {
        self.surface_origin.as_ptr().cast_const()
    }

    /// Base address the unmap will use, derived from the surface pointer.
    pub fn unmap_base(&self) -> *const u8 {
        self.surface_origin().wrapping_sub(self.surface_offset)
    }

    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    pub fn surface_offset(&self) -> usize {
        self.surface_offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    fn surface_len(&self) -> usize {
        self.mapped_len - self.surface_offset
    }

    /// The visible rectangle as an image view.
    pub fn surface(&self) -> ImageView<'_> {
        // SAFETY: surface_origin..mapping_base+mapped_len stays inside the
        // live mapping, which outlives the returned borrow.
        let origin = self.surface_origin.as_ptr().cast_const();
        let bytes = unsafe { std::slice::from_raw_parts(origin, self.surface_len()) };
        let Rect { width, height, .. } = self.visible;
        ImageView::new_unchecked(bytes, width, height, self.stride, self.format)
    }

    /// Writable view of the visible rectangle. The layout was checked
    /// against the mapping in [`MappedRegion::map`].
    pub fn surface_mut(&mut self) -> ImageViewMut<'_> {
        // SAFETY: as in `surface`, and `&mut self` makes this the only view.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.surface_origin.as_ptr(), self.surface_len())
        };
        let Rect { width, height, .. } = self.visible;
        ImageViewMut::new_unchecked(bytes, width, height, self.stride, self.format)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        debug_assert_eq!(self.unmap_base(), self.mapping_base());

        // SAFETY: mapping_base/mapped_len are exactly what mmap returned and
        // the region has not been unmapped before.
        if let Err(errno) = unsafe { munmap(self.mapping_base, self.mapped_len) } {
            warn!("Failed to unmap framebuffer memory: {}", errno);
        } else {
            debug!("Unmapped {} bytes of framebuffer memory", self.mapped_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::os::fd::AsFd;

    fn info(width: u32, height: u32, stride: u32) -> HardwareInfo {
        HardwareInfo {
            width,
            height,
            depth: 32,
            stride,
            physical_mm: None,
        }
    }

    fn device_file(len: u64) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(len).unwrap();
        file
    }

    fn map_rgb32(
        file: &tempfile::NamedTempFile,
        hw: &HardwareInfo,
        visible: Rect,
    ) -> Result<MappedRegion> {
        MappedRegion::map(file.as_file().as_fd(), hw, visible, PixelFormat::Rgb32)
    }

    #[cfg(target_os = "linux")]
    fn mapping_count(path: &std::path::Path) -> usize {
        let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
        let needle = path.display().to_string();
        maps.lines().filter(|line| line.ends_with(&needle)).count()
    }

    #[test]
    fn test_page_align() {
        assert_eq!(page_align(1, 4096), 4096);
        assert_eq!(page_align(4096, 4096), 4096);
        assert_eq!(page_align(4097, 4096), 8192);
        assert_eq!(page_align(0, 4096), 0);
    }

    #[test]
    fn test_offset_points_at_visible_origin() {
        let hw = info(64, 48, 64 * 4 + 32);
        let file = device_file(page_align(hw.stride as usize * 48, page_size()) as u64);
        let region = map_rgb32(&file, &hw, Rect::new(3, 2, 10, 10)).unwrap();

        assert_eq!(region.surface_offset(), 2 * (64 * 4 + 32) + 3 * 4);
        assert_eq!(region.mapped_len() % page_size(), 0);
        assert!(region.mapped_len() >= hw.stride as usize * 48);
        assert_eq!(region.unmap_base(), region.mapping_base());
        assert_eq!(
            region.surface_origin() as usize - region.mapping_base() as usize,
            region.surface_offset()
        );
    }

    #[test]
    fn test_writes_reach_the_device() {
        let hw = info(4, 4, 16);
        let file = device_file(page_size() as u64);
        {
            let mut region = map_rgb32(&file, &hw, Rect::new(1, 1, 2, 2)).unwrap();
            let mut surface = region.surface_mut();
            surface.set_pixel(0, 0, 0xff112233);
        }

        let bytes = std::fs::read(file.path()).unwrap();
        let at = 16 + 4;
        assert_eq!(u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap()), 0xff112233);
        assert_eq!(&bytes[..at], &vec![0u8; at][..]);
    }

    #[test]
    fn test_rejects_visible_area_outside_mapping() {
        let hw = info(4, 4, 16);
        let file = device_file(page_size() as u64);
        let err = map_rgb32(&file, &hw, Rect::new(0, 0, 8, 4)).unwrap_err();
        assert!(matches!(err, SurfaceError::MapFailed { errno: Errno::EINVAL }));
    }

    #[test]
    fn test_zero_length_is_map_failure() {
        let hw = info(0, 0, 0);
        let file = device_file(0);
        let err = map_rgb32(&file, &hw, Rect::default()).unwrap_err();
        assert!(matches!(err, SurfaceError::MapFailed { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_drop_releases_mapping() {
        let hw = info(32, 32, 128);
        let file = device_file(page_size() as u64 * 2);
        assert_eq!(mapping_count(file.path()), 0);

        let region = map_rgb32(&file, &hw, Rect::new(5, 7, 8, 8)).unwrap();
        assert_eq!(mapping_count(file.path()), 1);

        drop(region);
        assert_eq!(mapping_count(file.path()), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn unmap_base_is_mapping_base_for_any_offset(x in 0i32..32, y in 0i32..32) {
            let hw = info(64, 64, 256);
            let file = device_file(page_align(256 * 64, page_size()) as u64);
            let region = MappedRegion::map(
                file.as_file().as_fd(),
                &hw,
                Rect::new(x, y, 32, 32),
                PixelFormat::Rgb32,
            ).unwrap();

            prop_assert_eq!(region.unmap_base(), region.mapping_base());
            prop_assert_eq!(region.surface_offset(), y as usize * 256 + x as usize * 4);
        }
    }
}
