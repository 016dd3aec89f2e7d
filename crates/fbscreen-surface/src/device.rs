//! Device Module
//!
//! Finding the framebuffer node, opening it, and asking the driver what it
//! looks like.

use std::fs::OpenOptions;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, MissingDevicePolicy};
use crate::error::{errno_of, Result, SurfaceError};
use crate::geometry::Size;

/// Conventional framebuffer nodes, tried in order when `fb=` is absent.
pub const DEFAULT_DEVICE_PATHS: &[&str] = &["/dev/fb0", "/dev/graphics/fb0"];

/// Driver-reported framebuffer layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareInfo {
    /// Visible width in pixels
    pub width: u32,
    /// Visible height in pixels
    pub height: u32,
    /// Bits per pixel
    pub depth: u32,
    /// Bytes per scanline
    pub stride: u32,
    /// Panel size, when the driver knows it
    pub physical_mm: Option<Size>,
}

impl HardwareInfo {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Where the device comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    Path(PathBuf),
    /// The process's already-open standard input
    Stdin,
}

impl DeviceSource {
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Stdin => "<stdin>".to_string(),
        }
    }
}

/// Resolves the device path from configuration.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    /// Candidates used when no `fb=` token was given
    pub defaults: Vec<PathBuf>,
}

impl Default for DeviceLocator {
    fn default() -> Self {
        Self {
            defaults: DEFAULT_DEVICE_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl DeviceLocator {
    pub fn locate(&self, config: &DeviceConfig) -> Result<DeviceSource> {
        if let Some(path) = &config.fb {
            if path.exists() {
                return Ok(DeviceSource::Path(path.clone()));
            }
            return Err(SurfaceError::DeviceNotFound {
                hint: format!("{} does not exist", path.display()),
            });
        }

        if let Some(path) = self.defaults.iter().find(|p| p.exists()) {
            debug!("Using default framebuffer device {:?}", path);
            return Ok(DeviceSource::Path(path.clone()));
        }

        match config.missing_device {
            MissingDevicePolicy::Fail => {
                warn!("Unable to figure out framebuffer device. Specify it manually.");
                Err(SurfaceError::DeviceNotFound {
                    hint: "no default framebuffer device exists, specify fb=<path>".to_string(),
                })
            }
            MissingDevicePolicy::Stdin => {
                info!("No framebuffer device found, falling back to standard input");
                Ok(DeviceSource::Stdin)
            }
        }
    }
}

/// Reads [`HardwareInfo`] from an open device.
///
/// The real implementation issues two driver control calls; tests and
/// headless setups substitute a [`FixedProbe`].
pub trait HardwareProbe {
    fn query(&self, fd: BorrowedFd<'_>) -> Result<HardwareInfo>;
}

/// Probe that reports a fixed layout without touching the device.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub HardwareInfo);

impl HardwareProbe for FixedProbe {
    fn query(&self, _fd: BorrowedFd<'_>) -> Result<HardwareInfo> {
        Ok(self.0)
    }
}

/// Probe for the current platform's framebuffer driver interface.
pub fn platform_probe() -> Box<dyn HardwareProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(fbdev::FbdevProbe)
    }
    #[cfg(target_os = "freebsd")]
    {
        Box::new(syscons::ScfbProbe)
    }
    #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
    {
        Box::new(UnsupportedProbe)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
struct UnsupportedProbe;

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
impl HardwareProbe for UnsupportedProbe {
    fn query(&self, _fd: BorrowedFd<'_>) -> Result<HardwareInfo> {
        Err(SurfaceError::DeviceQueryFailed {
            request: "framebuffer information",
            errno: nix::errno::Errno::ENOTSUP,
        })
    }
}

#[cfg(target_os = "linux")]
pub mod fbdev {
    //! Linux fbdev: `FBIOGET_VSCREENINFO` + `FBIOGET_FSCREENINFO`.

    use std::os::fd::{AsRawFd, BorrowedFd};

    use bytemuck::Zeroable;

    use super::{HardwareInfo, HardwareProbe};
    use crate::error::{Result, SurfaceError};
    use crate::geometry::Size;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Zeroable)]
    pub struct FbBitfield {
        pub offset: u32,
        pub length: u32,
        pub msb_right: u32,
    }

    /// `struct fb_var_screeninfo`
    #[repr(C)]
    #[derive(Debug, Clone, Copy, Zeroable)]
    pub struct FbVarScreenInfo {
        pub xres: u32,
        pub yres: u32,
        pub xres_virtual: u32,
        pub yres_virtual: u32,
        pub xoffset: u32,
        pub yoffset: u32,
        pub bits_per_pixel: u32,
        pub grayscale: u32,
        pub red: FbBitfield,
        pub green: FbBitfield,
        pub blue: FbBitfield,
        pub transp: FbBitfield,
        pub nonstd: u32,
        pub activate: u32,
        /// Height of picture in mm
        pub height: u32,
        /// Width of picture in mm
        pub width: u32,
        pub accel_flags: u32,
        pub pixclock: u32,
        pub left_margin: u32,
        pub right_margin: u32,
        pub upper_margin: u32,
        pub lower_margin: u32,
        pub hsync_len: u32,
        pub vsync_len: u32,
        pub sync: u32,
        pub vmode: u32,
        pub rotate: u32,
        pub colorspace: u32,
        pub reserved: [u32; 4],
    }

    /// `struct fb_fix_screeninfo`
    #[repr(C)]
    #[derive(Debug, Clone, Copy, Zeroable)]
    pub struct FbFixScreenInfo {
        pub id: [u8; 16],
        pub smem_start: libc::c_ulong,
        pub smem_len: u32,
        pub type_: u32,
        pub type_aux: u32,
        pub visual: u32,
        pub xpanstep: u16,
        pub ypanstep: u16,
        pub ywrapstep: u16,
        pub line_length: u32,
        pub mmio_start: libc::c_ulong,
        pub mmio_len: u32,
        pub accel: u32,
        pub capabilities: u16,
        pub reserved: [u16; 2],
    }

    nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, FbVarScreenInfo);
    nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, FbFixScreenInfo);

    pub struct FbdevProbe;

    impl HardwareProbe for FbdevProbe {
        fn query(&self, fd: BorrowedFd<'_>) -> Result<HardwareInfo> {
            let mut var = FbVarScreenInfo::zeroed();
            // SAFETY: `var` is a properly sized, writable fb_var_screeninfo.
            unsafe { fbioget_vscreeninfo(fd.as_raw_fd(), &mut var) }.map_err(|errno| {
                SurfaceError::DeviceQueryFailed {
                    request: "screen information",
                    errno,
                }
            })?;

            let mut fix = FbFixScreenInfo::zeroed();
            // SAFETY: `fix` is a properly sized, writable fb_fix_screeninfo.
            unsafe { fbioget_fscreeninfo(fd.as_raw_fd(), &mut fix) }.map_err(|errno| {
                SurfaceError::DeviceQueryFailed {
                    request: "line length information",
                    errno,
                }
            })?;

            // Drivers report 0 or (u32)-1 when the panel size is unknown
            let known = |mm: u32| mm > 0 && mm < i32::MAX as u32;
            let physical_mm = (known(var.width) && known(var.height))
                .then(|| Size::new(var.width, var.height));

            Ok(HardwareInfo {
                width: var.xres,
                height: var.yres,
                depth: var.bits_per_pixel,
                stride: fix.line_length,
                physical_mm,
            })
        }
    }
}

#[cfg(target_os = "freebsd")]
pub mod syscons {
    //! FreeBSD syscons: `FBIOGTYPE` + `FBIO_GETLINEWIDTH`.

    use std::os::fd::{AsRawFd, BorrowedFd};

    use bytemuck::Zeroable;

    use super::{HardwareInfo, HardwareProbe};
    use crate::error::{Result, SurfaceError};

    /// `struct fbtype`
    #[repr(C)]
    #[derive(Debug, Clone, Copy, Zeroable)]
    pub struct FbType {
        pub fb_type: libc::c_int,
        pub fb_height: libc::c_int,
        pub fb_width: libc::c_int,
        pub fb_depth: libc::c_int,
        pub fb_cmsize: libc::c_int,
        pub fb_size: libc::c_int,
    }

    nix::ioctl_read!(fbio_gtype, b'F', 0, FbType);
    nix::ioctl_read!(fbio_getlinewidth, b'F', 112, libc::c_int);

    pub struct ScfbProbe;

    impl HardwareProbe for ScfbProbe {
        fn query(&self, fd: BorrowedFd<'_>) -> Result<HardwareInfo> {
            let mut fb = FbType::zeroed();
            // SAFETY: `fb` is a properly sized, writable struct fbtype.
            unsafe { fbio_gtype(fd.as_raw_fd(), &mut fb) }.map_err(|errno| {
                SurfaceError::DeviceQueryFailed {
                    request: "framebuffer information",
                    errno,
                }
            })?;

            let mut line_length: libc::c_int = 0;
            // SAFETY: `line_length` is a writable int.
            unsafe { fbio_getlinewidth(fd.as_raw_fd(), &mut line_length) }.map_err(|errno| {
                SurfaceError::DeviceQueryFailed {
                    request: "line length information",
                    errno,
                }
            })?;

            Ok(HardwareInfo {
                width: fb.fb_width.max(0) as u32,
                height: fb.fb_height.max(0) as u32,
                depth: fb.fb_depth.max(0) as u32,
                stride: line_length.max(0) as u32,
                physical_mm: None,
            })
        }
    }
}

/// How the device ended up being opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// An open framebuffer device and the layout its driver reported.
///
/// The descriptor is closed exactly once, when the handle is dropped.
#[derive(Debug)]
pub struct DeviceHandle {
    fd: OwnedFd,
    source: DeviceSource,
    access: AccessMode,
    info: HardwareInfo,
}

impl DeviceHandle {
    /// Open `source` (read-write, else read-only) and query the driver.
    /// A failed query drops the descriptor before returning.
    pub fn open(source: DeviceSource, probe: &dyn HardwareProbe) -> Result<Self> {
        let (fd, access) = match &source {
            DeviceSource::Path(path) => open_path(path)?,
            DeviceSource::Stdin => {
                let fd = std::io::stdin().as_fd().try_clone_to_owned().map_err(|e| {
                    SurfaceError::DeviceOpenFailed {
                        path: PathBuf::from("<stdin>"),
                        errno: errno_of(&e),
                    }
                })?;
                (fd, AccessMode::ReadWrite)
            }
        };

        let info = probe.query(fd.as_fd())?;

        info!(
            "Opened framebuffer {} ({:?}): {}x{}, {} bpp, {} bytes per line",
            source.display_name(),
            access,
            info.width,
            info.height,
            info.depth,
            info.stride
        );

        Ok(Self {
            fd,
            source,
            access,
            info,
        })
    }

    pub fn info(&self) -> &HardwareInfo {
        &self.info
    }

    pub fn source(&self) -> &DeviceSource {
        &self.source
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }
}

impl AsFd for DeviceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

fn open_path(path: &Path) -> Result<(OwnedFd, AccessMode)> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => Ok((OwnedFd::from(file), AccessMode::ReadWrite)),
        Err(e) => {
            debug!("Read-write open of {:?} failed ({}), retrying read-only", path, e);
            OpenOptions::new()
                .read(true)
                .open(path)
                .map(|file| (OwnedFd::from(file), AccessMode::ReadOnly))
                .map_err(|e| SurfaceError::DeviceOpenFailed {
                    path: path.to_path_buf(),
                    errno: errno_of(&e),
                })
        }
    }
}
