//! Device configuration tokens
//!
//! The integration layer hands the surface a flat list of tokens such as
//! `fb=/dev/fb0`, `size=800x600`, `offset=100x50`, `mmsize=210x160mm` or bare
//! flags like `nographicsmodeswitch`. They are parsed once, at initialization.

use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, SurfaceError};
use crate::geometry::{GeometryRequest, Point, Size};

bitflags! {
    /// Boolean switches carried by bare tokens.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ConfigFlags: u32 {
        /// `nographicsmodeswitch`: leave the console in text mode
        const NO_GRAPHICS_MODE_SWITCH = 1 << 0;
        /// `hidecursor`: do not create the cursor overlay
        const HIDE_CURSOR = 1 << 1;
    }
}

/// What to do when no `fb=` was given and no default device node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDevicePolicy {
    /// Fail with `DeviceNotFound`; the device must be configured explicitly
    #[default]
    Fail,
    /// Use the already-open standard input handle as the device
    Stdin,
}

impl MissingDevicePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "fail" => Some(Self::Fail),
            "stdin" => Some(Self::Stdin),
            _ => None,
        }
    }
}

/// Parsed device configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// `fb=` device path
    pub fb: Option<PathBuf>,
    /// `tty=` console device, passed through to the integration layer
    pub tty: Option<PathBuf>,
    /// `size=` requested pixel size
    pub size: Option<Size>,
    /// `offset=` requested pixel origin
    pub offset: Option<Point>,
    /// `mmsize=` physical size in millimeters
    pub mm_size: Option<Size>,
    /// `fbfallback=` policy when no device can be found
    pub missing_device: MissingDevicePolicy,
    pub flags: ConfigFlags,
}

impl DeviceConfig {
    /// Parse a token list. Later tokens override earlier ones; unrecognized
    /// tokens are ignored. A recognized key with a malformed value is an error.
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            let Some((key, value)) = token.split_once('=') else {
                match token {
                    "nographicsmodeswitch" => config.flags |= ConfigFlags::NO_GRAPHICS_MODE_SWITCH,
                    "hidecursor" => config.flags |= ConfigFlags::HIDE_CURSOR,
                    _ => debug!("Ignoring unrecognized token {:?}", token),
                }
                continue;
            };

            match key {
                "fb" => config.fb = Some(PathBuf::from(non_empty(key, value)?)),
                "tty" => config.tty = Some(PathBuf::from(non_empty(key, value)?)),
                "size" => config.size = Some(parse_pair(key, value).map(|(w, h)| Size::new(w, h))?),
                "offset" => {
                    let (x, y) = parse_pair(key, value)?;
                    config.offset =
                        Some(Point::new(to_coord(key, value, x)?, to_coord(key, value, y)?));
                }
                "mmsize" => {
                    let stripped = value.strip_suffix("mm").unwrap_or(value);
                    config.mm_size = Some(parse_pair(key, stripped).map(|(w, h)| Size::new(w, h))?);
                }
                "fbfallback" => {
                    config.missing_device =
                        MissingDevicePolicy::parse(value).ok_or_else(|| invalid(key, value))?;
                }
                _ => debug!("Ignoring unrecognized token {:?}", token),
            }
        }

        trace!("Parsed device config: {:?}", config);
        Ok(config)
    }

    /// The geometry-related part of the configuration.
    pub fn geometry_request(&self) -> GeometryRequest {
        GeometryRequest {
            size: self.size,
            offset: self.offset,
            physical: self.mm_size,
        }
    }
}

fn invalid(key: &str, value: &str) -> SurfaceError {
    SurfaceError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn non_empty<'a>(key: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(invalid(key, value))
    } else {
        Ok(value)
    }
}

/// `<A>x<B>` with decimal, non-negative components.
fn parse_pair(key: &str, value: &str) -> Result<(u32, u32)> {
    let (a, b) = value.split_once('x').ok_or_else(|| invalid(key, value))?;
    let a = a.parse::<u32>().map_err(|_| invalid(key, value))?;
    let b = b.parse::<u32>().map_err(|_| invalid(key, value))?;
    Ok((a, b))
}

fn to_coord(key: &str, value: &str, v: u32) -> Result<i32> {
    i32::try_from(v).map_err(|_| invalid(key, value))
}
