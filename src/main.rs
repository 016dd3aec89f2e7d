//! fbscreen
//!
//! Command-line front end for the framebuffer surface. Merges device tokens
//! from the config file, the environment and the command line, brings the
//! surface up and runs one command against it.

mod config;
mod demo;
mod fps;

use anyhow::{bail, Context, Result};
use fbscreen_surface::{
    ConfigFlags, DamageRegion, FALLBACK_SIZE, Geometry, HardwareInfo, Image, NoWindows, PixelFormat,
    Rect, SurfaceManager, SurfaceState,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, DemoConfig, FailureMode, ARGS_ENV, HIDE_CURSOR_ENV};
use crate::demo::{opaque, Scene};
use crate::fps::FpsCounter;

const USAGE: &str = "usage: fbscreen [--config FILE] [TOKEN...] \
                     <info | fill COLOR | demo | capture FILE.ppm [X Y W H]>";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    /// Print the negotiated surface as JSON
    Info,
    /// Paint the whole surface one color
    Fill { color: u32 },
    /// Bouncing tile until SIGINT/SIGTERM
    Demo,
    /// Save part of the surface as a binary PPM
    Capture { path: PathBuf, area: (i32, i32, i32, i32) },
}

#[derive(Debug, PartialEq)]
struct Invocation {
    command: Command,
    tokens: Vec<String>,
    config_path: Option<PathBuf>,
}

fn is_device_token(arg: &str) -> bool {
    arg.contains('=') || matches!(arg, "nographicsmodeswitch" | "hidecursor")
}

fn parse_color(text: &str) -> Result<u32> {
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix('#'))
        .unwrap_or(text);
    u32::from_str_radix(hex, 16).with_context(|| format!("Invalid color {:?}", text))
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut tokens = Vec::new();
    let mut positional = Vec::new();
    let mut config_path = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            let path = iter.next().context("--config needs a file")?;
            config_path = Some(PathBuf::from(path));
        } else if arg == "--help" || arg == "-h" {
            bail!("{}", USAGE);
        } else if is_device_token(arg) {
            tokens.push(arg.clone());
        } else {
            positional.push(arg.as_str());
        }
    }

    let command = match positional.as_slice() {
        [] | ["info"] => Command::Info,
        ["fill", color] => Command::Fill {
            color: parse_color(*color)?,
        },
        ["demo"] => Command::Demo,
        ["capture", path] => Command::Capture {
            path: PathBuf::from(*path),
            area: (0, 0, -1, -1),
        },
        ["capture", path, x, y, w, h] => {
            let num = |s: &str| {
                s.parse::<i32>()
                    .with_context(|| format!("Invalid capture coordinate {:?}", s))
            };
            Command::Capture {
                path: PathBuf::from(*path),
                area: (num(*x)?, num(*y)?, num(*w)?, num(*h)?),
            }
        }
        other => bail!("Unrecognized command {:?}\n{}", other, USAGE),
    };

    Ok(Invocation {
        command,
        tokens,
        config_path,
    })
}

/// What `info` prints
#[derive(Debug, Serialize)]
struct SurfaceInfo<'a> {
    state: SurfaceState,
    device: Option<String>,
    hardware: Option<&'a HardwareInfo>,
    geometry: Option<Geometry>,
    format: Option<PixelFormat>,
    depth: Option<u32>,
    tty: Option<&'a Path>,
    graphics_mode_switch: bool,
    cursor: bool,
    frames_blitted: u64,
}

impl<'a> SurfaceInfo<'a> {
    fn collect(surface: &'a SurfaceManager) -> Self {
        let config = surface.config();
        Self {
            state: surface.state(),
            device: surface.device_source().map(|s| s.display_name()),
            hardware: surface.hardware_info(),
            geometry: surface.geometry(),
            format: surface.format(),
            depth: surface.depth(),
            tty: config.and_then(|c| c.tty.as_deref()),
            graphics_mode_switch: config
                .is_some_and(|c| !c.flags.contains(ConfigFlags::NO_GRAPHICS_MODE_SWITCH)),
            cursor: surface.cursor().is_some(),
            frames_blitted: surface.frames_blitted(),
        }
    }
}

fn run_info(surface: &SurfaceManager) -> Result<()> {
    let json = serde_json::to_string_pretty(&SurfaceInfo::collect(surface))
        .context("Failed to serialize surface info")?;
    println!("{}", json);
    Ok(())
}

fn run_fill(surface: &mut SurfaceManager, color: u32) -> Result<()> {
    let Some(screen) = surface.screen_rect() else {
        warn!("No surface to fill");
        return Ok(());
    };

    let mut image = Image::new(screen.width, screen.height, PixelFormat::Argb32);
    image.fill(opaque(color));
    let written = surface.redraw(&image, &DamageRegion::from_rect(image.rect()))?;
    info!("Filled {:?} with {:06x}", written.bounding_rect(), color & 0x00ff_ffff);
    Ok(())
}

fn run_capture(
    surface: &SurfaceManager,
    path: &Path,
    (x, y, w, h): (i32, i32, i32, i32),
) -> Result<()> {
    if surface.state() != SurfaceState::Initialized {
        warn!("No surface to capture");
        return Ok(());
    }

    let image = surface.capture(&NoWindows, None, x, y, w, h)?;
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut out = BufWriter::new(file);
    image.write_ppm(&mut out).context("Failed to write capture")?;
    out.flush().context("Failed to write capture")?;

    info!("Captured {}x{} pixels to {:?}", image.width(), image.height(), path);
    Ok(())
}

async fn run_demo(surface: &mut SurfaceManager, config: &DemoConfig) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let size = surface.screen_rect().map(|r| r.size()).unwrap_or(FALLBACK_SIZE);
    let headless = surface.state() != SurfaceState::Initialized;
    let mut scene = Scene::new(size, config);
    let mut fps = FpsCounter::default();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mode = if headless { " (headless)" } else { "" };
    info!("Running demo on {}x{}{}", size.width, size.height, mode);

    let mut damage = scene.full_damage();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let written = if headless {
                    damage
                } else {
                    surface.redraw(scene.image(), &damage)?
                };
                let pixels = written.iter().map(Rect::area).sum();
                if let Some(report) = fps.tick(pixels) {
                    debug!(
                        "{:.1} fps, {:.0} pixels per frame",
                        report.fps, report.pixels_per_frame
                    );
                }
                damage = scene.advance();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
        }
    }

    if let Some(report) = fps.current() {
        info!("Last measured rate: {:.1} fps", report.fps);
    }
    info!("Demo finished after {} blits", surface.frames_blitted());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "fbscreen=debug,fbscreen_surface=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    let config = match &invocation.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let env_args = std::env::var(ARGS_ENV).ok();
    let hide_cursor = std::env::var(HIDE_CURSOR_ENV).ok();
    let tokens =
        config.device_tokens(env_args.as_deref(), hide_cursor.as_deref(), &invocation.tokens);
    debug!("Device tokens: {:?}", tokens);

    let mut surface = SurfaceManager::new(tokens);
    if let Err(e) = surface.initialize() {
        match config.startup.on_failure {
            FailureMode::Abort => return Err(e).context("Failed to initialize framebuffer surface"),
            FailureMode::Headless => warn!("Framebuffer unavailable ({}), running headless", e),
        }
    }

    match &invocation.command {
        Command::Info => run_info(&surface)?,
        Command::Fill { color } => run_fill(&mut surface, *color)?,
        Command::Demo => run_demo(&mut surface, &config.demo).await?,
        Command::Capture { path, area } => run_capture(&surface, path, *area)?,
    }

    surface.teardown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_command_is_info() {
        let invocation = parse_args(&[]).unwrap();
        assert_eq!(invocation.command, Command::Info);
        assert!(invocation.tokens.is_empty());
    }

    #[test]
    fn test_tokens_are_separated_from_command() {
        let invocation = parse_args(&args(&[
            "fb=/dev/fb1",
            "fill",
            "hidecursor",
            "0x336699",
            "--config",
            "/tmp/fb.toml",
        ]))
        .unwrap();

        assert_eq!(invocation.command, Command::Fill { color: 0x336699 });
        assert_eq!(invocation.tokens, vec!["fb=/dev/fb1", "hidecursor"]);
        assert_eq!(invocation.config_path, Some(PathBuf::from("/tmp/fb.toml")));
    }

    #[test]
    fn test_capture_area() {
        let invocation =
            parse_args(&args(&["capture", "out.ppm", "10", "20", "-1", "30"])).unwrap();
        assert_eq!(
            invocation.command,
            Command::Capture {
                path: PathBuf::from("out.ppm"),
                area: (10, 20, -1, 30),
            }
        );

        let invocation = parse_args(&args(&["capture", "out.ppm"])).unwrap();
        assert!(matches!(invocation.command, Command::Capture { area: (0, 0, -1, -1), .. }));

        assert!(parse_args(&args(&["capture", "out.ppm", "1", "2"])).is_err());
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert!(parse_args(&args(&["fill", "blue"])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
    }

    #[test]
    fn test_parse_color_prefixes() {
        assert_eq!(parse_color("#ff0000").unwrap(), 0xff0000);
        assert_eq!(parse_color("00ff00").unwrap(), 0x00ff00);
    }
}
