//! Screen capture using the `xcap` crate
//!
//! Monitors are numbered from 1, left to right, so "monitor 2" means the
//! same screen regardless of which one the OS calls primary.

use std::fmt;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;
use xcap::Monitor;

use super::{CaptureService, Image};
use crate::config::RegionSpec;

/// One connected display, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    /// 1-based, leftmost first
    pub number: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl fmt::Display for MonitorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Monitor {} ({}x{}) at {},{}",
            self.number, self.width, self.height, self.x, self.y
        )?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        if self.primary {
            write!(f, " [primary]")?;
        }
        Ok(())
    }
}

/// Captures through xcap and encodes to PNG in memory
#[derive(Debug, Default)]
pub struct ScreenCapture;

impl ScreenCapture {
    /// Connected monitors, numbered left to right
    pub fn monitors(&self) -> Result<Vec<MonitorInfo>> {
        Ok(screens()?.into_iter().map(|(info, _)| info).collect())
    }
}

impl CaptureService for ScreenCapture {
    fn grab(&self, region: &RegionSpec) -> Result<Image> {
        let screens = screens()?;
        let count = screens.len();

        let frame = match region {
            RegionSpec::Display(n) => {
                let (info, monitor) = screens
                    .into_iter()
                    .find(|(info, _)| info.number == *n)
                    .ok_or_else(|| anyhow!("monitor {} not found ({} connected)", n, count))?;
                debug!(%info, "capturing monitor");
                monitor
                    .capture_image()
                    .with_context(|| format!("failed to capture monitor {}", n))?
            }
            RegionSpec::AllDisplays => {
                let mut parts = Vec::with_capacity(count);
                for (info, monitor) in screens {
                    let frame = monitor
                        .capture_image()
                        .with_context(|| format!("failed to capture monitor {}", info.number))?;
                    parts.push((info, frame));
                }
                stitch(parts).ok_or_else(|| anyhow!("no monitors connected"))?
            }
        };

        let image = Image::from_png(encode_png(frame)?);
        debug!(bytes = image.len(), %region, "screen captured");
        Ok(image)
    }
}

fn screens() -> Result<Vec<(MonitorInfo, Monitor)>> {
    let mut found = Vec::new();
    for monitor in Monitor::all().context("failed to enumerate monitors")? {
        let info = MonitorInfo {
            number: 0,
            name: monitor.name().unwrap_or_default(),
            x: monitor.x()?,
            y: monitor.y()?,
            width: monitor.width()?,
            height: monitor.height()?,
            primary: monitor.is_primary().unwrap_or(false),
        };
        found.push((info, monitor));
    }
    number_left_to_right(&mut found);
    Ok(found)
}

fn number_left_to_right<T>(screens: &mut [(MonitorInfo, T)]) {
    screens.sort_by_key(|(info, _)| (info.x, info.y));
    for (number, (info, _)) in (1..).zip(screens.iter_mut()) {
        info.number = number;
    }
}

/// Lay every monitor's frame out on one canvas by desktop position
///
/// Frames may be larger than the monitor's logical size on HiDPI screens;
/// the canvas uses the highest scale and upsizes the rest to match.
fn stitch(parts: Vec<(MonitorInfo, RgbaImage)>) -> Option<RgbaImage> {
    if parts.len() == 1 {
        return parts.into_iter().next().map(|(_, frame)| frame);
    }

    let min_x = parts.iter().map(|(info, _)| info.x).min()?;
    let min_y = parts.iter().map(|(info, _)| info.y).min()?;
    let max_x = parts.iter().map(|(info, _)| info.x + info.width as i32).max()?;
    let max_y = parts.iter().map(|(info, _)| info.y + info.height as i32).max()?;
    let scale = parts
        .iter()
        .map(|(info, frame)| frame.width() as f64 / info.width.max(1) as f64)
        .fold(1.0, f64::max);

    let scaled = |v: i32| (f64::from(v) * scale).round() as u32;
    let mut canvas = RgbaImage::new(scaled(max_x - min_x), scaled(max_y - min_y));

    for (info, frame) in parts {
        let (width, height) = (scaled(info.width as i32), scaled(info.height as i32));
        let frame = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, FilterType::Triangle)
        };
        imageops::overlay(
            &mut canvas,
            &frame,
            i64::from(scaled(info.x - min_x)),
            i64::from(scaled(info.y - min_y)),
        );
    }
    Some(canvas)
}

fn encode_png(frame: RgbaImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(frame)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode screenshot as PNG")?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn info(x: i32, y: i32, width: u32, height: u32) -> MonitorInfo {
        MonitorInfo {
            number: 0,
            name: String::new(),
            x,
            y,
            width,
            height,
            primary: false,
        }
    }

    fn solid(width: u32, height: u32, shade: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]))
    }

    #[test]
    fn test_monitors_numbered_left_to_right() {
        let mut screens = vec![
            (info(1920, 0, 1280, 1024), "right"),
            (info(-1280, 0, 1280, 1024), "left"),
            (info(0, 0, 1920, 1080), "middle"),
        ];
        number_left_to_right(&mut screens);

        let order: Vec<_> = screens.iter().map(|(info, tag)| (info.number, *tag)).collect();
        assert_eq!(order, vec![(1, "left"), (2, "middle"), (3, "right")]);
    }

    #[test]
    fn test_stitch_places_frames_by_position() {
        let canvas = stitch(vec![
            (info(0, 0, 2, 1), solid(2, 1, 10)),
            (info(2, 0, 2, 2), solid(2, 2, 200)),
        ])
        .unwrap();

        assert_eq!(canvas.dimensions(), (4, 2));
        assert_eq!(canvas.get_pixel(0, 0)[0], 10);
        assert_eq!(canvas.get_pixel(3, 1)[0], 200);
        // Below the shorter monitor stays empty
        assert_eq!(canvas.get_pixel(0, 1)[3], 0);
    }

    #[test]
    fn test_stitch_handles_negative_origin_and_hidpi() {
        // Left monitor captured at 2x
        let canvas = stitch(vec![
            (info(-2, 0, 2, 1), solid(4, 2, 50)),
            (info(0, 0, 2, 1), solid(2, 1, 150)),
        ])
        .unwrap();

        assert_eq!(canvas.dimensions(), (8, 2));
        assert_eq!(canvas.get_pixel(3, 1)[0], 50);
        assert_eq!(canvas.get_pixel(7, 1)[0], 150);
    }

    #[test]
    fn test_single_monitor_passes_through() {
        let canvas = stitch(vec![(info(100, 100, 3, 2), solid(3, 2, 7))]).unwrap();
        assert_eq!(canvas.dimensions(), (3, 2));
        assert!(stitch(Vec::new()).is_none());
    }

    #[test]
    fn test_png_encoding() {
        let png = encode_png(solid(2, 2, 1)).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 2);
    }

    #[test]
    fn test_monitor_display() {
        let mut monitor = info(0, 0, 1920, 1080);
        monitor.number = 1;
        monitor.primary = true;
        assert_eq!(monitor.to_string(), "Monitor 1 (1920x1080) at 0,0 [primary]");
    }
}
