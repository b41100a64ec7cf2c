//! Clipboard publishing using the `arboard` crate
//!
//! `arboard::Clipboard` is not `Send`, and on X11 the image only stays
//! available while the clipboard object that set it is alive. A dedicated
//! thread owns it for the life of the process.

use std::borrow::Cow;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arboard::ImageData;
use tracing::{debug, warn};

use super::{ClipboardService, Image};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

type Request = (ImageData<'static>, SyncSender<Result<()>>);

/// The desktop clipboard, fed from a thread that keeps it open
pub struct SystemClipboard {
    requests: Mutex<Sender<Request>>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("autoscreen-clipboard".into())
            .spawn(move || serve(rx))
            .context("failed to start clipboard thread")?;
        Ok(Self {
            requests: Mutex::new(tx),
        })
    }
}

impl ClipboardService for SystemClipboard {
    fn publish(&self, image: &Image) -> Result<()> {
        let data = to_image_data(image)?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.requests
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?
            .send((data, reply_tx))
            .map_err(|_| anyhow!("clipboard thread is gone"))?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| anyhow!("clipboard did not answer"))?
    }
}

fn serve(requests: Receiver<Request>) {
    let mut clipboard: Option<arboard::Clipboard> = None;
    for (data, reply) in requests {
        let result = set_image(&mut clipboard, data);
        if let Err(e) = &result {
            // Reconnect on the next request
            warn!(error = %e, "clipboard write failed");
            clipboard = None;
        }
        let _ = reply.send(result);
    }
    debug!("clipboard thread exiting");
}

fn set_image(clipboard: &mut Option<arboard::Clipboard>, data: ImageData<'static>) -> Result<()> {
    let mut board = match clipboard.take() {
        Some(board) => board,
        None => arboard::Clipboard::new().context("failed to open clipboard")?,
    };
    let result = board.set_image(data).context("failed to set clipboard image");
    *clipboard = Some(board);
    result
}

fn to_image_data(image: &Image) -> Result<ImageData<'static>> {
    let rgba = image::load_from_memory(&image.png)
        .context("failed to decode screenshot")?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageData {
        width: width as usize,
        height: height as usize,
        bytes: Cow::Owned(rgba.into_raw()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Image {
        let frame = RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(frame)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        Image::from_png(bytes)
    }

    #[test]
    fn test_png_decoded_to_rgba() {
        let data = to_image_data(&png(3, 2)).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.bytes.len(), 3 * 2 * 4);
        assert_eq!(&data.bytes[..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn test_garbage_is_rejected_before_clipboard() {
        let err = to_image_data(&Image::from_png(b"not a png".to_vec())).unwrap_err();
        assert!(err.to_string().contains("decode"));
    }
}
