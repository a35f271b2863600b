//! Preview with an image blended over it.

use std::time::Instant;

use log::{debug, info};

use super::{configure, set_interval, Recipes};
use crate::config::secs;
use crate::imaging::{frame_to_rgb, save_jpeg, Overlay};
use crate::traits::{CameraDevice, CameraProvider, CaptureStream, Fraction, Result};

const PREVIEW_SIZE: (u32, u32) = (1280, 720);
const PREVIEW_FPS: u32 = 24;

impl<P: CameraProvider> Recipes<P> {
    /// Run a 24 fps preview with the overlay image on top until stopped.
    ///
    /// The composited preview is rewritten to the preview file at most once
    /// per refresh interval.
    ///
    /// The stop request is checked after each frame, so at least one frame is
    /// always written. A camera that stops delivering frames blocks the loop
    /// inside the driver read, and a stop request is only seen once the next
    /// frame arrives.
    pub fn overlay_preview(&self) -> Result<()> {
        let config = &self.config;
        let mut overlay = Overlay::load(&config.overlay.path)?;
        overlay.alpha = config.overlay.alpha;
        overlay.layer = config.overlay.layer;
        let (width, height) = overlay.size();
        let (padded_width, padded_height) = overlay.padded_size();
        info!(
            "Overlay {} is {width}x{height}, padded to {padded_width}x{padded_height}",
            config.overlay.path.display()
        );

        let mut device = self.open()?;
        let fourcc = self.still_fourcc()?;
        let format = configure(&mut device, PREVIEW_SIZE.0, PREVIEW_SIZE.1, fourcc)?;
        set_interval(&mut device, Fraction::per_second(PREVIEW_FPS))?;

        let cancel = (self.stop)()?;
        let refresh = secs(config.overlay.refresh_secs);
        let path = config.output_path(&config.overlay.preview_path);
        let mut stream = device.create_stream(config.buffer_count)?;
        let mut last_write: Option<Instant> = None;
        let mut frames = 0u64;
        loop {
            let frame = stream.next_frame()?;
            frames += 1;
            if !last_write.is_some_and(|at| at.elapsed() < refresh) {
                let mut image = frame_to_rgb(&frame, &format)?;
                if !overlay.composite_onto(&mut image) {
                    debug!("Overlay is beneath the preview layer");
                }
                save_jpeg(&image, &path, config.jpeg_quality)?;
                last_write = Some(Instant::now());
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        info!(
            "Preview stopped after {frames} frames, last view in {}",
            path.display()
        );
        Ok(())
    }
}
