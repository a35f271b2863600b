//! Single and burst stills.

use std::fs::{self, File};
use std::io::{BufWriter, Write};

use log::info;

use super::{
    configure, grab_still, preview, read_control, set_interval, try_control, Recipes,
    EXPOSURE_MANUAL,
};
use crate::config::{secs, LowLightConfig};
use crate::imaging::{frame_to_rgb, resize, save_jpeg, write_jpeg};
use crate::traits::{CameraDevice, CameraProvider, CaptureStream, ControlId, Fraction, Result};

const STILL_SIZE: (u32, u32) = (1024, 768);
const THUMBNAIL_SIZE: (u32, u32) = (320, 240);
const HD_SIZE: (u32, u32) = (1280, 720);
const BURST_FPS: u32 = 30;
const BURST_LEN: u32 = 10;
/// One frame every six seconds, so a six second shutter fits.
const LONG_EXPOSURE_INTERVAL: Fraction = Fraction::new(6, 1);
const ISO_MANUAL: i64 = 0;

impl<P: CameraProvider> Recipes<P> {
    /// Warm up at 1024x768 and save one still, replacing any earlier one.
    pub fn take_picture(&self) -> Result<()> {
        let config = &self.config;
        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        configure(&mut device, STILL_SIZE.0, STILL_SIZE.1, fourcc)?;
        preview(&mut device, config.buffer_count, secs(config.warm_up_secs))?;

        let path = config.image_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let image = grab_still(&mut device, config)?;
        save_jpeg(&image, &path, config.jpeg_quality)?;
        info!("Saved {}", path.display());
        Ok(())
    }

    /// Encode one still into an already open file handle.
    pub fn capture_to_stream(&self) -> Result<()> {
        let config = &self.config;
        let path = config.image_path();
        let mut writer = BufWriter::new(File::create(&path)?);

        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        let current = device.format()?;
        configure(&mut device, current.width, current.height, fourcc)?;
        preview(&mut device, config.buffer_count, secs(config.warm_up_secs))?;

        let image = grab_still(&mut device, config)?;
        write_jpeg(&image, &mut writer, config.jpeg_quality)?;
        writer.flush()?;
        drop(device);
        drop(writer);
        info!("Wrote capture into {}", path.display());
        Ok(())
    }

    /// Capture at 1024x768 and store it scaled down to 320x240.
    pub fn resized_image(&self) -> Result<()> {
        let config = &self.config;
        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        configure(&mut device, STILL_SIZE.0, STILL_SIZE.1, fourcc)?;
        preview(&mut device, config.buffer_count, secs(config.warm_up_secs))?;

        let image = grab_still(&mut device, config)?;
        let small = resize(&image, THUMBNAIL_SIZE.0, THUMBNAIL_SIZE.1);
        let path = config.image_path();
        save_jpeg(&small, &path, config.jpeg_quality)?;
        info!(
            "Saved {}x{} still to {}",
            small.width(),
            small.height(),
            path.display()
        );
        Ok(())
    }

    /// Let automatic exposure and white balance settle, freeze them, then shoot a burst.
    pub fn consistent_images(&self) -> Result<()> {
        let config = &self.config;
        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        let format = configure(&mut device, HD_SIZE.0, HD_SIZE.1, fourcc)?;
        set_interval(&mut device, Fraction::per_second(BURST_FPS))?;
        preview(&mut device, config.buffer_count, secs(config.warm_up_secs))?;

        lock_exposure(&mut device)?;
        lock_white_balance(&mut device)?;

        let mut stream = device.create_stream(config.buffer_count)?;
        for _ in 0..config.skip_frames {
            stream.next_frame()?;
        }
        for index in 0..BURST_LEN {
            let frame = stream.next_frame()?;
            let image = frame_to_rgb(&frame, &format)?;
            let path = config.output_path(format!(
                "{}{index:02}{}",
                config.image_name, config.image_extension
            ));
            save_jpeg(&image, &path, config.jpeg_quality)?;
            info!("Saved {}", path.display());
        }
        Ok(())
    }

    /// Long exposure at a low frame rate and fixed ISO, saved as `dark.jpg`.
    pub fn low_light_image(&self) -> Result<()> {
        let config = &self.config;
        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        configure(&mut device, HD_SIZE.0, HD_SIZE.1, fourcc)?;
        apply_long_exposure(&mut device, &config.low_light)?;
        // Auto white balance needs a running stream to measure.
        let settle = secs(config.low_light.settle_secs);
        preview(&mut device, config.buffer_count, settle)?;

        let image = grab_still(&mut device, config)?;
        let path = config.output_path(format!("dark{}", config.image_extension));
        save_jpeg(&image, &path, config.jpeg_quality)?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

/// Switch to manual exposure at the value automatic exposure settled on.
pub(super) fn lock_exposure<D: CameraDevice>(device: &mut D) -> Result<()> {
    let Some(current) = read_control(device, ControlId::ExposureAbsolute)? else {
        return Ok(());
    };
    try_control(device, ControlId::ExposureAuto, EXPOSURE_MANUAL)?;
    try_control(device, ControlId::ExposureAbsolute, current)?;
    info!("Exposure fixed at {} us", current * 100);
    Ok(())
}

/// Turn automatic white balance off at the temperature it settled on.
pub(super) fn lock_white_balance<D: CameraDevice>(device: &mut D) -> Result<()> {
    let temperature = read_control(device, ControlId::WhiteBalanceTemperature)?;
    try_control(device, ControlId::AutoWhiteBalance, 0)?;
    if let Some(temperature) = temperature {
        try_control(device, ControlId::WhiteBalanceTemperature, temperature)?;
        info!("White balance fixed at {temperature} K");
    }
    Ok(())
}

/// Frame interval, shutter and ISO for a long exposure.
pub(super) fn apply_long_exposure<D: CameraDevice>(
    device: &mut D,
    settings: &LowLightConfig,
) -> Result<()> {
    set_interval(device, LONG_EXPOSURE_INTERVAL)?;
    try_control(device, ControlId::ExposureAuto, EXPOSURE_MANUAL)?;
    // V4L2 exposure is counted in 100 us steps.
    let exposure = i64::try_from(settings.exposure_us / 100).unwrap_or(i64::MAX);
    try_control(device, ControlId::ExposureAbsolute, exposure)?;
    try_control(device, ControlId::IsoSensitivityAuto, ISO_MANUAL)?;
    let iso = i64::from(settings.iso) * 1000;
    try_control(device, ControlId::IsoSensitivity, iso)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::mock_recipes;
    use super::*;
    use crate::mock::MockDevice;

    fn dimensions(path: &std::path::Path) -> (u32, u32) {
        let image = image::open(path).expect("decodable JPEG");
        (image.width(), image.height())
    }

    #[test]
    fn test_take_picture_replaces_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("image.jpg");
        fs::write(&path, b"stale").expect("seed file");

        mock_recipes(dir.path()).take_picture().expect("take_picture");
        assert_eq!(dimensions(&path), (1024, 768));
    }

    #[test]
    fn test_capture_to_stream_writes_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        mock_recipes(dir.path())
            .capture_to_stream()
            .expect("capture_to_stream");
        assert_eq!(dimensions(&dir.path().join("image.jpg")), (640, 480));
    }

    #[test]
    fn test_resized_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        mock_recipes(dir.path()).resized_image().expect("resized_image");
        assert_eq!(dimensions(&dir.path().join("image.jpg")), (320, 240));
    }

    #[test]
    fn test_consistent_images_burst() {
        let dir = tempfile::tempdir().expect("tempdir");
        mock_recipes(dir.path())
            .consistent_images()
            .expect("consistent_images");

        for index in 0..BURST_LEN {
            let path = dir.path().join(format!("image{index:02}.jpg"));
            assert_eq!(dimensions(&path), (1280, 720), "{}", path.display());
        }
        assert!(!dir.path().join("image10.jpg").exists());
    }

    #[test]
    fn test_low_light_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        mock_recipes(dir.path()).low_light_image().expect("low_light_image");
        assert_eq!(dimensions(&dir.path().join("dark.jpg")), (1280, 720));
    }

    fn current(device: &MockDevice, id: ControlId) -> i64 {
        device.control(id).expect("control")
    }

    #[test]
    fn test_lock_keeps_settled_values() {
        let mut device = MockDevice::new();
        let exposure = current(&device, ControlId::ExposureAbsolute);
        let temperature = current(&device, ControlId::WhiteBalanceTemperature);

        lock_exposure(&mut device).expect("lock_exposure");
        lock_white_balance(&mut device).expect("lock_white_balance");

        assert_eq!(current(&device, ControlId::ExposureAuto), EXPOSURE_MANUAL);
        assert_eq!(current(&device, ControlId::ExposureAbsolute), exposure);
        assert_eq!(current(&device, ControlId::AutoWhiteBalance), 0);
        assert_eq!(
            current(&device, ControlId::WhiteBalanceTemperature),
            temperature
        );
    }

    #[test]
    fn test_lock_without_controls_is_a_no_op() {
        let mut device = MockDevice::new().without_controls();
        lock_exposure(&mut device).expect("lock_exposure");
        lock_white_balance(&mut device).expect("lock_white_balance");
    }

    #[test]
    fn test_long_exposure_settings() {
        let mut device = MockDevice::new();
        apply_long_exposure(&mut device, &LowLightConfig::default()).expect("apply");

        assert_eq!(device.interval(), Fraction::new(6, 1));
        assert_eq!(current(&device, ControlId::ExposureAuto), EXPOSURE_MANUAL);
        assert_eq!(current(&device, ControlId::ExposureAbsolute), 60_000);
        assert_eq!(current(&device, ControlId::IsoSensitivityAuto), ISO_MANUAL);
        assert_eq!(current(&device, ControlId::IsoSensitivity), 800_000);
    }
}
