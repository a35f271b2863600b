//! Mock device implementation for testing without hardware.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::traits::{
    CameraDevice, CameraError, CameraProvider, CaptureStream, ControlId, DeviceCapabilities,
    Format, FourCC, Fraction, Frame, FrameMetadata, Result,
};

/// Frames between synthetic H.264 keyframes.
pub const KEYFRAME_INTERVAL: u32 = 30;

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    interval: Fraction,
    controls: BTreeMap<ControlId, i64>,
    frame_count: u32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        let controls = BTreeMap::from([
            (ControlId::AutoWhiteBalance, 1),
            (ControlId::WhiteBalanceTemperature, 4500),
            (ControlId::ExposureAuto, 0),
            (ControlId::ExposureAbsolute, 166),
            (ControlId::IsoSensitivity, 0),
            (ControlId::IsoSensitivityAuto, 1),
            (ControlId::H264MinQp, 0),
            (ControlId::H264MaxQp, 51),
            (ControlId::RepeatSequenceHeader, 0),
        ]);

        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            interval: Fraction::per_second(30),
            controls,
            frame_count: 0,
        }
    }

    /// Drop every tunable control, like a driver that exposes none.
    #[must_use]
    pub fn without_controls(mut self) -> Self {
        self.controls.clear();
        self
    }

    /// Current frame interval.
    #[must_use]
    pub const fn interval(&self) -> Fraction {
        self.interval
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if format.fourcc != FourCC::YUYV && format.fourcc != FourCC::H264 {
            return Err(CameraError::FormatNotSupported(format.clone()));
        }
        self.format = Format::new(format.width, format.height, format.fourcc);
        Ok(self.format.clone())
    }

    fn set_frame_interval(&mut self, interval: Fraction) -> Result<Fraction> {
        self.interval = interval;
        Ok(interval)
    }

    fn control(&self, control: ControlId) -> Result<i64> {
        self.controls
            .get(&control)
            .copied()
            .ok_or(CameraError::ControlNotSupported(control))
    }

    fn set_control(&mut self, control: ControlId, value: i64) -> Result<()> {
        let slot = self
            .controls
            .get_mut(&control)
            .ok_or(CameraError::ControlNotSupported(control))?;
        *slot = value;
        Ok(())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream {
            device: self,
            pattern: TestPattern::ColorBars,
        })
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
    pattern: TestPattern,
}

impl MockStream<'_> {
    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let format = &self.device.format;
        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        let keyframe = format.fourcc == FourCC::H264 && seq % KEYFRAME_INTERVAL == 0;
        let data = if format.fourcc == FourCC::H264 {
            generate_access_unit(seq, keyframe)
        } else {
            generate_test_frame(format, self.pattern)
        };

        #[allow(clippy::cast_possible_truncation)]
        let bytes_used = data.len() as u32;

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used,
                keyframe,
            },
        })
    }
}

/// Hands out fresh mock devices, or fails to open like a missing camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider {
    missing: bool,
}

impl MockProvider {
    /// Provider whose camera is never present.
    #[must_use]
    pub const fn missing() -> Self {
        Self { missing: true }
    }
}

impl CameraProvider for MockProvider {
    type Device = MockDevice;

    fn open(&self) -> Result<MockDevice> {
        if self.missing {
            return Err(CameraError::DeviceNotFound(0));
        }
        Ok(MockDevice::new())
    }
}

/// Fake H.264 access unit: start code, IDR (0x65) or non-IDR (0x41) NAL header, sequence number.
///
/// The sequence number is little-endian so it never forms a start code.
fn generate_access_unit(seq: u32, keyframe: bool) -> Vec<u8> {
    let nal = if keyframe { 0x65 } else { 0x41 };
    let mut data = vec![0, 0, 0, 1, nal];
    data.extend_from_slice(&seq.to_le_bytes());
    data
}

/// Generate test frame data based on pattern.
fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let size = (format.width * format.height * 2) as usize; // YUYV = 2 bytes/pixel
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(&mut data, format.width, format.height);
        }
        TestPattern::Gradient => {
            generate_gradient(&mut data, format.width, format.height);
        }
        TestPattern::Solid(y, u, v) => {
            generate_solid(&mut data, y, u, v);
        }
    }

    data
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let bar_width = (width / 8).max(1);

    for line in data.chunks_exact_mut((width * 2) as usize).take(height as usize) {
        for (pair, pixels) in line.chunks_exact_mut(4).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let x = pair as u32 * 2;
            let (y_val, u_val, v_val) = bars
                .get(((x / bar_width) as usize).min(7))
                .copied()
                .unwrap_or((16, 128, 128));
            pixels.copy_from_slice(&[y_val, u_val, y_val, v_val]);
        }
    }
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32, height: u32) {
    for line in data.chunks_exact_mut((width * 2) as usize).take(height as usize) {
        for (pair, pixels) in line.chunks_exact_mut(4).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let x = pair as u32 * 2;
            #[allow(clippy::cast_possible_truncation)]
            let y_val = ((x * 255) / width) as u8;
            pixels.copy_from_slice(&[y_val, 128, y_val, 128]);
        }
    }
}

/// Generate solid color YUYV frame.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for pixels in data.chunks_exact_mut(4) {
        pixels.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device
            .set_format(&new_format)
            .expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);

        let mjpg = Format::new(1280, 720, FourCC::MJPG);
        assert!(matches!(
            device.set_format(&mjpg),
            Err(CameraError::FormatNotSupported(_))
        ));
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new();
        let mut stream = device
            .create_stream(4)
            .expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert!(!frame1.data.is_empty());

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_h264_keyframe_cadence() {
        let mut device = MockDevice::new();
        device
            .set_format(&Format::new(640, 480, FourCC::H264))
            .expect("set_format should succeed");
        let mut stream = device.create_stream(4).expect("create_stream");

        let first = stream.next_frame().expect("frame");
        assert!(first.metadata.keyframe);
        assert_eq!(first.data.get(4), Some(&0x65));

        let second = stream.next_frame().expect("frame");
        assert!(!second.metadata.keyframe);
        assert_eq!(second.data.get(4), Some(&0x41));
    }

    #[test]
    fn test_controls_round_trip_and_unsupported() {
        let mut device = MockDevice::new();
        device
            .set_control(ControlId::ExposureAbsolute, 60_000)
            .expect("set_control");
        assert_eq!(
            device.control(ControlId::ExposureAbsolute).expect("control"),
            60_000
        );

        let mut bare = MockDevice::new().without_controls();
        assert!(matches!(
            bare.set_control(ControlId::IsoSensitivity, 800_000),
            Err(CameraError::ControlNotSupported(ControlId::IsoSensitivity))
        ));
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), (640 * 480 * 2) as usize);

        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = (479 * 640 * 2) as usize;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }
}
