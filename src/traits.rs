//! Core traits and types for the camera abstraction used by the recipes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Pixel format representation (e.g., YUYV, MJPG, H264).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// Single JPEG stills.
    pub const JPEG: Self = Self::new(b"JPEG");
    /// H.264 elementary stream.
    pub const H264: Self = Self::new(b"H264");

    /// Bytes per pixel for packed uncompressed formats, `None` for compressed ones.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match &self.0 {
            b"YUYV" => Some(2),
            b"RGB3" => Some(3),
            _ => None,
        }
    }

    /// Whether every frame in this format can be decoded on its own.
    #[must_use]
    pub fn is_intra_only(self) -> bool {
        self != Self::H264
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("pixel format '{s}' must be exactly four characters"))?;
        if !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(format!("pixel format '{s}' must be printable ASCII"));
        }
        Ok(Self(bytes))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride). Zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes. Zero when the driver decides (compressed formats).
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = match fourcc.bytes_per_pixel() {
            Some(bpp) => width * bpp,
            None => 0,
        };
        Self {
            width,
            height,
            fourcc,
            stride,
            size: stride * height,
        }
    }
}

/// Frame interval in seconds, expressed as a fraction.
///
/// 1/30 is 30 fps; 6/1 is one frame every six seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    /// Numerator.
    pub numerator: u32,
    /// Denominator.
    pub denominator: u32,
}

impl Fraction {
    /// Create a new fraction.
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Interval for a whole number of frames per second.
    #[must_use]
    pub const fn per_second(fps: u32) -> Self {
        Self::new(1, fps)
    }
}

impl From<Fraction> for v4l::Fraction {
    fn from(fraction: Fraction) -> Self {
        Self::new(fraction.numerator, fraction.denominator)
    }
}

impl From<v4l::Fraction> for Fraction {
    fn from(fraction: v4l::Fraction) -> Self {
        Self::new(fraction.numerator, fraction.denominator)
    }
}

/// Camera controls the recipes tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlId {
    /// Automatic white balance on/off.
    AutoWhiteBalance,
    /// White balance colour temperature in Kelvin.
    WhiteBalanceTemperature,
    /// Exposure mode menu (0 auto, 1 manual).
    ExposureAuto,
    /// Exposure time in 100 µs units.
    ExposureAbsolute,
    /// ISO sensitivity, in ISO units multiplied by 1000.
    IsoSensitivity,
    /// ISO mode menu (0 manual, 1 auto).
    IsoSensitivityAuto,
    /// Lowest H.264 quantisation parameter.
    H264MinQp,
    /// Highest H.264 quantisation parameter.
    H264MaxQp,
    /// Repeat SPS/PPS before every keyframe.
    RepeatSequenceHeader,
}

impl ControlId {
    /// Every control the recipes know about.
    pub const ALL: [Self; 9] = [
        Self::AutoWhiteBalance,
        Self::WhiteBalanceTemperature,
        Self::ExposureAuto,
        Self::ExposureAbsolute,
        Self::IsoSensitivity,
        Self::IsoSensitivityAuto,
        Self::H264MinQp,
        Self::H264MaxQp,
        Self::RepeatSequenceHeader,
    ];

    /// The V4L2 control id.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::AutoWhiteBalance => 0x0098_090c,
            Self::WhiteBalanceTemperature => 0x0098_091a,
            Self::ExposureAuto => 0x009a_0901,
            Self::ExposureAbsolute => 0x009a_0902,
            Self::IsoSensitivity => 0x009a_0917,
            Self::IsoSensitivityAuto => 0x009a_0918,
            Self::H264MinQp => 0x0099_0a61,
            Self::H264MaxQp => 0x0099_0a62,
            Self::RepeatSequenceHeader => 0x0099_09e2,
        }
    }

    /// Look up a known control by V4L2 id.
    #[must_use]
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|control| control.id() == id)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} (0x{:08x})", self.id())
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
    /// Set by encoders on frames that start a new group of pictures.
    pub keyframe: bool,
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame data, trimmed to the bytes the driver filled in.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Whether a recording may start (or a new segment may begin) at this frame.
    ///
    /// Not every encoder sets the keyframe buffer flag, so H.264 data is also
    /// scanned for an IDR slice or a sequence parameter set.
    #[must_use]
    pub fn starts_segment(&self, fourcc: FourCC) -> bool {
        self.metadata.keyframe
            || fourcc.is_intra_only()
            || (fourcc == FourCC::H264 && has_h264_entry_point(&self.data))
    }
}

/// NAL unit types a decoder can start from: IDR slice (5) and SPS (7).
fn has_h264_entry_point(data: &[u8]) -> bool {
    data.windows(4).any(|window| match window {
        [0, 0, 1, header] => matches!(header & 0x1f, 5 | 7),
        _ => false,
    })
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// The driver does not expose this control.
    #[error("Control not supported: {0}")]
    ControlNotSupported(ControlId),
    /// The driver rejected a control read or write.
    #[error("Control {control} failed: {message}")]
    ControlFailed {
        /// Control that failed.
        control: ControlId,
        /// Driver message.
        message: String,
    },
    /// Image decode or encode failure.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// Interactive input ended before an answer was given.
    #[error("Input closed")]
    InputClosed,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Set the frame interval. Returns the interval the driver settled on.
    fn set_frame_interval(&mut self, interval: Fraction) -> Result<Fraction>;

    /// Read the current value of a control.
    fn control(&self, control: ControlId) -> Result<i64>;

    /// Write a control value.
    fn set_control(&mut self, control: ControlId, value: i64) -> Result<()>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Opens a fresh camera handle for each recipe run.
pub trait CameraProvider {
    /// Device type handed out.
    type Device: CameraDevice;

    /// Open the camera.
    fn open(&self) -> Result<Self::Device>;
}
