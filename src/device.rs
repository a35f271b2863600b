//! V4L2 device implementation using the v4l crate.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use log::debug;
use v4l::buffer::{Flags as BufferFlags, Type};
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CameraDevice, CameraError, CameraProvider, CaptureStream, ControlId, DeviceCapabilities,
    Format, FourCC, Fraction, Frame, FrameMetadata, Result,
};

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    capabilities: DeviceCapabilities,
    controls: BTreeSet<ControlId>,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        // Some drivers refuse the control query entirely; treat that as "no tunable controls".
        let controls = match device.query_controls() {
            Ok(descriptions) => descriptions
                .iter()
                .filter_map(|description| ControlId::from_id(description.id))
                .collect(),
            Err(err) => {
                debug!("Control query failed on /dev/video{index}: {err}");
                BTreeSet::new()
            }
        };
        debug!(
            "Opened /dev/video{index}: {} ({}), controls: {controls:?}",
            capabilities.card, capabilities.driver
        );

        Ok(Self {
            device,
            capabilities,
            controls,
        })
    }

    fn ensure_control(&self, control: ControlId) -> Result<()> {
        if self.controls.contains(&control) {
            Ok(())
        } else {
            Err(CameraError::ControlNotSupported(control))
        }
    }
}

impl CameraDevice for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        let actual = Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        };
        if actual.fourcc != format.fourcc {
            return Err(CameraError::FormatNotSupported(format.clone()));
        }
        Ok(actual)
    }

    fn set_frame_interval(&mut self, interval: Fraction) -> Result<Fraction> {
        let params = self
            .device
            .set_params(&Parameters::new(interval.into()))
            .map_err(|err| CameraError::StreamError(err.to_string()))?;
        Ok(params.interval.into())
    }

    fn control(&self, control: ControlId) -> Result<i64> {
        self.ensure_control(control)?;
        let current = self
            .device
            .control(control.id())
            .map_err(|err| CameraError::ControlFailed {
                control,
                message: err.to_string(),
            })?;

        match current.value {
            Value::Integer(value) => Ok(value),
            Value::Boolean(value) => Ok(i64::from(value)),
            other => Err(CameraError::ControlFailed {
                control,
                message: format!("unexpected value type {other:?}"),
            }),
        }
    }

    fn set_control(&mut self, control: ControlId, value: i64) -> Result<()> {
        self.ensure_control(control)?;
        self.device
            .set_control(Control {
                id: control.id(),
                value: Value::Integer(value),
            })
            .map_err(|err| CameraError::ControlFailed {
                control,
                message: err.to_string(),
            })
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(V4L2Stream { stream })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        // The mmap buffer is sized for the worst case; compressed frames fill only part of it.
        let used = buf.get(..meta.bytesused as usize).unwrap_or(buf);

        Ok(Frame {
            data: used.to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
                keyframe: meta.flags.contains(BufferFlags::KEYFRAME),
            },
        })
    }
}

/// Opens `/dev/video<index>` for every recipe run.
#[derive(Debug, Clone, Copy)]
pub struct V4L2Provider {
    index: u32,
}

impl V4L2Provider {
    /// Provider for the given device index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CameraProvider for V4L2Provider {
    type Device = V4L2Device;

    fn open(&self) -> Result<V4L2Device> {
        if !Path::new(&format!("/dev/video{}", self.index)).exists() {
            return Err(CameraError::DeviceNotFound(self.index));
        }
        V4L2Device::open(self.index)
    }
}
