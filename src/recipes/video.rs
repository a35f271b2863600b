//! Video recordings: to a file, to memory, and split over numbered files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use log::{debug, info};

use super::{configure, try_control, Recipes};
use crate::config::secs;
use crate::traits::{CameraDevice, CameraProvider, CaptureStream, ControlId, FourCC, Result};

const VGA: (u32, u32) = (640, 480);

impl<P: CameraProvider> Recipes<P> {
    /// Record VGA video into the configured video file.
    pub fn record_to_file(&self) -> Result<()> {
        let config = &self.config;
        let mut device = self.open()?;
        let format = configure(&mut device, VGA.0, VGA.1, self.video_fourcc()?)?;

        let path = config.video_path();
        let mut writer = BufWriter::new(File::create(&path)?);
        let mut stream = device.create_stream(config.buffer_count)?;
        let written = record(
            &mut stream,
            format.fourcc,
            &mut writer,
            secs(config.video.file_secs),
        )?;
        writer.flush()?;
        info!("Recorded {written} bytes to {}", path.display());
        Ok(())
    }

    /// Record into memory with a fixed quantiser and report the size.
    pub fn record_to_stream(&self) -> Result<()> {
        let recording = self.record_to_buffer()?;
        info!("Recorded {} bytes into memory", recording.len());
        Ok(())
    }

    /// Record into memory with a fixed quantiser, returning the encoded bytes.
    pub fn record_to_buffer(&self) -> Result<Vec<u8>> {
        let config = &self.config;
        let mut device = self.open()?;
        let format = configure(&mut device, VGA.0, VGA.1, self.video_fourcc()?)?;
        apply_quality(&mut device, config.video.quality)?;

        let mut buffer = Vec::new();
        let mut stream = device.create_stream(config.buffer_count)?;
        record(
            &mut stream,
            format.fourcc,
            &mut buffer,
            secs(config.video.stream_secs),
        )?;
        Ok(buffer)
    }

    /// Record into `1.h264`, `2.h264`, ... switching files on keyframes.
    pub fn record_multiple_files(&self) -> Result<()> {
        let config = &self.config;
        let mut device = self.open()?;
        let format = configure(&mut device, VGA.0, VGA.1, self.video_fourcc()?)?;
        // Every file needs its own SPS/PPS to be playable on its own.
        try_control(&mut device, ControlId::RepeatSequenceHeader, 1)?;

        let mut stream = device.create_stream(config.buffer_count)?;
        let sizes = record_segments(
            &mut stream,
            format.fourcc,
            config.video.segments,
            secs(config.video.segment_secs),
            |index| {
                let path = config.output_path(format!("{index}{}", config.video_extension));
                debug!("Recording to {}", path.display());
                Ok(BufWriter::new(File::create(path)?))
            },
        )?;
        info!(
            "Recorded {} files, {} bytes in total",
            sizes.len(),
            sizes.iter().sum::<u64>()
        );
        Ok(())
    }
}

/// Pin the H.264 quantiser so the encoder holds a constant quality.
pub(super) fn apply_quality<D: CameraDevice>(device: &mut D, quality: u8) -> Result<()> {
    let quality = i64::from(quality);
    try_control(device, ControlId::H264MinQp, quality)?;
    try_control(device, ControlId::H264MaxQp, quality)?;
    Ok(())
}

/// Write frames to `writer` for `duration`, starting at the first frame a decoder can start from.
///
/// Returns the number of bytes written.
pub fn record<S, W>(
    stream: &mut S,
    fourcc: FourCC,
    writer: &mut W,
    duration: Duration,
) -> Result<u64>
where
    S: CaptureStream,
    W: Write,
{
    let mut written = 0u64;
    let mut started: Option<Instant> = None;
    loop {
        let frame = stream.next_frame()?;
        if started.is_none() && !frame.starts_segment(fourcc) {
            continue;
        }
        let since = *started.get_or_insert_with(Instant::now);
        writer.write_all(&frame.data)?;
        written += frame.data.len() as u64;
        if since.elapsed() >= duration {
            return Ok(written);
        }
    }
}

/// Record `segments` consecutive files of roughly `segment_duration` each.
///
/// A file is closed once its duration is up, at the next frame that can start
/// a new one. `open` is called with the 1-based file number.
pub fn record_segments<S, W, F>(
    stream: &mut S,
    fourcc: FourCC,
    segments: u32,
    segment_duration: Duration,
    mut open: F,
) -> Result<Vec<u64>>
where
    S: CaptureStream,
    W: Write,
    F: FnMut(u32) -> Result<W>,
{
    let mut sizes = Vec::new();
    if segments == 0 {
        return Ok(sizes);
    }

    let mut index = 1;
    let mut writer: Option<(W, Instant, u64)> = None;
    loop {
        let frame = stream.next_frame()?;
        let starts = frame.starts_segment(fourcc);

        let finished = match writer.as_mut() {
            Some((current, since, written)) if starts && since.elapsed() >= segment_duration => {
                current.flush()?;
                sizes.push(*written);
                true
            }
            _ => false,
        };
        if finished {
            if index == segments {
                return Ok(sizes);
            }
            index += 1;
            writer = None;
        }

        if writer.is_none() {
            if !starts {
                continue;
            }
            writer = Some((open(index)?, Instant::now(), 0));
        }
        if let Some((current, _, written)) = writer.as_mut() {
            current.write_all(&frame.data)?;
            *written += frame.data.len() as u64;
        }
    }
}
