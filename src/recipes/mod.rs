//! The ten camera recipes and the registry that puts them on the menu.
//!
//! Every recipe opens its own camera handle through the provider, tunes it,
//! does its work and drops the handle on return.

mod overlay;
mod still;
mod timelapse;
mod video;

use std::io::{self, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, info, warn};

use crate::cancel::{self, CancelToken};
use crate::config::RecipeConfig;
use crate::dispatcher::{DispatchError, OperationRegistry};
use crate::imaging::frame_to_rgb;
use crate::traits::{
    CameraDevice, CameraError, CameraProvider, CaptureStream, ControlId, Format, FourCC, Fraction,
    Result,
};

pub use timelapse::{counter_filename, timestamp_filename, until_next_hour, TimelapseMode};

/// Asks the user a question and returns the answer line.
pub type Prompt = Box<dyn Fn(&str) -> Result<String>>;

/// Produces the token that stops a long-running recipe.
pub type StopTrigger = Box<dyn Fn() -> Result<CancelToken>>;

/// A recipe as stored in the menu table.
type Recipe<P> = fn(&Recipes<P>) -> Result<()>;

/// Exposure menu value for manual exposure.
const EXPOSURE_MANUAL: i64 = 1;

/// Camera recipes bound to a provider and configuration.
pub struct Recipes<P> {
    provider: P,
    config: RecipeConfig,
    prompt: Prompt,
    stop: StopTrigger,
}

impl<P: CameraProvider> Recipes<P> {
    /// Recipes that prompt on stdin and stop when Enter is pressed.
    pub fn new(provider: P, config: RecipeConfig) -> Self {
        Self {
            provider,
            config,
            prompt: Box::new(console_prompt),
            stop: Box::new(|| cancel::stop_on_enter().map_err(CameraError::from)),
        }
    }

    /// Replace the question/answer channel used by the timelapse recipe.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Replace what stops the timelapse and overlay recipes.
    #[must_use]
    pub fn with_stop_trigger(mut self, stop: StopTrigger) -> Self {
        self.stop = stop;
        self
    }

    /// Active configuration.
    pub const fn config(&self) -> &RecipeConfig {
        &self.config
    }

    fn open(&self) -> Result<P::Device> {
        let device = self.provider.open()?;
        let caps = device.capabilities();
        debug!("Camera: {} ({}, {})", caps.card, caps.driver, caps.bus_info);
        Ok(device)
    }

    fn still_fourcc(&self) -> Result<FourCC> {
        self.config
            .still_fourcc()
            .map_err(|err| CameraError::StreamError(err.to_string()))
    }

    fn video_fourcc(&self) -> Result<FourCC> {
        self.config
            .video_fourcc()
            .map_err(|err| CameraError::StreamError(err.to_string()))
    }
}

/// Menu table: key, description, recipe.
fn menu<P: CameraProvider>() -> [(&'static str, &'static str, Recipe<P>); 10] {
    [
        ("1", "Take Picture", Recipes::take_picture),
        ("2", "Capture to Stream", Recipes::capture_to_stream),
        ("3", "Resized Image", Recipes::resized_image),
        ("4", "Consistent Images", Recipes::consistent_images),
        ("5", "Timelapse Sequence", Recipes::timelapse),
        ("6", "Low light Image", Recipes::low_light_image),
        ("7", "Record video to a file", Recipes::record_to_file),
        ("8", "Record video to a stream", Recipes::record_to_stream),
        ("9", "Record over Multiple Files", Recipes::record_multiple_files),
        ("10", "Overlay Image on the preview", Recipes::overlay_preview),
    ]
}

/// Build the menu registry over shared recipes.
pub fn operation_registry<P>(
    recipes: Rc<Recipes<P>>,
) -> std::result::Result<OperationRegistry, DispatchError>
where
    P: CameraProvider + 'static,
{
    let mut builder = OperationRegistry::builder();
    for (key, description, recipe) in menu::<P>() {
        let recipes = Rc::clone(&recipes);
        builder = builder.register(key, description, move || {
            let started = Instant::now();
            info!("{description} started");
            recipe(&recipes)?;
            info!("{description} finished in {:?}", started.elapsed());
            Ok(())
        })?;
    }
    Ok(builder.build())
}

/// Print the question on stdout and read one answer line from stdin.
fn console_prompt(question: &str) -> Result<String> {
    let mut stdout = io::stdout();
    writeln!(stdout, "{question}")?;
    stdout.flush()?;

    let mut answer = String::new();
    match io::stdin().read_line(&mut answer)? {
        0 => Err(CameraError::InputClosed),
        _ => Ok(answer),
    }
}

/// Request a format, warning when the driver picks a different size.
fn configure<D: CameraDevice>(
    device: &mut D,
    width: u32,
    height: u32,
    fourcc: FourCC,
) -> Result<Format> {
    let actual = device.set_format(&Format::new(width, height, fourcc))?;
    if (actual.width, actual.height) != (width, height) {
        warn!(
            "Driver adjusted {width}x{height} to {}x{}",
            actual.width, actual.height
        );
    }
    debug!(
        "Format: {}x{} {}",
        actual.width, actual.height, actual.fourcc
    );
    Ok(actual)
}

fn set_interval<D: CameraDevice>(device: &mut D, interval: Fraction) -> Result<()> {
    let actual = device.set_frame_interval(interval)?;
    if actual != interval {
        warn!(
            "Driver adjusted frame interval {}/{} to {}/{}",
            interval.numerator, interval.denominator, actual.numerator, actual.denominator
        );
    }
    Ok(())
}

/// Set a tuning control; a control the camera lacks is skipped with a warning.
fn try_control<D: CameraDevice>(device: &mut D, control: ControlId, value: i64) -> Result<bool> {
    match device.set_control(control, value) {
        Ok(()) => {
            debug!("{control} = {value}");
            Ok(true)
        }
        Err(CameraError::ControlNotSupported(control)) => {
            warn!("{control} not supported by this camera, skipping");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

fn read_control<D: CameraDevice>(device: &D, control: ControlId) -> Result<Option<i64>> {
    match device.control(control) {
        Ok(value) => Ok(Some(value)),
        Err(CameraError::ControlNotSupported(control)) => {
            warn!("{control} not supported by this camera, skipping");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Stream and discard frames for `duration` so exposure and gain settle.
fn preview<D: CameraDevice>(device: &mut D, buffer_count: u32, duration: Duration) -> Result<u32> {
    if duration.is_zero() {
        return Ok(0);
    }
    let mut stream = device.create_stream(buffer_count)?;
    let started = Instant::now();
    let mut frames = 0;
    while started.elapsed() < duration {
        stream.next_frame()?;
        frames += 1;
    }
    debug!("Preview ran {frames} frames in {:?}", started.elapsed());
    Ok(frames)
}

/// Start a stream, drop the first frames and return the next one as RGB.
fn grab_still<D: CameraDevice>(device: &mut D, config: &RecipeConfig) -> Result<RgbImage> {
    let format = device.format()?;
    let mut stream = device.create_stream(config.buffer_count)?;
    for _ in 0..config.skip_frames {
        stream.next_frame()?;
    }
    let frame = stream.next_frame()?;
    frame_to_rgb(&frame, &format)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    use super::{Prompt, Recipes, StopTrigger};
    use crate::cancel::CancelToken;
    use crate::config::RecipeConfig;
    use crate::mock::MockProvider;
    use crate::traits::CameraError;

    /// Fast settings writing into `dir`.
    pub fn fast_config(dir: &Path) -> RecipeConfig {
        let mut config = RecipeConfig {
            output_dir: dir.to_path_buf(),
            skip_frames: 0,
            warm_up_secs: 0.0,
            ..RecipeConfig::default()
        };
        config.timelapse.interval_secs = 0.0;
        config.timelapse.max_frames = Some(3);
        config.low_light.settle_secs = 0.0;
        config.video.file_secs = 0.02;
        config.video.stream_secs = 0.02;
        config.video.segments = 3;
        config.video.segment_secs = 0.0;
        config.overlay.refresh_secs = 0.0;
        config
    }

    /// Prompt that replays canned answers, then reports closed input.
    pub fn scripted_prompt(answers: &[&str]) -> Prompt {
        let answers: RefCell<VecDeque<String>> =
            RefCell::new(answers.iter().map(|a| format!("{a}\n")).collect());
        Box::new(move |_question: &str| {
            answers
                .borrow_mut()
                .pop_front()
                .ok_or(CameraError::InputClosed)
        })
    }

    /// Stop trigger whose token is already cancelled.
    pub fn stopped() -> StopTrigger {
        Box::new(|| -> crate::traits::Result<CancelToken> {
            let token = CancelToken::new();
            token.cancel();
            Ok(token)
        })
    }

    pub fn mock_recipes(dir: &Path) -> Recipes<MockProvider> {
        Recipes::new(MockProvider::default(), fast_config(dir))
            .with_prompt(scripted_prompt(&[]))
            .with_stop_trigger(stopped())
    }
}
