//! Timelapse: a still every interval, or one at the top of every hour.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Timelike};
use log::{debug, info};

use super::{configure, grab_still, preview, Recipes};
use crate::cancel::CancelToken;
use crate::config::secs;
use crate::imaging::save_jpeg;
use crate::traits::{CameraDevice, CameraProvider, Result};

const MODE_QUESTION: &str = "Continuous [1] or On the Hour [2]:";
const HOUR: Duration = Duration::from_secs(3600);

/// How stills are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelapseMode {
    /// A still every configured interval, numbered from 1.
    Continuous,
    /// A still at the top of every hour, named by timestamp.
    OnTheHour,
}

impl TimelapseMode {
    /// Parse the answer to the mode question.
    #[must_use]
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim() {
            "1" => Some(Self::Continuous),
            "2" => Some(Self::OnTheHour),
            _ => None,
        }
    }
}

/// `img001.jpg`, `img002.jpg`, ...
#[must_use]
pub fn counter_filename(counter: u32, extension: &str) -> String {
    format!("img{counter:03}{extension}")
}

/// `img2024-01-01-10-00.jpg`.
#[must_use]
pub fn timestamp_filename<Tz>(now: &DateTime<Tz>, extension: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}{extension}", now.format("img%Y-%m-%d-%H-%M"))
}

/// Time left until the next top of the hour. Exactly on the hour, that is a full hour.
#[must_use]
pub fn until_next_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let secs = u64::from(now.minute()) * 60 + u64::from(now.second());
    let past = Duration::from_secs(secs) + Duration::from_nanos(u64::from(now.nanosecond()));
    HOUR.saturating_sub(past)
}

impl<P: CameraProvider> Recipes<P> {
    /// Ask for a schedule, then take stills on it until stopped.
    pub fn timelapse(&self) -> Result<()> {
        let mode = self.ask_timelapse_mode()?;
        let config = &self.config;
        let cancel = match config.timelapse.max_frames {
            Some(_) => CancelToken::new(),
            None => (self.stop)()?,
        };

        let fourcc = self.still_fourcc()?;
        let mut device = self.open()?;
        let current = device.format()?;
        configure(&mut device, current.width, current.height, fourcc)?;

        let mut taken = 0u32;
        match mode {
            TimelapseMode::Continuous => {
                preview(&mut device, config.buffer_count, secs(config.warm_up_secs))?;
                let interval = secs(config.timelapse.interval_secs);
                while !self.timelapse_done(taken, &cancel) {
                    let name = counter_filename(taken + 1, &config.image_extension);
                    self.shoot(&mut device, &config.output_path(name))?;
                    taken += 1;
                    if !self.timelapse_done(taken, &cancel) && !cancel.sleep(interval) {
                        break;
                    }
                }
            }
            TimelapseMode::OnTheHour => {
                while !self.timelapse_done(taken, &cancel) {
                    let wait = until_next_hour(&Local::now());
                    debug!("Next capture in {wait:?}");
                    if !cancel.sleep(wait) {
                        break;
                    }
                    let name = timestamp_filename(&Local::now(), &config.image_extension);
                    self.shoot(&mut device, &config.output_path(name))?;
                    taken += 1;
                }
            }
        }
        info!("Timelapse ended after {taken} stills");
        Ok(())
    }

    /// Keep asking until the answer names a mode.
    fn ask_timelapse_mode(&self) -> Result<TimelapseMode> {
        loop {
            let answer = (self.prompt)(MODE_QUESTION)?;
            if let Some(mode) = TimelapseMode::from_answer(&answer) {
                return Ok(mode);
            }
            debug!("Unrecognised timelapse mode {:?}", answer.trim());
        }
    }

    fn timelapse_done(&self, taken: u32, cancel: &CancelToken) -> bool {
        cancel.is_cancelled()
            || self
                .config
                .timelapse
                .max_frames
                .is_some_and(|max| taken >= max)
    }

    fn shoot<D: CameraDevice>(&self, device: &mut D, path: &Path) -> Result<()> {
        let image = grab_still(device, &self.config)?;
        save_jpeg(&image, path, self.config.jpeg_quality)?;
        println!("Captured {}", path.display());
        Ok(())
    }
}
