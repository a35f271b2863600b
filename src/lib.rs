//! Pi-Cam-Recipes: a menu of camera capture recipes for V4L2 cameras
//!
//! The [`dispatcher`] reads menu selections and runs registered operations;
//! [`recipes`] registers the ten capture recipes, which drive a camera through
//! the trait abstractions in [`traits`] so they run against real hardware or
//! a mock device.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod imaging;
pub mod logging;
pub mod recipes;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use device::{V4L2Device, V4L2Provider};
pub use dispatcher::{DispatchError, DispatchState, Dispatcher, OperationRegistry};
pub use recipes::{operation_registry, Recipes};
pub use traits::{
    CameraDevice, CameraError, CameraProvider, CaptureStream, DeviceCapabilities, Format, FourCC,
    Frame, FrameMetadata,
};
