//! # voice-processor-cpal
//!
//! Host audio backend for voice-processor, built on cpal.
//!
//! Provides:
//! - `CpalInputDevice`: an `AudioDevice` over a host input stream
//! - `CpalOutputDevice`: an `OutputDevice` that plays the reference signal
//! - `DeviceEnumerator`: device listing with supported sample rates
//!
//! ## Usage
//! ```ignore
//! use voice_processor_cpal::{CpalInputDevice, CpalOutputDevice};
//! use voice_processor_core::SessionController;
//!
//! let mut session = SessionController::new(CpalInputDevice::default_device());
//! session.set_reference_tone(CpalOutputDevice::default_device(), 1500.0)?;
//! session.init(16000, 48)?;
//! session.start_amplification()?;
//! // ...
//! session.stop_audio()?;
//! let samples = session.recorded_data()?;
//! let stereo = session.recording()?.to_stereo_wav_bytes();
//! ```

pub mod cpal_input;
pub mod cpal_output;
pub mod device_enumerator;
pub mod stream_format;
mod stream_thread;

pub use cpal_input::CpalInputDevice;
pub use cpal_output::CpalOutputDevice;
pub use device_enumerator::DeviceEnumerator;
