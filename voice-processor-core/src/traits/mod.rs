pub mod audio_device;
pub mod output_device;
pub mod session_observer;
