pub mod capture_buffer;
pub mod processor;
pub mod tone;
pub mod wav_format;
