use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::config::ActualConfig;
use super::diagnostics::StreamDiagnostics;
use super::mode::ProcessingMode;
use crate::processing::wav_format;

/// Captured audio of a stopped session, tagged with its actual format.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Mono copy of the signal played on the reference output, if any.
    pub reference: Option<ReferenceTrack>,
    pub metadata: RecordingMetadata,
}

/// The played reference signal at its output rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTrack {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn new(
        samples: Vec<i16>,
        actual: &ActualConfig,
        modes: Vec<ProcessingMode>,
        diagnostics: StreamDiagnostics,
    ) -> Self {
        let metadata = RecordingMetadata::describe(&samples, actual.sample_rate, actual.channels, modes, diagnostics);
        Self {
            samples,
            sample_rate: actual.sample_rate,
            channels: actual.channels,
            reference: None,
            metadata,
        }
    }

    pub fn with_reference(mut self, samples: Vec<i16>, sample_rate: u32) -> Self {
        self.metadata.reference_checksum = Some(pcm_checksum(&samples));
        self.reference = Some(ReferenceTrack { samples, sample_rate });
        self
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.metadata.duration_secs
    }

    /// Canonical PCM WAV bytes using the negotiated rate and channel count.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        wav_format::encode_wav(&self.samples, self.sample_rate, self.channels)
    }

    pub fn to_mono(&self) -> Vec<i16> {
        wav_format::downmix_to_mono(&self.samples, self.channels as usize)
    }

    /// Stereo frames with the reference on the left and the mono mic on the
    /// right. `None` without a reference or when the two rates differ.
    pub fn to_stereo_with_reference(&self) -> Option<Vec<i16>> {
        let reference = self.reference.as_ref()?;
        if reference.sample_rate != self.sample_rate {
            return None;
        }
        Some(wav_format::interleave_pair(&reference.samples, &self.to_mono()))
    }

    pub fn to_stereo_wav_bytes(&self) -> Option<Vec<u8>> {
        self.to_stereo_with_reference()
            .map(|frames| wav_format::encode_wav(&frames, self.sample_rate, 2))
    }
}

/// Metadata describing a recording, serializable for the host app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: usize,
    pub duration_secs: f64,
    /// SHA-256 of the little-endian PCM payload.
    pub checksum: String,
    /// Modes in the order they were activated during the session.
    pub modes: Vec<ProcessingMode>,
    pub diagnostics: StreamDiagnostics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_checksum: Option<String>,
}

impl RecordingMetadata {
    fn describe(
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        modes: Vec<ProcessingMode>,
        diagnostics: StreamDiagnostics,
    ) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sample_rate,
            channels,
            sample_count: samples.len(),
            duration_secs: frames as f64 / sample_rate as f64,
            checksum: pcm_checksum(samples),
            modes,
            diagnostics,
            reference_checksum: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// SHA-256 hex digest of samples encoded as little-endian PCM.
pub fn pcm_checksum(samples: &[i16]) -> String {
    let mut hasher = Sha256::new();
    for sample in samples {
        hasher.update(sample.to_le_bytes());
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::StreamConfig;
    use approx::assert_relative_eq;

    fn actual(sample_rate: u32, channels: u16) -> ActualConfig {
        ActualConfig::exact(&StreamConfig::new(sample_rate, 48).with_channels(channels))
    }

    #[test]
    fn duration_uses_actual_rate_and_channels() {
        let recording = Recording::new(vec![0; 96000], &actual(48000, 2), vec![], StreamDiagnostics::default());
        assert_eq!(recording.frames(), 48000);
        assert_relative_eq!(recording.duration_secs(), 1.0);
    }

    #[test]
    fn checksum_is_stable_for_identical_samples() {
        let a = pcm_checksum(&[1, 2, 3]);
        let b = pcm_checksum(&[1, 2, 3]);
        let c = pcm_checksum(&[1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn empty_checksum_is_sha256_of_nothing() {
        assert_eq!(
            pcm_checksum(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn wav_bytes_follow_recording_format() {
        let recording = Recording::new(vec![5; 10], &actual(44100, 2), vec![], StreamDiagnostics::default());
        let wav = recording.to_wav_bytes();
        assert_eq!(wav.len(), 44 + 20);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 2);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 44100);
    }

    #[test]
    fn metadata_serializes_modes() {
        let recording = Recording::new(
            vec![1, 2],
            &actual(16000, 1),
            vec![ProcessingMode::Bypass, ProcessingMode::amplify(2.0)],
            StreamDiagnostics::default(),
        );
        let json = recording.metadata.to_json().unwrap();
        let parsed: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, recording.metadata);
        assert!(json.contains("\"amplify\""));
    }

    #[test]
    fn stereo_export_pairs_reference_with_mic() {
        let recording = Recording::new(vec![10, 20, 30], &actual(8000, 1), vec![], StreamDiagnostics::default())
            .with_reference(vec![1, 2, 3, 4], 8000);

        assert_eq!(recording.to_stereo_with_reference(), Some(vec![1, 10, 2, 20, 3, 30]));
        let wav = recording.to_stereo_wav_bytes().unwrap();
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 2);
        assert_eq!(wav.len(), 44 + 12);
        assert_eq!(recording.metadata.reference_checksum, Some(pcm_checksum(&[1, 2, 3, 4])));
    }

    #[test]
    fn stereo_export_needs_matching_rates() {
        let plain = Recording::new(vec![1; 4], &actual(8000, 1), vec![], StreamDiagnostics::default());
        assert!(plain.to_stereo_with_reference().is_none());

        let mismatched = plain.clone().with_reference(vec![1; 4], 48000);
        assert!(mismatched.to_stereo_with_reference().is_none());
    }
}
