//! Host config selection and sample conversion shared by input and output.

use cpal::{SampleFormat as HostFormat, SupportedBufferSize, SupportedStreamConfigRange};

/// A supported config range reduced to the fields negotiation looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RangeCandidate {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    pub buffer: Option<(u32, u32)>,
    pub format: HostFormat,
}

impl From<&SupportedStreamConfigRange> for RangeCandidate {
    fn from(range: &SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            buffer: match range.buffer_size() {
                SupportedBufferSize::Range { min, max } => Some((*min, *max)),
                SupportedBufferSize::Unknown => None,
            },
            format: range.sample_format(),
        }
    }
}

/// Preference among the formats we can convert; `None` for the rest.
fn format_rank(format: HostFormat) -> Option<u8> {
    match format {
        HostFormat::I16 => Some(0),
        HostFormat::F32 => Some(1),
        HostFormat::U16 => Some(2),
        _ => None,
    }
}

/// Pick the range and rate closest to the request.
///
/// Rate distance decides first, then channel distance, then format
/// (i16, f32, u16). A channel mismatch never disqualifies a range: the
/// stream is opened at the device's count and remapped per block.
pub(crate) fn pick_range(ranges: &[RangeCandidate], sample_rate: u32, channels: u16) -> Option<(RangeCandidate, u32)> {
    ranges
        .iter()
        .filter_map(|r| format_rank(r.format).map(|rank| (r, rank)))
        .map(|(r, rank)| {
            let rate = sample_rate.clamp(r.min_rate, r.max_rate.max(r.min_rate));
            let key = (rate.abs_diff(sample_rate), r.channels.abs_diff(channels), rank);
            (key, *r, rate)
        })
        .min_by_key(|(key, _, _)| *key)
        .map(|(_, r, rate)| (r, rate))
}

/// Fixed buffer frames clamped into the range, if the host reports one.
pub(crate) fn clamp_frames(candidate: &RangeCandidate, requested: u32) -> Option<u32> {
    candidate.buffer.map(|(min, max)| requested.clamp(min, max.max(min)))
}

/// Remap interleaved frames from `from` channels to `to` channels.
///
/// Mono output averages every device channel. Otherwise channels are taken
/// in order and the last one is repeated when the source has fewer.
pub fn remap_channels(input: &[i16], from: usize, to: usize, out: &mut Vec<i16>) {
    out.clear();
    let (from, to) = (from.max(1), to.max(1));
    if from == to {
        out.extend_from_slice(input);
        return;
    }
    for frame in input.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / from as i32) as i16);
        } else {
            out.extend((0..to).map(|c| frame[c.min(from - 1)]));
        }
    }
}

/// Convert a normalized float sample to i16, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Offset-binary u16 to signed i16.
pub fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

pub fn i16_to_u16(sample: i16) -> u16 {
    (sample as i32 + 32768) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(channels: u16, min: u32, max: u32, format: HostFormat) -> RangeCandidate {
        RangeCandidate {
            channels,
            min_rate: min,
            max_rate: max,
            buffer: Some((16, 4096)),
            format,
        }
    }

    impl RangeCandidate {
        fn with_buffer(self, min: u32, max: u32) -> Self {
            Self {
                buffer: Some((min, max)),
                ..self
            }
        }
    }

    #[test]
    fn candidate_from_host_range() {
        let host = SupportedStreamConfigRange::new(
            2,
            cpal::SampleRate(44100),
            cpal::SampleRate(48000),
            SupportedBufferSize::Range { min: 64, max: 2048 },
            HostFormat::F32,
        );
        let candidate = RangeCandidate::from(&host);
        assert_eq!(candidate, range(2, 44100, 48000, HostFormat::F32).with_buffer(64, 2048));

        let unknown = SupportedStreamConfigRange::new(
            1,
            cpal::SampleRate(16000),
            cpal::SampleRate(16000),
            SupportedBufferSize::Unknown,
            HostFormat::I16,
        );
        assert_eq!(RangeCandidate::from(&unknown).buffer, None);
    }

    #[test]
    fn pick_range_keeps_supported_rate() {
        let ranges = [range(1, 8000, 48000, HostFormat::F32)];
        let (picked, rate) = pick_range(&ranges, 16000, 1).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(picked.format, HostFormat::F32);
    }

    #[test]
    fn pick_range_coerces_to_nearest_rate() {
        let ranges = [
            range(1, 44100, 44100, HostFormat::I16),
            range(1, 48000, 48000, HostFormat::I16),
        ];
        let (_, rate) = pick_range(&ranges, 47000, 1).unwrap();
        assert_eq!(rate, 48000);
    }

    #[test]
    fn pick_range_prefers_i16_on_tie() {
        let ranges = [
            range(1, 16000, 16000, HostFormat::F32),
            range(1, 16000, 16000, HostFormat::I16),
        ];
        let (picked, _) = pick_range(&ranges, 16000, 1).unwrap();
        assert_eq!(picked.format, HostFormat::I16);
    }

    #[test]
    fn mono_request_falls_back_to_stereo_mix_format() {
        // Typical shared-mode endpoint: only the stereo float mix format.
        let ranges = [range(2, 48000, 48000, HostFormat::F32)];
        let (picked, rate) = pick_range(&ranges, 16000, 1).unwrap();
        assert_eq!(picked.channels, 2);
        assert_eq!(rate, 48000);
    }

    #[test]
    fn pick_range_prefers_matching_channels_at_equal_rate() {
        let ranges = [
            range(2, 16000, 16000, HostFormat::I16),
            range(1, 16000, 16000, HostFormat::F32),
        ];
        let (picked, _) = pick_range(&ranges, 16000, 1).unwrap();
        assert_eq!(picked.channels, 1);
    }

    #[test]
    fn pick_range_accepts_u16_and_skips_unknown_formats() {
        let ranges = [
            range(1, 16000, 16000, HostFormat::U8),
            range(1, 16000, 16000, HostFormat::U16),
        ];
        let (picked, _) = pick_range(&ranges, 16000, 1).unwrap();
        assert_eq!(picked.format, HostFormat::U16);

        assert!(pick_range(&[range(1, 16000, 16000, HostFormat::U8)], 16000, 1).is_none());
    }

    #[test]
    fn clamp_frames_follows_reported_range() {
        let candidate = range(1, 16000, 16000, HostFormat::I16);
        assert_eq!(clamp_frames(&candidate, 4), Some(16));
        assert_eq!(clamp_frames(&candidate, 48), Some(48));

        let unknown = RangeCandidate { buffer: None, ..candidate };
        assert_eq!(clamp_frames(&unknown, 48), None);
    }

    #[test]
    fn remap_downmixes_and_duplicates() {
        let mut out = Vec::new();
        remap_channels(&[100, 300, -200, -400], 2, 1, &mut out);
        assert_eq!(out, vec![200, -300]);

        remap_channels(&[1, 2], 1, 2, &mut out);
        assert_eq!(out, vec![1, 1, 2, 2]);

        remap_channels(&[1, 2, 3, 4, 5, 6], 3, 2, &mut out);
        assert_eq!(out, vec![1, 2, 4, 5]);

        remap_channels(&[7, 8], 1, 1, &mut out);
        assert_eq!(out, vec![7, 8]);
    }

    #[test]
    fn f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(-3.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.5), 16384);
    }

    #[test]
    fn u16_offset_binary_conversion() {
        assert_eq!(u16_to_i16(32768), 0);
        assert_eq!(u16_to_i16(0), i16::MIN);
        assert_eq!(u16_to_i16(u16::MAX), i16::MAX);
        assert_eq!(i16_to_u16(i16::MIN), 0);
        assert_eq!(i16_to_u16(0), 32768);
        assert_eq!(i16_to_f32(i16::MAX), 1.0);
    }
}
