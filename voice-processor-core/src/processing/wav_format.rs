//! WAV container encoding for captured PCM.
//!
//! Generates the canonical 44-byte RIFF header consumed by the export
//! collaborator. The core never touches the filesystem; callers write the
//! bytes wherever they need them.

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Serialize 16-bit samples as little-endian PCM bytes.
pub fn encode_pcm16_le(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Header plus little-endian 16-bit payload, ready to be written as a `.wav`.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data = encode_pcm16_le(samples);
    let header = generate_wav_header(sample_rate, 16, channels, data.len() as u32);

    let mut wav = Vec::with_capacity(WAV_HEADER_SIZE + data.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(&data);
    wav
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Interleave two mono tracks into stereo frames, left first.
///
/// The longer track is truncated to the shorter one.
pub fn interleave_pair(left: &[i16], right: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(left.len().min(right.len()) * 2);
    for (&l, &r) in left.iter().zip(right) {
        out.push(l);
        out.push(r);
    }
    out
}
