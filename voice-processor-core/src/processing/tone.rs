use std::f32::consts::TAU;

/// Synthesizes input blocks for devices that have no microphone behind them.
pub trait SignalSource: Send {
    /// Fill an interleaved block; every channel of a frame gets the same value.
    fn fill(&mut self, block: &mut [i16], channels: usize);
}

/// Fixed-value source.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSource(pub i16);

impl SignalSource for ConstantSource {
    fn fill(&mut self, block: &mut [i16], _channels: usize) {
        block.fill(self.0);
    }
}

/// Test burst: 1 s of silence, 1.5 s of sine, then silence forever.
#[derive(Debug, Clone)]
pub struct ToneBurst {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    position: u64,
    lead_in: u64,
    tone_len: u64,
}

impl ToneBurst {
    pub fn new(sample_rate: u32, frequency: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude: 1.0,
            phase: 0.0,
            position: 0,
            lead_in: sample_rate as u64,
            tone_len: (sample_rate as f64 * 1.5) as u64,
        }
    }

    /// Scale the sine peak, 0.0–1.0 of full scale.
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Frames produced so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_in_tone(&self) -> bool {
        self.position >= self.lead_in && self.position < self.lead_in + self.tone_len
    }

    /// Next frame value.
    pub fn next_sample(&mut self) -> i16 {
        let value = if self.is_in_tone() {
            let s = (self.phase * TAU).sin();
            self.phase += self.frequency / self.sample_rate as f32;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            (s * self.amplitude * i16::MAX as f32) as i16
        } else {
            0
        };
        self.position += 1;
        value
    }
}

impl SignalSource for ToneBurst {
    fn fill(&mut self, block: &mut [i16], channels: usize) {
        for frame in block.chunks_mut(channels.max(1)) {
            let value = self.next_sample();
            frame.fill(value);
        }
    }
}
