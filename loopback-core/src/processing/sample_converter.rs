/// Streaming linear-interpolation resampler between a device rate and the
/// loopback rate.
///
/// Device callbacks deliver audio in blocks whose length is rarely a whole
/// multiple of the rate ratio. The converter carries its fractional read
/// position and any unconsumed input across calls, so the output of many
/// blocks is the same as resampling their concatenation: over `n` input
/// samples it emits `n * to_rate / from_rate` samples, within one.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    /// Input samples advanced per output sample (`from_rate / to_rate`).
    step: f64,
    /// Read position inside `pending`, in input samples.
    position: f64,
    pending: Vec<f32>,
}

impl SampleConverter {
    pub fn new(from_rate: f64, to_rate: f64) -> Self {
        Self {
            step: from_rate / to_rate,
            position: 0.0,
            pending: Vec::new(),
        }
    }

    /// Input samples that must still be supplied before `output_frames`
    /// more samples can be produced.
    pub fn input_needed(&self, output_frames: usize) -> usize {
        if output_frames == 0 {
            return 0;
        }
        let last = self.position + (output_frames - 1) as f64 * self.step;
        let required = last.floor() as usize + 2;
        required.saturating_sub(self.pending.len())
    }

    /// Append `input` and push up to `max_output` resampled samples onto `out`.
    ///
    /// Returns the number of samples produced. Input that cannot be used yet
    /// is kept for the next call.
    pub fn process(&mut self, input: &[f32], max_output: usize, out: &mut Vec<f32>) -> usize {
        self.pending.extend_from_slice(input);

        let mut produced = 0;
        while produced < max_output {
            // Same expression as `input_needed`, so both agree on the last index.
            let at = self.position + produced as f64 * self.step;
            let index = at as usize;
            if index + 1 >= self.pending.len() {
                break;
            }
            let fraction = (at - index as f64) as f32;
            out.push(self.pending[index] * (1.0 - fraction) + self.pending[index + 1] * fraction);
            produced += 1;
        }
        self.position += produced as f64 * self.step;

        let consumed = (self.position as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.position -= consumed as f64;
        produced
    }

    /// Drop carried input and restart at position zero.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.pending.clear();
    }
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
///
/// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
pub fn to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Convert 16-bit little-endian PCM bytes to f32 samples.
///
/// A trailing odd byte is ignored.
pub fn from_pcm16_bytes(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Duplicate mono samples into `channels` interleaved channels.
pub fn upmix_from_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() * channels);
    for &sample in samples {
        out.extend(std::iter::repeat(sample).take(channels));
    }
    out
}

/// Reduce 16-bit PCM bytes to signed 8-bit waveform samples (high byte).
pub fn pcm16_to_waveform(data: &[u8]) -> Vec<i8> {
    data.chunks_exact(2)
        .map(|pair| (i16::from_le_bytes([pair[0], pair[1]]) >> 8) as i8)
        .collect()
}
