/*!
Streaming linear resampler for interleaved f32 audio.

The output device rarely runs at the rate of a dictation recording (8 or
22.05 kHz files are common), so the sink converts every block it is handed
before queueing it. State carries across calls, so consecutive blocks join
without clicks.
*/

#[derive(Debug, Clone)]
pub struct LinearResampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
    /// Source frames advanced per output frame
    step: f64,
    /// Read position in source frames, relative to `prev_frame`
    pos: f64,
    prev_frame: Vec<f32>,
    work: Vec<f32>,
}

impl LinearResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        let step = if dst_rate == 0 { 0.0 } else { src_rate as f64 / dst_rate as f64 };
        Self {
            src_rate,
            dst_rate,
            channels,
            step,
            pos: 0.0,
            prev_frame: Vec::new(),
            work: Vec::new(),
        }
    }

    /// Forget stream history, e.g. after the queue was flushed by a seek
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev_frame.clear();
    }

    pub fn is_passthrough(&self) -> bool {
        self.src_rate == self.dst_rate
    }

    /// Output frames produced for `frames` input frames, give or take one
    pub fn output_frames(&self, frames: usize) -> usize {
        if self.src_rate == 0 {
            return 0;
        }
        (frames as u64 * self.dst_rate as u64 / self.src_rate as u64) as usize
    }

    /// Input frames that fit into `frames` output frames
    pub fn input_frames(&self, frames: usize) -> usize {
        if self.dst_rate == 0 {
            return 0;
        }
        (frames as u64 * self.src_rate as u64 / self.dst_rate as u64) as usize
    }

    /// Resample `input` and append the result to `out`
    pub fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        if ch == 0 || self.src_rate == 0 || self.dst_rate == 0 {
            return;
        }
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }

        let in_frames = input.len() / ch;
        if in_frames == 0 {
            return;
        }

        // [previous last frame, input...] so interpolation spans block edges
        self.work.clear();
        if self.prev_frame.len() == ch {
            self.work.extend_from_slice(&self.prev_frame);
        } else {
            self.work.extend(std::iter::repeat(0.0).take(ch));
        }
        self.work.extend_from_slice(&input[..in_frames * ch]);
        let total_frames = self.work.len() / ch;

        out.reserve(self.output_frames(in_frames) * ch + ch);
        while self.pos + 1.0 <= (total_frames - 1) as f64 {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let (a, b) = (i * ch, (i + 1) * ch);
            out.extend((0..ch).map(|c| {
                let s0 = self.work[a + c];
                s0 + (self.work[b + c] - s0) * frac
            }));
            self.pos += self.step;
        }

        let last = (total_frames - 1) * ch;
        self.prev_frame.clear();
        self.prev_frame.extend_from_slice(&self.work[last..last + ch]);
        self.pos = (self.pos - (total_frames - 1) as f64).max(0.0);
    }
}
