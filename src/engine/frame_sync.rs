//! GBA frame synchronization
//!
//! Envelopes and LFOs advance once per GBA VBlank (~59.7275 Hz). The output
//! sample rate is rarely an integer multiple of that, so the boundary is
//! tracked with a fractional accumulator.

/// GBA VBlank frequency in Hz.
pub const GBA_FRAME_HZ: f64 = 59.7275;

/// Tracks ~59.7275 Hz frame boundaries within an audio-rate sample stream.
#[derive(Debug, Clone)]
pub struct FrameSync {
    sample_rate: u32,
    /// Fractional sample accumulator within the current frame
    counter: f64,
    /// Total frames elapsed since reset
    frame_count: u64,
}

impl FrameSync {
    /// Create a synchronizer for the given output sample rate.
    pub fn new(sample_rate: u32) -> Self {
        FrameSync {
            sample_rate,
            counter: 0.0,
            frame_count: 0,
        }
    }

    /// Samples per GBA frame at the current rate (fractional).
    pub fn samples_per_frame(&self) -> f64 {
        self.sample_rate as f64 / GBA_FRAME_HZ
    }

    /// Clock the synchronizer by one output sample.
    /// Returns true when a frame boundary is crossed.
    pub fn clock(&mut self) -> bool {
        self.counter += 1.0;
        if self.counter >= self.samples_per_frame() {
            self.counter -= self.samples_per_frame();
            self.frame_count += 1;
            true
        } else {
            false
        }
    }

    /// Total frames elapsed since the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Change the sample rate. The accumulator is deliberately not reset;
    /// the next boundary may land up to one frame early or late.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Reset the accumulator and frame counter.
    pub fn reset(&mut self) {
        self.counter = 0.0;
        self.frame_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate() {
        let mut sync = FrameSync::new(44_100);
        let mut frames = 0u64;
        for _ in 0..44_100 {
            if sync.clock() {
                frames += 1;
            }
        }
        // One second of samples crosses ~59.7 frame boundaries
        assert!(frames == 59 || frames == 60, "got {} frames", frames);
        assert_eq!(sync.frame_count(), frames);
    }

    #[test]
    fn test_first_boundary_position() {
        let mut sync = FrameSync::new(44_100);
        let expected = (44_100.0 / GBA_FRAME_HZ).ceil() as u32;
        let mut ticks = 0u32;
        loop {
            ticks += 1;
            if sync.clock() {
                break;
            }
        }
        assert_eq!(ticks, expected);
    }

    #[test]
    fn test_rate_change_keeps_accumulator() {
        let mut sync = FrameSync::new(44_100);
        for _ in 0..100 {
            sync.clock();
        }
        sync.set_sample_rate(22_050);
        // No panic, boundaries keep arriving at the new cadence
        let mut frames = 0;
        for _ in 0..22_050 {
            if sync.clock() {
                frames += 1;
            }
        }
        assert!(frames == 59 || frames == 60);
    }

    #[test]
    fn test_reset() {
        let mut sync = FrameSync::new(48_000);
        for _ in 0..10_000 {
            sync.clock();
        }
        sync.reset();
        assert_eq!(sync.frame_count(), 0);
    }
}
