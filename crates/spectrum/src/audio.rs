//! Beeper: speaker + EAR mixing down to PCM samples.
//!
//! The Spectrum's audio is a 1-bit speaker (bit 4 of port $FE) with the
//! tape EAR level leaking in at lower volume. During a frame the beeper
//! records (T-state, level) transitions; at frame end the transitions are
//! integrated over each sample's T-state window, so output stays clean even
//! when the speaker toggles faster than the sample rate.

#![allow(clippy::cast_precision_loss)] // T-state windows fit f32 comfortably.

use zx_z80::TState;

use crate::memory::FRAME_TSTATES;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples per 50 Hz frame.
pub const SAMPLES_PER_FRAME: usize = 882;

/// T-states per output sample.
const TSTATES_PER_SAMPLE: f32 = FRAME_TSTATES as f32 / SAMPLES_PER_FRAME as f32;

/// Output amplitude scale.
const AMPLITUDE: f32 = 0.5;

/// Mix weights for the four speaker/EAR level combinations
/// (bit 0 = EAR, bit 1 = speaker).
const LEVELS: [f32; 4] = [0.0, 0.25, 0.85, 1.0];

/// Beeper state: level transitions for the current frame and the rendered
/// sample backlog the host drains.
pub struct Beeper {
    /// (T-state, level index) transitions recorded this frame.
    transitions: Vec<(TState, u8)>,
    level: u8,
    /// Level in force at T-state 0 of the current frame.
    frame_start_level: u8,
    samples: Vec<f32>,
}

impl Beeper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transitions: Vec::with_capacity(1024),
            level: 0,
            frame_start_level: 0,
            samples: Vec::new(),
        }
    }

    /// Record a speaker line change at T-state `t`.
    pub fn set_speaker(&mut self, on: bool, t: TState) {
        self.set_level((self.level & 0x01) | (u8::from(on) << 1), t);
    }

    /// Record an EAR level change at T-state `t`.
    pub fn set_ear(&mut self, on: bool, t: TState) {
        self.set_level((self.level & 0x02) | u8::from(on), t);
    }

    fn set_level(&mut self, level: u8, t: TState) {
        if level != self.level {
            self.transitions.push((t.clamp(0, FRAME_TSTATES - 1), level));
            self.level = level;
        }
    }

    /// Render the frame's transitions into `SAMPLES_PER_FRAME` samples and
    /// append them to the backlog. The current level carries into the next
    /// frame.
    pub fn end_frame(&mut self) {
        let mut index = 0;
        let mut level = self.frame_start_level;

        for sample in 0..SAMPLES_PER_FRAME {
            let t_start = sample as f32 * TSTATES_PER_SAMPLE;
            let t_end = t_start + TSTATES_PER_SAMPLE;

            let mut weighted = 0.0f32;
            let mut t_pos = t_start;

            while index < self.transitions.len() {
                let (trans_t, new_level) = self.transitions[index];
                let trans_t = trans_t as f32;
                if trans_t >= t_end {
                    break;
                }
                if trans_t > t_pos {
                    weighted += LEVELS[level as usize] * (trans_t - t_pos);
                    t_pos = trans_t;
                }
                level = new_level;
                index += 1;
            }
            weighted += LEVELS[level as usize] * (t_end - t_pos);

            let ratio = weighted / TSTATES_PER_SAMPLE;
            self.samples.push((ratio * 2.0 - 1.0) * AMPLITUDE);
        }

        self.transitions.clear();
        self.frame_start_level = self.level;
    }

    /// Drain the rendered samples.
    #[must_use]
    pub fn take_samples(&mut self) -> Vec<f32> {
        core::mem::take(&mut self.samples)
    }

    /// Drop any recorded transitions and samples (machine reset).
    pub fn reset(&mut self) {
        self.transitions.clear();
        self.samples.clear();
        self.level = 0;
        self.frame_start_level = 0;
    }
}

impl Default for Beeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_frame_renders_floor() {
        let mut beeper = Beeper::new();
        beeper.end_frame();
        let samples = beeper.take_samples();
        assert_eq!(samples.len(), SAMPLES_PER_FRAME);
        for sample in samples {
            assert!((sample - (-AMPLITUDE)).abs() < 0.001);
        }
    }

    #[test]
    fn speaker_high_all_frame_renders_ceiling() {
        let mut beeper = Beeper::new();
        beeper.set_speaker(true, 0);
        beeper.end_frame();
        let samples = beeper.take_samples();
        // Level 2 (speaker only) weighs 0.85.
        let expected = (LEVELS[2] * 2.0 - 1.0) * AMPLITUDE;
        assert!((samples[SAMPLES_PER_FRAME / 2] - expected).abs() < 0.01);
    }

    #[test]
    fn mid_frame_transition_splits_output() {
        let mut beeper = Beeper::new();
        beeper.set_speaker(true, FRAME_TSTATES / 2);
        beeper.end_frame();
        let samples = beeper.take_samples();
        assert!(samples[10] < 0.0);
        assert!(samples[SAMPLES_PER_FRAME - 10] > 0.0);
    }

    #[test]
    fn level_carries_across_frames() {
        let mut beeper = Beeper::new();
        beeper.set_speaker(true, 1000);
        beeper.end_frame();
        beeper.take_samples();

        // No transitions this frame; the speaker is still up.
        beeper.end_frame();
        let samples = beeper.take_samples();
        assert!(samples[0] > 0.0);
    }

    #[test]
    fn ear_mixes_below_speaker() {
        let mut beeper = Beeper::new();
        beeper.set_ear(true, 0);
        beeper.end_frame();
        let ear_only = beeper.take_samples()[100];

        beeper.reset();
        beeper.set_speaker(true, 0);
        beeper.end_frame();
        let speaker_only = beeper.take_samples()[100];

        assert!(ear_only < speaker_only);
        assert!(ear_only > -AMPLITUDE);
    }
}
