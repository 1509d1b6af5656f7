//! Gain stage - per-source volume control.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};

/// Lowest accepted gain (silence).
pub const MIN_GAIN: f32 = 0.0;
/// Highest accepted gain (double amplitude). Linear, not decibels.
pub const MAX_GAIN: f32 = 2.0;

/// Shared gain parameter, stored as `f32` bits in an atomic.
///
/// The control thread stores a new target at any time; the gain stage loads
/// it once per processed block. Writes are clamped into `[MIN_GAIN, MAX_GAIN]`
/// and can never be torn or lost.
#[derive(Debug)]
pub struct GainControl {
    bits: AtomicU32,
}

impl GainControl {
    pub fn new(gain: f32) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU32::new(gain.clamp(MIN_GAIN, MAX_GAIN).to_bits()),
        })
    }

    pub fn set(&self, gain: f32) {
        self.bits
            .store(gain.clamp(MIN_GAIN, MAX_GAIN).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A gain stage that passes audio through with amplitude scaling.
///
/// Each input channel maps to the corresponding output channel; a mono input
/// feeds every output. Gain changes are smoothed over a few milliseconds to
/// prevent clicks. With no input connected the stage emits silence.
pub struct GainStage {
    control: Arc<GainControl>,
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, closer to 1.0 = slower)
    smooth_coeff: f32,
}

impl GainStage {
    pub fn new(control: Arc<GainControl>) -> Self {
        let gain = control.get();
        Self {
            control,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
        }
    }

    /// Disable smoothing for instant gain changes.
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.control.get()
    }
}

impl AudioNode for GainStage {
    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]) {
        let target = self.control.get();

        let in_buffers = inputs.first().map(Input::buffers).unwrap_or(&[]);
        if in_buffers.is_empty() {
            // unbound slot: silence, and the smoother tracks the target so a
            // later attach does not replay a stale ramp
            self.smoothed_gain = target;
            for buffer in outputs.iter_mut() {
                buffer.iter_mut().for_each(|s| *s = 0.0);
            }
            return;
        }

        let smooth_coeff = self.smooth_coeff;
        let mut current_gain = self.smoothed_gain;

        for (ch, out_buffer) in outputs.iter_mut().enumerate() {
            let in_buffer = in_buffers.get(ch).unwrap_or_else(|| in_buffers.last().unwrap());

            // channels track the same gain ramp
            let mut gain = current_gain;
            for (out_sample, &in_sample) in out_buffer.iter_mut().zip(in_buffer.iter()) {
                gain = target + smooth_coeff * (gain - target);
                *out_sample = in_sample * gain;
            }

            if ch == 0 {
                current_gain = gain;
            }
        }

        self.smoothed_gain = current_gain;
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        2
    }
}
