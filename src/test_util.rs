//! Shared helpers for in-crate node tests.

use std::sync::Arc;

use dasp_graph::{Buffer, Input};
use parking_lot::Mutex;

use crate::node::{AudioNode, ProcessContext};

/// Emits a constant sample value on every channel.
pub(crate) struct ConstSource {
    value: f32,
    channels: usize,
}

impl ConstSource {
    pub(crate) fn new(value: f32, channels: usize) -> Self {
        Self { value, channels }
    }
}

impl AudioNode for ConstSource {
    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Input], outputs: &mut [Buffer]) {
        for buffer in outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = self.value);
        }
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}

/// Appends everything it receives to a shared per-channel capture.
pub(crate) struct CaptureSink {
    channels: usize,
    captured: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl CaptureSink {
    pub(crate) fn new(channels: usize) -> (Self, Arc<Mutex<Vec<Vec<f32>>>>) {
        let captured = Arc::new(Mutex::new(vec![Vec::new(); channels]));
        (
            Self {
                channels,
                captured: captured.clone(),
            },
            captured,
        )
    }
}

impl AudioNode for CaptureSink {
    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Input], _outputs: &mut [Buffer]) {
        let buffers = match inputs.first() {
            Some(input) if !input.buffers().is_empty() => input.buffers(),
            _ => return,
        };
        let mut captured = self.captured.lock();
        for ch in 0..self.channels {
            let source = buffers.get(ch).unwrap_or_else(|| buffers.last().unwrap());
            captured[ch].extend_from_slice(&source[..]);
        }
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }
}
