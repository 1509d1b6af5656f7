//! Source node bridging an external track into the graph.

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::stream::TrackReader;

/// Reads interleaved samples from a track pipe and deinterleaves them into
/// per-channel block buffers.
///
/// Only whole frames are consumed, so channels never go out of step. A
/// starved pipe yields silence for the remainder of the block; a live
/// capture picks up again on a later block.
pub struct StreamSource {
    reader: TrackReader,
    channels: usize,
}

impl StreamSource {
    pub fn new(reader: TrackReader) -> Self {
        let channels = reader.channels();
        Self { reader, channels }
    }
}

impl AudioNode for StreamSource {
    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Input], outputs: &mut [Buffer]) {
        if outputs.is_empty() {
            return;
        }

        let buffer_len = outputs[0].len();
        for i in 0..buffer_len {
            if self.reader.available() < self.channels {
                // underrun: silence out the rest of the block
                for buffer in outputs.iter_mut() {
                    for j in i..buffer_len {
                        buffer[j] = 0.0;
                    }
                }
                return;
            }

            for ch in 0..self.channels {
                let sample = self.reader.pop().unwrap_or(0.0);
                if let Some(buffer) = outputs.get_mut(ch) {
                    buffer[i] = sample;
                }
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        0
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
