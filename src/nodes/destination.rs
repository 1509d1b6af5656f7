//! Destination sink - sums its inputs and feeds the mixed output stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext, BLOCK_LEN};
use crate::stream::TrackWriter;

/// Channel count of the mixed output. Mono inputs are upmixed to both
/// channels; channels beyond two are ignored upstream.
pub const MIX_CHANNELS: usize = 2;

/// Sums every connected input into a stereo frame stream and pushes the
/// interleaved result into the mixed-output pipe.
///
/// When the consumer side lags and the pipe has no room for a full block,
/// the whole block is skipped - never a partial frame - and the dropped
/// counter is incremented.
pub struct DestinationSink {
    writer: TrackWriter,
    dropped_blocks: Arc<AtomicU64>,
    mix: [[f32; BLOCK_LEN]; MIX_CHANNELS],
    interleaved: [f32; BLOCK_LEN * MIX_CHANNELS],
}

impl DestinationSink {
    pub fn new(writer: TrackWriter) -> Self {
        Self {
            writer,
            dropped_blocks: Arc::new(AtomicU64::new(0)),
            mix: [[0.0; BLOCK_LEN]; MIX_CHANNELS],
            interleaved: [0.0; BLOCK_LEN * MIX_CHANNELS],
        }
    }

    /// Shared counter of blocks skipped because the consumer lagged.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.dropped_blocks.clone()
    }
}

impl AudioNode for DestinationSink {
    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Input], _outputs: &mut [Buffer]) {
        for channel in self.mix.iter_mut() {
            channel.iter_mut().for_each(|s| *s = 0.0);
        }

        for input in inputs {
            let in_buffers = input.buffers();
            if in_buffers.is_empty() {
                continue;
            }
            for (out_ch, out) in self.mix.iter_mut().enumerate() {
                let in_ch = if in_buffers.len() == 1 {
                    0 // mono input: both sides of the stereo field
                } else {
                    out_ch.min(in_buffers.len() - 1)
                };
                let in_buffer = &in_buffers[in_ch];
                for (out_sample, &in_sample) in out.iter_mut().zip(in_buffer.iter()) {
                    *out_sample += in_sample;
                }
            }
        }

        if self.writer.space() < BLOCK_LEN * MIX_CHANNELS {
            self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for i in 0..BLOCK_LEN {
            for ch in 0..MIX_CHANNELS {
                self.interleaved[i * MIX_CHANNELS + ch] = self.mix[ch][i];
            }
        }
        let _ = self.writer.write(&self.interleaved);
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioGraph;
    use crate::stream::AudioTrack;
    use crate::test_util::ConstSource;

    fn read_all(track: &AudioTrack) -> Vec<f32> {
        let mut reader = track.take_reader().unwrap();
        let mut out = vec![0.0f32; reader.available()];
        reader.read(&mut out);
        out
    }

    #[test]
    fn sums_stereo_inputs() {
        let (writer, track) = AudioTrack::pipe(2, 1024);
        let mut graph = AudioGraph::new(48_000);
        let a = graph.add(ConstSource::new(0.25, 2));
        let b = graph.add(ConstSource::new(0.5, 2));
        let dest = graph.add(DestinationSink::new(writer));
        graph.connect(a, dest);
        graph.connect(b, dest);
        graph.set_terminal(dest);

        graph.process();

        let mixed = read_all(&track);
        assert_eq!(mixed.len(), 128);
        assert!(mixed.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn mono_input_reaches_both_channels() {
        let (writer, track) = AudioTrack::pipe(2, 1024);
        let mut graph = AudioGraph::new(48_000);
        let a = graph.add(ConstSource::new(0.5, 1));
        let dest = graph.add(DestinationSink::new(writer));
        graph.connect(a, dest);
        graph.set_terminal(dest);

        graph.process();

        let mixed = read_all(&track);
        assert!(mixed.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn no_inputs_yields_clocked_silence() {
        let (writer, track) = AudioTrack::pipe(2, 1024);
        let mut graph = AudioGraph::new(48_000);
        let dest = graph.add(DestinationSink::new(writer));
        graph.set_terminal(dest);

        graph.process();

        let mixed = read_all(&track);
        assert_eq!(mixed.len(), 128);
        assert!(mixed.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn full_pipe_skips_whole_blocks() {
        // room for exactly one block of stereo frames
        let (writer, track) = AudioTrack::pipe(2, BLOCK_LEN);
        let mut graph = AudioGraph::new(48_000);
        let a = graph.add(ConstSource::new(0.5, 2));
        let dest_node = DestinationSink::new(writer);
        let dropped = dest_node.drop_counter();
        let dest = graph.add(dest_node);
        graph.connect(a, dest);
        graph.set_terminal(dest);

        graph.process();
        graph.process();
        graph.process();

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(read_all(&track).len(), 128);
    }
}
