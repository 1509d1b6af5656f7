//! Core node trait and context types.

use dasp_graph::{Buffer, Input};

/// Samples per processed block (the `dasp_graph` buffer length).
pub(crate) const BLOCK_LEN: usize = 64;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call. Contains the graph's sample
/// rate and the buffer size (always 64 samples in the current implementation).
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer
    pub buffer_size: usize,
}

/// Unique identifier for a node within a graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The core trait for audio processing nodes.
///
/// Nodes come in three shapes:
/// - **Sources**: generate audio (0 inputs, 1+ outputs) - stream bridges
/// - **Effects**: process audio (1+ inputs, 1+ outputs) - gain stages
/// - **Sinks**: consume audio (1+ inputs, 0 outputs) - the mixed-output destination
///
/// Runtime parameters are shared atomics read once per block, never locks;
/// `process` runs on the engine thread and must not block or allocate.
///
/// ```
/// use duomix::{AudioNode, ProcessContext};
/// use dasp_graph::{Buffer, Input};
///
/// struct Silence;
///
/// impl AudioNode for Silence {
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         _inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         for buffer in outputs.iter_mut() {
///             buffer.iter_mut().for_each(|s| *s = 0.0);
///         }
///     }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Process one block of audio.
    ///
    /// Called once per block on the engine thread. Read from `inputs`
    /// (one entry per connected upstream node), write to `outputs`.
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]);

    /// Number of audio input channels (0 for sources).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of audio output channels.
    fn num_outputs(&self) -> usize {
        1
    }
}
