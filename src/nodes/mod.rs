//! Built-in audio nodes.
//!
//! Nodes are organized into three categories:
//! - [`StreamSource`] - bridges an external track into the graph (source)
//! - [`GainStage`] - per-source volume control (effect)
//! - [`DestinationSink`] - sums inputs into the mixed-output stream (sink)
//!
//! Runtime parameters travel through shared atomics ([`GainControl`]), never
//! through the nodes themselves once they are owned by the engine.

pub mod destination;
pub mod gain;
pub mod stream_source;

pub use destination::{DestinationSink, MIX_CHANNELS};
pub use gain::{GainControl, GainStage, MAX_GAIN, MIN_GAIN};
pub use stream_source::StreamSource;
