//! Dual-source audio mixer for capture pipelines.
//!
//! `duomix` combines two externally captured live audio streams - a
//! microphone and system audio - into one mixed output stream for a
//! downstream recorder or encoder. It does not capture, encode, or store
//! audio itself.
//!
//! Design principles:
//! - The processing graph runs on a dedicated engine thread, paced by the
//!   audio device's clock (or the wall clock for offline contexts)
//! - Control-plane calls never block the real-time path: gains are shared
//!   atomic scalars, topology changes travel over lock-free ring buffers
//! - No locks and no allocation on the engine thread; nodes removed from
//!   the graph are freed by the control thread
//! - Audio enters and leaves through SPSC track pipes wrapped in opaque
//!   [`Stream`] handles
//!
//! # Example
//!
//! ```no_run
//! use duomix::{AudioTrack, Mixer, Stream};
//!
//! let mut mixer = Mixer::new().expect("no audio device");
//!
//! // the capture subsystem feeds the writer side of a track pipe
//! let (mut mic_writer, mic_track) = AudioTrack::pipe(1, 4800);
//! mixer.add_microphone_stream(Stream::new(vec![mic_track])).unwrap();
//! mixer.set_system_volume(0.5).unwrap();
//!
//! // the recorder takes the reader of the mixed stream
//! let mixed = mixer.mixed_stream().unwrap();
//! let mut reader = mixed.tracks()[0].take_reader().unwrap();
//! # let _ = (&mut mic_writer, &mut reader);
//!
//! mixer.dispose();
//! ```

pub mod nodes;

mod context;
mod engine;
mod error;
mod graph;
mod mixer;
mod node;
mod stream;

#[cfg(test)]
mod test_util;

pub use context::AudioGraphContext;
pub use error::MixerError;
pub use graph::AudioGraph;
pub use mixer::{Mixer, SourceSlot, DEFAULT_MICROPHONE_GAIN, DEFAULT_SYSTEM_GAIN};
pub use node::{AudioNode, NodeId, ProcessContext};
pub use stream::{AudioTrack, Stream, StreamId, TrackId, TrackReader, TrackWriter};
