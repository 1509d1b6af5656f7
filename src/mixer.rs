//! Mixer - orchestrates the dual-source graph.
//!
//! Owns the context, both gain stages, the optional per-slot source bindings
//! and the destination. Control-plane methods are state-checked against the
//! `Created -> Active -> Disposed` lifecycle; `Disposed` is terminal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::context::AudioGraphContext;
use crate::engine::{Engine, GraphCommand};
use crate::error::MixerError;
use crate::graph::AudioGraph;
use crate::node::AudioNode;
use crate::nodes::{DestinationSink, GainControl, GainStage, StreamSource, MIX_CHANNELS};
use crate::stream::{AudioTrack, Stream, StreamId};

/// Default microphone gain: voice passes through unchanged.
pub const DEFAULT_MICROPHONE_GAIN: f32 = 1.0;
/// Default system gain: system audio sits under the voice.
pub const DEFAULT_SYSTEM_GAIN: f32 = 0.7;

const COMMAND_QUEUE_SIZE: usize = 64;
const RETIRED_QUEUE_SIZE: usize = 16;

/// One of the two fixed source slots.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SourceSlot {
    Microphone,
    System,
}

impl SourceSlot {
    pub(crate) fn index(self) -> usize {
        match self {
            SourceSlot::Microphone => 0,
            SourceSlot::System => 1,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            SourceSlot::Microphone => "microphone",
            SourceSlot::System => "system",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Lifecycle {
    Created,
    Active,
    Disposed,
}

/// The connection from a bound stream to its slot.
struct SourceBinding {
    stream: StreamId,
    /// `false` when the stream carried no readable track: bound but silent.
    audible: bool,
}

/// Combines a microphone stream and a system-audio stream into one mixed
/// output stream, with independently adjustable gain per source.
///
/// Both gain stages are wired to the destination at construction and never
/// rewired; streams can be attached, replaced, and re-leveled at any time
/// while the engine renders. See the crate docs for a usage example.
pub struct Mixer {
    context: AudioGraphContext,
    state: Lifecycle,
    commands: Producer<GraphCommand>,
    retired: Consumer<Box<dyn AudioNode>>,
    gains: [Arc<GainControl>; 2],
    bindings: [Option<SourceBinding>; 2],
    mixed: Stream,
    dropped_blocks: Arc<AtomicU64>,
}

impl Mixer {
    /// Build a mixer clocked by the default audio device.
    pub fn new() -> Result<Self, MixerError> {
        Self::with_context(AudioGraphContext::acquire()?)
    }

    /// Build a mixer on an explicitly acquired context.
    pub fn with_context(mut context: AudioGraphContext) -> Result<Self, MixerError> {
        let sample_rate = context.sample_rate();
        let mut graph = AudioGraph::new(sample_rate);

        let microphone_control = GainControl::new(DEFAULT_MICROPHONE_GAIN);
        let system_control = GainControl::new(DEFAULT_SYSTEM_GAIN);
        let microphone_gain = graph.add(GainStage::new(microphone_control.clone()));
        let system_gain = graph.add(GainStage::new(system_control.clone()));

        // the destination's writer feeds the stream handle the downstream
        // recorder reads from; sized for about a second of headroom
        let (writer, mixed_track) = AudioTrack::pipe(MIX_CHANNELS, sample_rate as usize);
        let destination = DestinationSink::new(writer);
        let dropped_blocks = destination.drop_counter();
        let destination = graph.add(destination);

        // permanent wiring: gains into the destination, never touched again
        graph.connect(microphone_gain, destination);
        graph.connect(system_gain, destination);
        graph.set_terminal(destination);

        let (commands, command_rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
        let (retired_tx, retired) = RingBuffer::new(RETIRED_QUEUE_SIZE);
        let engine = Engine::new(graph, command_rx, retired_tx, microphone_gain, system_gain);
        context.start(engine)?;

        Ok(Self {
            context,
            state: Lifecycle::Created,
            commands,
            retired,
            gains: [microphone_control, system_control],
            bindings: [None, None],
            mixed: Stream::new(vec![mixed_track]),
            dropped_blocks,
        })
    }

    /// Attach (or replace) the microphone stream.
    pub fn add_microphone_stream(&mut self, stream: Stream) -> Result<(), MixerError> {
        self.attach(SourceSlot::Microphone, stream)
    }

    /// Attach (or replace) the system-audio stream.
    pub fn add_system_stream(&mut self, stream: Stream) -> Result<(), MixerError> {
        self.attach(SourceSlot::System, stream)
    }

    /// Set the microphone gain. Out-of-range values are clamped, not rejected.
    pub fn set_microphone_volume(&mut self, volume: f32) -> Result<(), MixerError> {
        self.set_volume(SourceSlot::Microphone, volume)
    }

    /// Set the system-audio gain. Out-of-range values are clamped, not rejected.
    pub fn set_system_volume(&mut self, volume: f32) -> Result<(), MixerError> {
        self.set_volume(SourceSlot::System, volume)
    }

    pub fn microphone_volume(&self) -> f32 {
        self.gains[SourceSlot::Microphone.index()].get()
    }

    pub fn system_volume(&self) -> f32 {
        self.gains[SourceSlot::System.index()].get()
    }

    /// Id of the stream currently bound to the microphone slot.
    pub fn microphone_binding(&self) -> Option<StreamId> {
        self.binding(SourceSlot::Microphone)
    }

    /// Id of the stream currently bound to the system slot.
    pub fn system_binding(&self) -> Option<StreamId> {
        self.binding(SourceSlot::System)
    }

    /// Whether the slot's bound stream actually carries audio. A stream with
    /// no readable track binds silently and reports `false` here.
    pub fn binding_is_audible(&self, slot: SourceSlot) -> bool {
        self.bindings[slot.index()]
            .as_ref()
            .map(|b| b.audible)
            .unwrap_or(false)
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    pub fn is_disposed(&self) -> bool {
        self.state == Lifecycle::Disposed
    }

    /// The mixed-output stream handle.
    ///
    /// Clones share the single mixed pipe; exactly one consumer may take its
    /// reader. Valid until [`dispose`](Self::dispose).
    pub fn mixed_stream(&self) -> Result<Stream, MixerError> {
        self.ensure_live()?;
        Ok(self.mixed.clone())
    }

    /// Tear the mixer down: sources detached, gains and destination released,
    /// context closed last. Safe to call any number of times; operations
    /// after the first call return [`MixerError::Disposed`].
    pub fn dispose(&mut self) {
        if self.state == Lifecycle::Disposed {
            return;
        }
        self.state = Lifecycle::Disposed;
        self.context.close();
        self.reap_retired();
        self.bindings = [None, None];
        debug!(
            dropped_blocks = self.dropped_blocks.load(Ordering::Relaxed),
            "mixer disposed"
        );
    }

    fn ensure_live(&self) -> Result<(), MixerError> {
        match self.state {
            Lifecycle::Disposed => Err(MixerError::Disposed),
            Lifecycle::Created | Lifecycle::Active => Ok(()),
        }
    }

    /// Free nodes the engine has handed back.
    fn reap_retired(&mut self) {
        while self.retired.pop().is_ok() {}
    }

    fn send(&mut self, command: GraphCommand) {
        if self.commands.push(command).is_err() {
            // a full queue means the engine is wedged; dropping is the only
            // non-blocking option left
            warn!("graph command queue full; command dropped");
        }
    }

    fn binding(&self, slot: SourceSlot) -> Option<StreamId> {
        self.bindings[slot.index()].as_ref().map(|b| b.stream)
    }

    fn attach(&mut self, slot: SourceSlot, stream: Stream) -> Result<(), MixerError> {
        self.ensure_live()?;
        self.reap_retired();

        let stream_id = stream.id();
        if self.binding(slot) == Some(stream_id) {
            // same stream: nothing to rewire, and no node is leaked
            debug!(slot = slot.label(), stream = ?stream_id, "stream already bound");
            self.state = Lifecycle::Active;
            return Ok(());
        }

        match stream.tracks().first().and_then(AudioTrack::take_reader) {
            Some(reader) => {
                debug!(
                    slot = slot.label(),
                    stream = ?stream_id,
                    channels = reader.channels(),
                    "attaching stream"
                );
                self.send(GraphCommand::Attach {
                    slot,
                    source: StreamSource::new(reader),
                });
                self.bindings[slot.index()] = Some(SourceBinding {
                    stream: stream_id,
                    audible: true,
                });
            }
            None => {
                // bound but silent: an empty stream is not an error
                warn!(
                    slot = slot.label(),
                    stream = ?stream_id,
                    "stream has no readable audio track; slot will be silent"
                );
                self.send(GraphCommand::Detach { slot });
                self.bindings[slot.index()] = Some(SourceBinding {
                    stream: stream_id,
                    audible: false,
                });
            }
        }

        self.state = Lifecycle::Active;
        Ok(())
    }

    fn set_volume(&mut self, slot: SourceSlot, volume: f32) -> Result<(), MixerError> {
        self.ensure_live()?;
        self.gains[slot.index()].set(volume);
        Ok(())
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.dispose();
    }
}
