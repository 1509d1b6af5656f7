//! Real-time engine: owns the graph, drains control commands, renders blocks.
//!
//! Runs on a dedicated thread paced by the context clock. All communication
//! with the control plane goes through SPSC ring buffers and atomics; the
//! loop never locks, and nodes removed from the graph are shipped back to
//! the control thread so the real-time path never frees memory.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer};

use crate::graph::AudioGraph;
use crate::mixer::SourceSlot;
use crate::node::{AudioNode, NodeId, BLOCK_LEN};
use crate::nodes::StreamSource;

/// How many blocks the engine keeps rendered ahead of the clock.
const LEAD_BLOCKS: u64 = 8;

/// Graph mutations requested by the control plane, applied between blocks.
pub(crate) enum GraphCommand {
    /// Wire a new source into the slot, detaching any prior source first.
    Attach {
        slot: SourceSlot,
        source: StreamSource,
    },
    /// Remove the slot's source, leaving the slot silent.
    Detach { slot: SourceSlot },
}

/// The clock the engine paces itself against.
pub(crate) enum EngineClock {
    /// Frame counter advanced by a device stream callback.
    Counter(Arc<AtomicU64>),
    /// Headless pacing against the wall clock.
    WallClock { start: Instant, sample_rate: u32 },
}

impl EngineClock {
    fn frames_elapsed(&self) -> u64 {
        match self {
            EngineClock::Counter(frames) => frames.load(Ordering::Relaxed),
            EngineClock::WallClock { start, sample_rate } => {
                (start.elapsed().as_secs_f64() * f64::from(*sample_rate)) as u64
            }
        }
    }
}

struct SlotWiring {
    gain: NodeId,
    source: Option<NodeId>,
}

pub(crate) struct Engine {
    graph: AudioGraph,
    commands: Consumer<GraphCommand>,
    retired: Producer<Box<dyn AudioNode>>,
    slots: [SlotWiring; 2],
    blocks_rendered: u64,
}

impl Engine {
    pub(crate) fn new(
        graph: AudioGraph,
        commands: Consumer<GraphCommand>,
        retired: Producer<Box<dyn AudioNode>>,
        microphone_gain: NodeId,
        system_gain: NodeId,
    ) -> Self {
        Self {
            graph,
            commands,
            retired,
            slots: [
                SlotWiring {
                    gain: microphone_gain,
                    source: None,
                },
                SlotWiring {
                    gain: system_gain,
                    source: None,
                },
            ],
            blocks_rendered: 0,
        }
    }

    fn detach(&mut self, slot: SourceSlot) {
        if let Some(node_id) = self.slots[slot.index()].source.take() {
            if let Some(node) = self.graph.remove(node_id) {
                // hand the allocation back to the control thread; dropping
                // here is the fallback when the queue is full
                let _ = self.retired.push(node);
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                GraphCommand::Attach { slot, source } => {
                    // the old source is fully out of the graph before the
                    // replacement is wired in
                    self.detach(slot);
                    let id = self.graph.add(source);
                    self.graph.connect(id, self.slots[slot.index()].gain);
                    self.slots[slot.index()].source = Some(id);
                }
                GraphCommand::Detach { slot } => self.detach(slot),
            }
        }
    }

    fn render_block(&mut self) {
        self.graph.process();
        self.blocks_rendered += 1;
    }

    /// Engine main loop: drain commands at every block boundary and keep the
    /// rendered block count slightly ahead of the clock.
    pub(crate) fn run(&mut self, clock: &EngineClock, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.drain_commands();
            let target_blocks = clock.frames_elapsed() / BLOCK_LEN as u64 + LEAD_BLOCKS;
            if self.blocks_rendered < target_blocks {
                self.render_block();
            } else {
                std::thread::park_timeout(Duration::from_micros(500));
            }
        }

        // shutdown: retire the sources so the control thread frees them
        self.detach(SourceSlot::Microphone);
        self.detach(SourceSlot::System);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rtrb::RingBuffer;

    use crate::nodes::{DestinationSink, GainControl, GainStage};
    use crate::stream::{AudioTrack, TrackReader, TrackWriter};

    struct Rig {
        engine: Engine,
        commands: Producer<GraphCommand>,
        retired: Consumer<Box<dyn AudioNode>>,
        mixed: TrackReader,
    }

    fn rig() -> Rig {
        let mut graph = AudioGraph::new(48_000);
        let mic_control = GainControl::new(1.0);
        let system_control = GainControl::new(0.5);
        let mic_gain = graph.add(GainStage::new(mic_control).without_smoothing());
        let system_gain = graph.add(GainStage::new(system_control).without_smoothing());

        let (writer, mixed_track) = AudioTrack::pipe(2, 4096);
        let dest = graph.add(DestinationSink::new(writer));
        graph.connect(mic_gain, dest);
        graph.connect(system_gain, dest);
        graph.set_terminal(dest);

        let (commands, command_rx) = RingBuffer::new(16);
        let (retired_tx, retired) = RingBuffer::new(16);

        Rig {
            engine: Engine::new(graph, command_rx, retired_tx, mic_gain, system_gain),
            commands,
            retired,
            mixed: mixed_track.take_reader().unwrap(),
        }
    }

    fn source_from(channels: usize) -> (TrackWriter, StreamSource) {
        let (writer, track) = AudioTrack::pipe(channels, 4096);
        (writer, StreamSource::new(track.take_reader().unwrap()))
    }

    #[test]
    fn attach_replaces_without_leaking_nodes() {
        let mut rig = rig();
        let (_w1, first) = source_from(1);
        let (_w2, second) = source_from(1);

        rig.commands
            .push(GraphCommand::Attach {
                slot: SourceSlot::Microphone,
                source: first,
            })
            .ok()
            .unwrap();
        rig.engine.drain_commands();
        assert_eq!(rig.engine.graph.node_count(), 4);
        assert!(rig.retired.pop().is_err());

        rig.commands
            .push(GraphCommand::Attach {
                slot: SourceSlot::Microphone,
                source: second,
            })
            .ok()
            .unwrap();
        rig.engine.drain_commands();
        assert_eq!(rig.engine.graph.node_count(), 4);
        assert!(rig.retired.pop().is_ok(), "replaced source not retired");
    }

    #[test]
    fn mixes_both_slots_with_gains() {
        let mut rig = rig();
        let (mut mic_writer, mic_source) = source_from(1);
        let (mut sys_writer, sys_source) = source_from(2);

        mic_writer.write(&vec![0.5f32; 64]);
        let mut sys_frames = Vec::new();
        for _ in 0..64 {
            sys_frames.extend_from_slice(&[0.25, -0.25]);
        }
        sys_writer.write(&sys_frames);

        rig.commands
            .push(GraphCommand::Attach {
                slot: SourceSlot::Microphone,
                source: mic_source,
            })
            .ok()
            .unwrap();
        rig.commands
            .push(GraphCommand::Attach {
                slot: SourceSlot::System,
                source: sys_source,
            })
            .ok()
            .unwrap();
        rig.engine.drain_commands();
        rig.engine.render_block();

        // mic 0.5 * 1.0 on both channels, system 0.25 * 0.5 stereo
        let mut frame = [0.0f32; 2];
        for _ in 0..64 {
            assert_eq!(rig.mixed.read(&mut frame), 2);
            assert_relative_eq!(frame[0], 0.625, epsilon = 1e-6);
            assert_relative_eq!(frame[1], 0.375, epsilon = 1e-6);
        }
    }

    #[test]
    fn detach_silences_slot() {
        let mut rig = rig();
        let (mut sys_writer, sys_source) = source_from(2);
        sys_writer.write(&vec![0.5f32; 256]);

        rig.commands
            .push(GraphCommand::Attach {
                slot: SourceSlot::System,
                source: sys_source,
            })
            .ok()
            .unwrap();
        rig.engine.drain_commands();
        rig.engine.render_block();

        rig.commands
            .push(GraphCommand::Detach {
                slot: SourceSlot::System,
            })
            .ok()
            .unwrap();
        rig.engine.drain_commands();
        rig.engine.render_block();

        let mut mixed = vec![0.0f32; 256];
        assert_eq!(rig.mixed.read(&mut mixed), 256);
        assert!(mixed[..128].iter().all(|&s| s == 0.25), "gain not applied");
        assert!(mixed[128..].iter().all(|&s| s == 0.0), "slot not silent");
    }
}
