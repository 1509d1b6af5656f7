//! Stream and track handles bridging capture, mixer, and recorder.
//!
//! A [`Stream`] is an opaque handle to zero or more live audio tracks.
//! Samples travel through SPSC ring buffers: the producing side (a capture
//! backend, or the mixer's destination) holds a [`TrackWriter`], and the
//! consuming side takes the [`TrackReader`] out of the track exactly once.
//! Taking the reader locks a mutex on the control plane; everything after
//! that is lock-free pops on whichever thread owns the reader.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique stream identifier. Clones of a stream share it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamId(u64);

/// Process-unique track identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TrackId(u64);

struct TrackShared {
    reader: Mutex<Option<TrackReader>>,
}

/// A single live audio track carrying interleaved `f32` samples.
///
/// Tracks do not resample: samples are expected at the rate of the context
/// that consumes them.
#[derive(Clone)]
pub struct AudioTrack {
    id: TrackId,
    channels: usize,
    shared: Arc<TrackShared>,
}

impl AudioTrack {
    /// Create a connected writer/track pair with room for `capacity_frames`
    /// frames. `channels` is clamped to 1 or 2.
    pub fn pipe(channels: usize, capacity_frames: usize) -> (TrackWriter, AudioTrack) {
        let channels = channels.clamp(1, 2);
        let capacity = (capacity_frames.max(64) * channels).next_power_of_two();
        let (producer, consumer) = RingBuffer::new(capacity);

        let track = AudioTrack {
            id: TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)),
            channels,
            shared: Arc::new(TrackShared {
                reader: Mutex::new(Some(TrackReader { consumer, channels })),
            }),
        };
        (TrackWriter { producer, channels }, track)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Take the reading end. Returns `None` if it was already taken.
    pub fn take_reader(&self) -> Option<TrackReader> {
        self.shared.reader.lock().take()
    }
}

struct StreamInner {
    id: StreamId,
    tracks: Vec<AudioTrack>,
}

/// Opaque handle carrying zero or more live audio tracks.
///
/// Streams are cheap to clone; clones share identity and tracks. The mixer
/// reads a stream through a source node it creates, it never owns the
/// capture behind the handle.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub fn new(tracks: Vec<AudioTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)),
                tracks,
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    pub fn tracks(&self) -> &[AudioTrack] {
        &self.inner.tracks
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks.len())
            .finish()
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.id)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Producing end of a track pipe.
pub struct TrackWriter {
    producer: Producer<f32>,
    channels: usize,
}

impl TrackWriter {
    /// Push interleaved samples, whole frames only.
    ///
    /// Returns how many samples were accepted; the rest did not fit.
    pub fn write(&mut self, interleaved: &[f32]) -> usize {
        let frames = (interleaved.len() / self.channels).min(self.producer.slots() / self.channels);
        let count = frames * self.channels;
        for &sample in &interleaved[..count] {
            let _ = self.producer.push(sample);
        }
        count
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample slots currently free in the pipe.
    pub fn space(&self) -> usize {
        self.producer.slots()
    }
}

/// Consuming end of a track pipe.
pub struct TrackReader {
    consumer: Consumer<f32>,
    channels: usize,
}

impl TrackReader {
    /// Pop a single sample, if one is ready.
    pub fn pop(&mut self) -> Option<f32> {
        self.consumer.pop().ok()
    }

    /// Read up to `out.len()` interleaved samples. Returns how many were read.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let mut count = 0;
        for slot in out.iter_mut() {
            match self.consumer.pop() {
                Ok(sample) => {
                    *slot = sample;
                    count += 1;
                }
                Err(_) => break,
            }
        }
        count
    }

    /// Samples currently waiting in the pipe.
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_shared_by_clones() {
        let a = Stream::new(vec![]);
        let b = Stream::new(vec![]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn reader_can_be_taken_once() {
        let (_writer, track) = AudioTrack::pipe(1, 64);
        assert!(track.take_reader().is_some());
        assert!(track.take_reader().is_none());
        assert!(track.clone().take_reader().is_none());
    }

    #[test]
    fn write_is_frame_aligned() {
        // 64-frame stereo pipe: an oversized write stops at a frame boundary
        let (mut writer, track) = AudioTrack::pipe(2, 64);
        let samples = vec![0.5f32; 160];
        assert_eq!(writer.write(&samples), 128);

        let mut reader = track.take_reader().unwrap();
        let mut out = vec![0.0f32; 160];
        assert_eq!(reader.read(&mut out), 128);
        assert!(out[..128].iter().all(|&s| s == 0.5));
    }
}
