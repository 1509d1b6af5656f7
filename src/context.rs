//! Audio graph context - device/clock acquisition and engine thread lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing::{debug, info};

use crate::engine::{Engine, EngineClock};
use crate::error::MixerError;

enum ClockSource {
    Device {
        device: cpal::Device,
        config: cpal::SupportedStreamConfig,
    },
    Offline {
        sample_rate: u32,
    },
}

/// Process-scoped handle to the audio device and clock.
///
/// Owns the engine thread for its lifetime; closing the context tears down
/// every node created on it. Construction fails fatally when the audio
/// subsystem cannot be acquired - there is no internal retry.
pub struct AudioGraphContext {
    clock: Option<ClockSource>,
    sample_rate: u32,
    channels: usize,
    running: Arc<AtomicBool>,
    engine_thread: Option<JoinHandle<()>>,
}

impl AudioGraphContext {
    /// Acquire the system's default output device as the clock source.
    pub fn acquire() -> Result<Self, MixerError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MixerError::ContextUnavailable("no output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| MixerError::ContextUnavailable(e.to_string()))?;

        let name = device.name().unwrap_or_else(|_| "unknown".into());
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        info!(device = %name, sample_rate, channels, "audio context acquired");

        Ok(Self {
            clock: Some(ClockSource::Device { device, config }),
            sample_rate,
            channels,
            running: Arc::new(AtomicBool::new(false)),
            engine_thread: None,
        })
    }

    /// A context without a device: the engine paces itself against the wall
    /// clock at `sample_rate`. For headless hosts and tests.
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            clock: Some(ClockSource::Offline { sample_rate }),
            sample_rate,
            channels: 2,
            running: Arc::new(AtomicBool::new(false)),
            engine_thread: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output channel count of the clock device (2 for offline contexts).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Spawn the engine thread and block until its clock is live.
    pub(crate) fn start(&mut self, mut engine: Engine) -> Result<(), MixerError> {
        let clock_source = self.clock.take().ok_or_else(|| {
            MixerError::ContextUnavailable("context already started or closed".into())
        })?;

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("duomix-engine".into())
            .spawn(move || {
                // the cpal stream must live on the thread that services it
                let (clock, stream) = match build_clock(clock_source) {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                engine.run(&clock, &running);

                // teardown order: the clock stops delivering callbacks, then
                // the graph and its nodes are released, then the thread exits
                drop(stream);
                drop(engine);
            })
            .map_err(|e| MixerError::ContextUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.engine_thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(MixerError::ContextUnavailable(
                    "engine thread failed to start".into(),
                ))
            }
        }
    }

    /// Stop the clock and join the engine thread. Idempotent.
    pub(crate) fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.engine_thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
            debug!("audio context closed");
        }
        self.clock = None;
    }
}

impl Drop for AudioGraphContext {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_clock(source: ClockSource) -> Result<(EngineClock, Option<cpal::Stream>), MixerError> {
    match source {
        ClockSource::Offline { sample_rate } => Ok((
            EngineClock::WallClock {
                start: Instant::now(),
                sample_rate,
            },
            None,
        )),
        ClockSource::Device { device, config } => {
            let frames = Arc::new(AtomicU64::new(0));
            let stream = build_clock_stream(&device, &config, frames.clone())?;
            stream
                .play()
                .map_err(|e| MixerError::ContextUnavailable(e.to_string()))?;
            Ok((EngineClock::Counter(frames), Some(stream)))
        }
    }
}

/// Build a silent output stream whose only job is counting device frames.
fn build_clock_stream(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    frames: Arc<AtomicU64>,
) -> Result<cpal::Stream, MixerError> {
    let channels = config.channels() as usize;
    let stream_config = config.config();

    let result = match config.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                data.iter_mut().for_each(|s| *s = 0.0);
                frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
            },
            |err| tracing::error!(?err, "clock stream error"),
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| {
                data.iter_mut().for_each(|s| *s = 0);
                frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
            },
            |err| tracing::error!(?err, "clock stream error"),
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [u16], _| {
                data.iter_mut().for_each(|s| *s = u16::MAX / 2);
                frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
            },
            |err| tracing::error!(?err, "clock stream error"),
            None,
        ),
        other => {
            return Err(MixerError::ContextUnavailable(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    };

    result.map_err(|e| MixerError::ContextUnavailable(e.to_string()))
}
