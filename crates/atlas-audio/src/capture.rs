//! cpal-backed microphone capture.

use crate::chunk::AudioChunk;
use crate::device::{CaptureDevice, CaptureStream};
use async_trait::async_trait;
use atlas_foundation::{CaptureConfig, VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Captures from the host's input device on a dedicated thread.
///
/// cpal streams are not `Send`, so the stream lives on its own thread for
/// the lifetime of the `CaptureStream`; the thread exits when the stream's
/// stop flag flips. Audio is framed into fixed-duration chunks at the
/// device's native sample rate; the server treats payload format as opaque.
pub struct CpalCaptureDevice {
    device_name: Option<String>,
}

impl Default for CpalCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalCaptureDevice {
    /// Use the host default input device.
    pub fn new() -> Self {
        Self { device_name: None }
    }

    /// Use a specific input device by name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

#[async_trait]
impl CaptureDevice for CpalCaptureDevice {
    async fn acquire(&self, config: &CaptureConfig) -> VoiceResult<CaptureStream> {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let device_name = self.device_name.clone();
        let chunk_ms = config.chunk_ms.max(1);

        thread::Builder::new()
            .name("atlas-capture".to_string())
            .spawn(move || {
                capture_thread(device_name, chunk_ms, chunk_tx, ready_tx, stop_flag);
            })
            .map_err(|e| VoiceError::RecordingFailed(format!("capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureStream::new(chunk_rx, stop)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::RecordingFailed(
                "capture thread exited before startup".into(),
            )),
        }
    }
}

fn capture_thread(
    device_name: Option<String>,
    chunk_ms: u64,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<VoiceResult<()>>,
    stop: Arc<AtomicBool>,
) {
    let (stream, sample_rate, sample_rx) = match open_stream(device_name) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(VoiceError::RecordingFailed(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    let chunk_samples = (u64::from(sample_rate) * chunk_ms / 1000).max(1) as usize;
    let mut buffer: Vec<i16> = Vec::with_capacity(chunk_samples);

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match sample_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(samples) => {
                buffer.extend_from_slice(&samples);
                while buffer.len() >= chunk_samples {
                    let rest = buffer.split_off(chunk_samples);
                    let chunk = AudioChunk::from_samples(&buffer, sample_rate);
                    buffer = rest;
                    if chunk_tx.blocking_send(chunk).is_err() {
                        // Consumer dropped the stream.
                        return;
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!(target: "audio", "capture callback channel closed");
                break;
            }
        }
    }
    drop(stream);
    tracing::debug!(target: "audio", "capture thread stopped");
}

type OpenedStream = (cpal::Stream, u32, std::sync::mpsc::Receiver<Vec<i16>>);

fn open_stream(device_name: Option<String>) -> VoiceResult<OpenedStream> {
    let host = cpal::default_host();
    let device = match &device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| VoiceError::DeviceAccessDenied(e.to_string()))?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false)),
        None => host.default_input_device(),
    }
    .ok_or_else(|| {
        VoiceError::DeviceAccessDenied(format!(
            "input device not found: {}",
            device_name.as_deref().unwrap_or("default")
        ))
    })?;

    let supported = device
        .default_input_config()
        .map_err(|e| VoiceError::DeviceAccessDenied(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let stream_config: cpal::StreamConfig = supported.config();

    let channels = stream_config.channels.max(1) as usize;
    let (sample_tx, sample_rx) = std::sync::mpsc::channel::<Vec<i16>>();
    let err_fn = |e| tracing::error!(target: "audio", "capture stream error: {e}");

    // Interleaved frames are downmixed to mono in the callback so chunk
    // durations track the sample rate directly.
    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                let _ = sample_tx.send(downmix(data, channels, |s| i32::from(*s)));
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                let _ = sample_tx.send(downmix(data, channels, |s| i32::from(*s) - 32_768));
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| {
                let _ = sample_tx.send(downmix(data, channels, |s| {
                    (s.clamp(-1.0, 1.0) * 32_767.0) as i32
                }));
            },
            err_fn,
            None,
        ),
        other => {
            return Err(VoiceError::DeviceAccessDenied(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| VoiceError::RecordingFailed(e.to_string()))?;

    Ok((stream, sample_rate, sample_rx))
}

fn downmix<T>(data: &[T], channels: usize, to_i32: impl Fn(&T) -> i32) -> Vec<i16> {
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(&to_i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}
