//! cpal microphone capture provider.
//!
//! Opens an input stream on a dedicated thread and buffers interleaved f32
//! samples for the `DeviceStream` handed back to the interceptor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use virtual_mic_core::models::audio_models::AudioSource;
use virtual_mic_core::models::error::CaptureError;
use virtual_mic_core::models::request::CaptureRequest;
use virtual_mic_core::processing::ring_buffer::RingBuffer;
use virtual_mic_core::traits::capture_provider::{CaptureProvider, DeviceStream};

use crate::devices::{find_input_device, list_input_devices, transport_from_name};

/// Seconds of audio kept when the reader falls behind.
const BUFFER_SECONDS: usize = 2;

/// Real microphone passthrough.
///
/// Each `open` starts its own capture thread. cpal streams are not `Send`
/// on every host, so the stream never leaves that thread.
pub struct CpalMicProvider {
    device_name: Option<String>,
}

impl CpalMicProvider {
    /// Provider for the system default microphone.
    pub fn default_device() -> Self {
        Self { device_name: None }
    }

    /// Provider for a specific microphone by cpal device name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl CaptureProvider for CpalMicProvider {
    fn is_available(&self) -> bool {
        find_input_device(self.device_name.as_deref()).is_ok()
    }

    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn DeviceStream>, CaptureError> {
        if !request.wants_audio() {
            // No camera support in this backend.
            return Err(CaptureError::DeviceNotAvailable);
        }
        if request.wants_video() {
            warn!("video requested from an audio-only device; returning audio only");
        }
        Ok(Box::new(CpalDeviceStream::start(self.device_name.clone())?))
    }

    fn device_info(&self) -> AudioSource {
        match &self.device_name {
            Some(name) => AudioSource {
                id: name.clone(),
                name: name.clone(),
                is_default: false,
                transport_type: Some(transport_from_name(name)),
            },
            None => list_input_devices()
                .ok()
                .and_then(|devices| devices.into_iter().find(|d| d.is_default))
                .unwrap_or_else(|| AudioSource {
                    id: "default-mic".into(),
                    name: "Default Microphone".into(),
                    is_default: true,
                    transport_type: None,
                }),
        }
    }
}

/// A running microphone capture.
pub struct CpalDeviceStream {
    id: String,
    sample_rate: u32,
    channels: u16,
    buffer: Arc<Mutex<RingBuffer>>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CpalDeviceStream {
    fn start(device_name: Option<String>) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || {
                if let Err(e) = mic_capture_loop(thread_running.clone(), device_name, ready_tx) {
                    error!("Mic capture error: {}", e);
                }
                thread_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn mic thread: {}", e)))?;

        let (buffer, sample_rate, channels) = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::DeviceNotAvailable);
            }
        };
        let id = Uuid::new_v4().to_string();
        info!("mic capture {} started ({} Hz x{})", id, sample_rate, channels);
        Ok(Self {
            id,
            sample_rate,
            channels,
            buffer,
            running,
            capture_handle: Some(handle),
        })
    }

    /// Samples lost because the reader fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.buffer.lock().dropped()
    }
}

impl DeviceStream for CpalDeviceStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_audio(&self) -> bool {
        true
    }

    fn has_video(&self) -> bool {
        false
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        self.buffer.lock().pop_into(out)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
            debug!("mic capture {} stopped", self.id);
        }
    }
}

impl Drop for CpalDeviceStream {
    fn drop(&mut self) {
        self.stop();
    }
}

type Ready = mpsc::Sender<Result<(Arc<Mutex<RingBuffer>>, u32, u16), CaptureError>>;

/// Capture loop running on a dedicated thread.
///
/// Reports the negotiated format (or the failure) through `ready`, then keeps
/// the stream alive until `running` clears.
fn mic_capture_loop(
    running: Arc<AtomicBool>,
    device_name: Option<String>,
    ready: Ready,
) -> Result<(), CaptureError> {
    let stream = match open_input(device_name.as_deref()) {
        Ok((stream, buffer, sample_rate, channels)) => {
            let _ = ready.send(Ok((buffer, sample_rate, channels)));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
    };

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
    Ok(())
}

fn open_input(
    device_name: Option<&str>,
) -> Result<(cpal::Stream, Arc<Mutex<RingBuffer>>, u32, u16), CaptureError> {
    let device = find_input_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::ConfigurationFailed(format!("default_input_config failed: {}", e)))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let buffer = Arc::new(Mutex::new(RingBuffer::new(
        sample_rate as usize * channels as usize * BUFFER_SECONDS,
    )));

    let config: cpal::StreamConfig = supported.config();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, Arc::clone(&buffer)),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, Arc::clone(&buffer)),
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, Arc::clone(&buffer)),
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| CaptureError::Unknown(format!("failed to start input stream: {}", e)))?;

    Ok((stream, buffer, sample_rate, channels))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<RingBuffer>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| s.to_sample::<f32>()));
            buffer.lock().push(&scratch);
        },
        |err| error!("Input stream error: {}", err),
        None,
    )
}
