//! Local monitoring of the virtual stream on the default output device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use log::{debug, error, info, warn};

use virtual_mic_core::graph::sink::VirtualStream;
use virtual_mic_core::models::error::CaptureError;
use virtual_mic_core::processing::pcm_convert::remap_channels;

/// Plays a `VirtualStream` through the speakers.
///
/// The monitor is a holder of the stream like any capture client, with its
/// own read cursor, so it hears the same audio they do.
pub struct SpeakerMonitor {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SpeakerMonitor {
    pub fn start(stream: VirtualStream) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("speaker-monitor".into())
            .spawn(move || {
                let output = match open_output(stream) {
                    Ok(output) => {
                        let _ = ready_tx.send(Ok(()));
                        output
                    }
                    Err(e) => {
                        error!("Speaker monitor error: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while thread_running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(output);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn monitor thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::DeviceNotAvailable)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("speaker monitor stopped");
        }
    }
}

impl Drop for SpeakerMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output(stream: VirtualStream) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(CaptureError::DeviceNotAvailable)?;

    let supported = pick_output_config(&device, stream.sample_rate(), stream.channels())?;
    if supported.sample_rate().0 != stream.sample_rate() {
        warn!(
            "output runs at {} Hz, virtual stream at {} Hz; monitor pitch will be off",
            supported.sample_rate().0,
            stream.sample_rate()
        );
    }

    let config: cpal::StreamConfig = supported.config();
    let output = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, stream),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, stream),
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, stream),
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build output stream: {}", e)))?;

    output
        .play()
        .map_err(|e| CaptureError::Unknown(format!("failed to play output stream: {}", e)))?;

    info!(
        "speaker monitor started ({} Hz x{})",
        config.sample_rate.0, config.channels
    );
    Ok(output)
}

/// A config matching the stream's format if the device has one, else the
/// device default.
fn pick_output_config(
    device: &cpal::Device,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let rate = cpal::SampleRate(sample_rate);
    let exact = device.supported_output_configs().ok().and_then(|mut ranges| {
        ranges.find(|r| {
            r.channels() == channels
                && r.min_sample_rate() <= rate
                && rate <= r.max_sample_rate()
                && r.sample_format() == cpal::SampleFormat::F32
        })
    });

    match exact {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("default_output_config failed: {}", e))),
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    stream: VirtualStream,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let device_channels = config.channels;
    let stream_channels = stream.channels();
    let mut scratch: Vec<f32> = vec![0.0; 4096];

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / device_channels.max(1) as usize;
            let needed = frames * stream_channels as usize;
            if scratch.len() < needed {
                scratch.resize(needed, 0.0);
            }
            let read = stream.read(&mut scratch[..needed]);

            if device_channels == stream_channels {
                for (out, &s) in data.iter_mut().zip(&scratch[..read]) {
                    *out = T::from_sample(s);
                }
            } else {
                let remapped = remap_channels(&scratch[..read], stream_channels, device_channels);
                for (out, &s) in data.iter_mut().zip(&remapped) {
                    *out = T::from_sample(s);
                }
            }
        },
        |err| error!("Output stream error: {}", err),
        None,
    )
}
