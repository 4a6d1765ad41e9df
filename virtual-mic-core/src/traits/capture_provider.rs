use crate::models::audio_models::AudioSource;
use crate::models::error::CaptureError;
use crate::models::request::CaptureRequest;

/// A live stream obtained from a real capture device.
///
/// Audio is pulled as interleaved f32 samples in the stream's own format.
pub trait DeviceStream: Send {
    /// Stable identifier of this stream.
    fn id(&self) -> &str;

    fn has_audio(&self) -> bool;

    fn has_video(&self) -> bool;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Copy up to `out.len()` captured samples into `out`, returning how
    /// many were written.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Release the device. Calling this more than once is harmless.
    fn stop(&mut self);
}

/// Real-device capture backend the interceptor passes through to.
///
/// Implemented by:
/// - `CpalMicProvider` (virtual-mic-cpal)
pub trait CaptureProvider: Send + Sync {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Open the streams named by `request`.
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn DeviceStream>, CaptureError>;

    /// Information about the device backing this provider.
    fn device_info(&self) -> AudioSource;
}
