use log::debug;

use crate::graph::sink::VirtualStream;
use crate::models::error::CaptureError;
use crate::models::events::{EngineEvent, Severity};
use crate::models::request::CaptureRequest;
use crate::notify::bus::NotificationBus;
use crate::traits::capture_provider::{CaptureProvider, DeviceStream};

use super::controller::PlaybackController;

/// Activation flag plus the stream handed out while active.
#[derive(Debug, Clone, Default)]
pub struct InterceptionPolicy {
    pub active: bool,
    pub stream: Option<VirtualStream>,
}

/// What a capture request resolved to.
pub enum CapturedStream {
    /// The engine's stream answers the audio part. `video` carries the real
    /// device's video when the request also asked for it.
    Virtual {
        audio: VirtualStream,
        video: Option<Box<dyn DeviceStream>>,
    },
    /// Untouched real-device result.
    Device(Box<dyn DeviceStream>),
}

impl CapturedStream {
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    pub fn virtual_audio(&self) -> Option<&VirtualStream> {
        match self {
            Self::Virtual { audio, .. } => Some(audio),
            Self::Device(_) => None,
        }
    }
}

impl std::fmt::Debug for CapturedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Virtual { audio, video } => f
                .debug_struct("Virtual")
                .field("audio", audio)
                .field("video", &video.as_ref().map(|v| v.id().to_string()))
                .finish(),
            Self::Device(stream) => f.debug_tuple("Device").field(&stream.id()).finish(),
        }
    }
}

/// Decides, per capture request, between the virtual stream and the real
/// device.
///
/// Sits at the boundary that issues capture requests; the real-device
/// provider is fixed at construction. The interceptor never touches the
/// graph itself: it asks the controller for the sink and, when needed, to
/// start playback.
pub struct CaptureInterceptor {
    policy: InterceptionPolicy,
    provider: Box<dyn CaptureProvider>,
    bus: NotificationBus,
}

impl CaptureInterceptor {
    pub fn new(provider: Box<dyn CaptureProvider>, bus: NotificationBus) -> Self {
        Self {
            policy: InterceptionPolicy::default(),
            provider,
            bus,
        }
    }

    pub fn policy(&self) -> &InterceptionPolicy {
        &self.policy
    }

    pub fn is_active(&self) -> bool {
        self.policy.active
    }

    pub fn provider(&self) -> &dyn CaptureProvider {
        self.provider.as_ref()
    }

    /// Turn interception on, creating the sink if needed.
    pub fn activate(&mut self, controller: &mut PlaybackController) -> Result<VirtualStream, CaptureError> {
        let stream = controller.ensure_stream()?;
        if self.policy.active {
            return Ok(stream);
        }

        self.policy.active = true;
        self.policy.stream = Some(stream.clone());
        self.bus.log("INJECTION ACTIVE: Physical Mic Blocked.", Severity::Success);
        self.bus.emit(EngineEvent::Status { active: true });
        Ok(stream)
    }

    /// Turn interception off and stop playback. The sink stays alive for
    /// anyone still holding it.
    pub fn deactivate(&mut self, controller: &mut PlaybackController) -> bool {
        if !self.policy.active {
            return false;
        }

        self.policy.active = false;
        controller.stop();
        self.bus.log("INJECTION STOPPED: Physical Mic Available.", Severity::Info);
        self.bus.emit(EngineEvent::Status { active: false });
        true
    }

    /// Answer a capture request.
    pub fn intercept(
        &mut self,
        controller: &mut PlaybackController,
        request: &CaptureRequest,
    ) -> Result<CapturedStream, CaptureError> {
        if !(self.policy.active && request.wants_audio()) {
            debug!("passing capture request through to {}", self.provider.device_info().name);
            return self.provider.open(request).map(CapturedStream::Device);
        }

        self.bus.log("Intercepted capture request.", Severity::Info);

        let audio = match &self.policy.stream {
            Some(stream) => stream.clone(),
            None => {
                let stream = controller.ensure_stream()?;
                self.policy.stream = Some(stream.clone());
                stream
            }
        };

        // Open the device part first so a failure leaves the transport alone.
        let mut video = if request.wants_video() {
            Some(self.provider.open(&request.without_audio())?)
        } else {
            None
        };

        // Requester should hear something right away.
        if controller.has_asset() && !controller.state().is_playing() {
            if let Err(e) = controller.play() {
                if let Some(video) = video.as_mut() {
                    video.stop();
                }
                return Err(e);
            }
        }

        Ok(CapturedStream::Virtual { audio, video })
    }
}
