use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, info};

use crate::decoder::audio_decoder::{AudioDecoder, DecodeJob, DecodeOutcome};
use crate::graph::builder::StreamGraphBuilder;
use crate::graph::sink::VirtualStream;
use crate::models::audio_models::AudioSource;
use crate::models::command::EngineCommand;
use crate::models::config::EngineConfig;
use crate::models::error::{CaptureError, DecodeError};
use crate::models::events::{EngineEvent, LoadingPhase, Severity};
use crate::models::request::CaptureRequest;
use crate::models::state::{PlaybackState, TransportSnapshot};
use crate::notify::bus::{NotificationBus, SubscriptionId};
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::clock::{Clock, MonotonicClock};
use crate::traits::engine_observer::EngineObserver;

use super::controller::PlaybackController;
use super::interceptor::{CaptureInterceptor, CapturedStream};

/// Result of dispatching one `EngineCommand`.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Applied synchronously.
    Done,
    /// `LOAD_AUDIO` accepted; run the job and hand its outcome to
    /// `VirtualMicEngine::finish_load`.
    LoadPending(DecodeJob),
}

/// The virtual microphone engine: one explicit context per session.
///
/// ```text
/// LOAD_AUDIO ─→ AudioDecoder ─→ AudioAsset ─→ PlaybackController ─→ StreamGraphBuilder
///                                                   ↑                      │
/// capture request ─→ CaptureInterceptor ────────────┘        VirtualStream ┘
///                          │
///                          └─→ CaptureProvider (real device)
/// every state change ─→ NotificationBus ─→ observers / channels
/// ```
///
/// All control methods take `&mut self` and complete synchronously. Only
/// decoding runs elsewhere, split into `begin_load` / `DecodeJob::run` /
/// `finish_load`.
pub struct VirtualMicEngine {
    config: EngineConfig,
    decoder: AudioDecoder,
    controller: PlaybackController,
    interceptor: CaptureInterceptor,
    bus: NotificationBus,
}

impl VirtualMicEngine {
    pub fn new(config: EngineConfig, provider: Box<dyn CaptureProvider>) -> Result<Self, CaptureError> {
        Self::with_clock(config, provider, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        config: EngineConfig,
        provider: Box<dyn CaptureProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let bus = NotificationBus::new();
        let controller = PlaybackController::new(
            StreamGraphBuilder::new(config.sample_rate, config.channels, clock),
            bus.clone(),
            config.initial_volume,
            config.loop_by_default,
        );
        let interceptor = CaptureInterceptor::new(provider, bus.clone());

        info!(
            "virtual mic engine ready ({} Hz x{})",
            config.sample_rate, config.channels
        );
        Ok(Self {
            decoder: AudioDecoder::new(config.max_payload_bytes),
            config,
            controller,
            interceptor,
            bus,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn subscribe(&self, observer: Arc<dyn EngineObserver>) -> SubscriptionId {
        self.bus.subscribe(observer)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<EngineEvent>) {
        self.bus.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- Loading ---

    /// Issue a decode for `payload` (base64 text), superseding any pending one.
    pub fn begin_load(&mut self, payload: String, name: Option<String>) -> DecodeJob {
        let label = name.clone().unwrap_or_else(|| "audio".into());
        self.bus.log(format!("Loading {}...", label), Severity::Info);
        self.bus.emit(EngineEvent::Loading {
            phase: LoadingPhase::Start,
            name: name.clone(),
        });
        self.decoder.begin(payload, name)
    }

    /// Apply a finished decode. Stale outcomes are dropped without side
    /// effects. Returns whether a new asset was installed.
    pub fn finish_load(&mut self, outcome: DecodeOutcome) -> bool {
        if !self.decoder.is_current(outcome.ticket) {
            debug!("discarding stale decode {:?}", outcome.ticket);
            return false;
        }

        match outcome.result {
            Ok(asset) => {
                let seconds = asset.duration_secs();
                self.controller.load(asset);
                self.bus.log("Audio loaded successfully.", Severity::Success);
                self.bus.emit(EngineEvent::Duration { seconds });
                self.bus.emit(EngineEvent::Loading {
                    phase: LoadingPhase::Done,
                    name: outcome.name,
                });
                true
            }
            Err(DecodeError::Superseded) => false,
            Err(e) => {
                self.bus.log(format!("Error decoding audio: {}", e), Severity::Error);
                self.bus.emit(EngineEvent::Loading {
                    phase: LoadingPhase::Fail,
                    name: outcome.name,
                });
                false
            }
        }
    }

    /// Decode on the calling thread and apply the result.
    pub fn load_audio(&mut self, payload: String, name: Option<String>) -> bool {
        let job = self.begin_load(payload, name);
        self.finish_load(job.run())
    }

    // --- Transport ---

    pub fn play(&mut self) -> bool {
        match self.controller.play() {
            Ok(started) => started,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    pub fn pause(&mut self) -> bool {
        self.controller.pause()
    }

    pub fn stop(&mut self) -> bool {
        self.controller.stop()
    }

    pub fn seek(&mut self, fraction: f64) -> bool {
        match self.controller.seek(fraction) {
            Ok(moved) => moved,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.controller.set_volume(volume)
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.controller.set_loop(enabled);
    }

    pub fn progress(&self) -> f64 {
        self.controller.progress()
    }

    /// Periodic poll: settles end-of-track, then reports progress.
    pub fn tick(&mut self) -> f64 {
        self.controller.poll_end_of_track();
        self.controller.progress()
    }

    /// Display-side "ended" test for hosts that render a progress bar.
    pub fn appears_ended(&self) -> bool {
        !self.controller.loop_enabled() && self.controller.progress() >= self.config.ended_threshold
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.controller.state(),
            paused_offset_secs: self.controller.paused_offset_secs(),
            duration_secs: self.controller.duration_secs(),
            progress: self.controller.progress(),
            loop_enabled: self.controller.loop_enabled(),
            volume: self.controller.volume(),
            injection_active: self.interceptor.is_active(),
        }
    }

    // --- Injection ---

    pub fn activate_injection(&mut self) -> Result<VirtualStream, CaptureError> {
        self.interceptor.activate(&mut self.controller).map_err(|e| {
            self.bus.log(format!("Injection failed: {}", e), Severity::Error);
            e
        })
    }

    pub fn deactivate_injection(&mut self) -> bool {
        self.interceptor.deactivate(&mut self.controller)
    }

    /// The engine's live sink, created on first use. Does not turn
    /// injection on.
    pub fn virtual_stream(&mut self) -> Result<VirtualStream, CaptureError> {
        self.controller.ensure_stream()
    }

    pub fn injection_active(&self) -> bool {
        self.interceptor.is_active()
    }

    /// Answer a capture request from the host application.
    pub fn intercept(&mut self, request: &CaptureRequest) -> Result<CapturedStream, CaptureError> {
        let result = self.interceptor.intercept(&mut self.controller, request);
        if let Err(e @ CaptureError::CaptureUnavailable(_)) = &result {
            self.report(e);
        }
        result
    }

    /// The virtual device followed by the real one, if it is available.
    pub fn available_audio_sources(&self) -> Vec<AudioSource> {
        let mut sources = vec![AudioSource::virtual_microphone()];
        let provider = self.interceptor.provider();
        if provider.is_available() {
            sources.push(provider.device_info());
        }
        sources
    }

    // --- Commands ---

    pub fn handle(&mut self, command: EngineCommand) -> CommandOutcome {
        match command {
            EngineCommand::LoadAudio { audio_data, name } => {
                return CommandOutcome::LoadPending(self.begin_load(audio_data, name));
            }
            EngineCommand::StartInjection => {
                // Failure is already reported on the bus.
                let _ = self.activate_injection();
            }
            EngineCommand::StopInjection => {
                self.deactivate_injection();
            }
            EngineCommand::SetVolume { value } => {
                self.set_volume(value);
            }
            EngineCommand::Play => {
                self.play();
            }
            EngineCommand::Pause => {
                self.pause();
            }
            EngineCommand::Stop => {
                self.stop();
            }
            EngineCommand::Seek { fraction } => {
                self.seek(fraction);
            }
            EngineCommand::SetLoop { enabled } => self.set_loop(enabled),
        }
        CommandOutcome::Done
    }

    fn report(&self, error: &CaptureError) {
        self.bus.log(error.to_string(), Severity::Error);
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;
    use crate::notify::bus::tests::Recorder;
    use crate::processing::wav_format::encode_wav;
    use crate::session::interceptor::tests::FakeProvider;
    use crate::traits::clock::ManualClock;
    use approx::assert_relative_eq;

    const RATE: u32 = 8_000;

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: RATE,
            channels: 1,
            ..EngineConfig::default()
        }
    }

    fn setup() -> (VirtualMicEngine, Arc<ManualClock>, Arc<Recorder>) {
        let clock = Arc::new(ManualClock::new());
        let engine =
            VirtualMicEngine::with_clock(config(), Box::new(FakeProvider::default()), clock.clone()).unwrap();
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());
        (engine, clock, recorder)
    }

    fn tone(seconds: f64) -> String {
        let samples = vec![0.25f32; (seconds * RATE as f64) as usize];
        base64::engine::general_purpose::STANDARD.encode(encode_wav(&samples, RATE, 1))
    }

    fn logs(events: &[EngineEvent]) -> Vec<(String, Severity)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Log { message, severity } => Some((message.clone(), *severity)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = EngineConfig {
            sample_rate: 0,
            ..EngineConfig::default()
        };
        let result = VirtualMicEngine::new(bad, Box::new(FakeProvider::default()));
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn load_reports_duration_and_success() {
        let (mut engine, _, recorder) = setup();
        assert!(engine.load_audio(tone(4.0), Some("tone.wav".into())));
        assert_eq!(engine.state(), PlaybackState::Loaded);

        let events = recorder.take();
        assert!(logs(&events).contains(&("Audio loaded successfully.".into(), Severity::Success)));
        let seconds = events
            .iter()
            .find_map(|e| match e {
                EngineEvent::Duration { seconds } => Some(*seconds),
                _ => None,
            })
            .unwrap();
        assert_relative_eq!(seconds, 4.0, epsilon = 1e-6);
        assert!(events.contains(&EngineEvent::Loading {
            phase: LoadingPhase::Done,
            name: Some("tone.wav".into()),
        }));
    }

    #[test]
    fn failed_decode_leaves_state_untouched() {
        let (mut engine, _, recorder) = setup();
        engine.load_audio(tone(2.0), None);
        engine.play();
        recorder.take();

        assert!(!engine.load_audio("not base64 at all!".into(), None));
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_relative_eq!(engine.controller().duration_secs().unwrap(), 2.0, epsilon = 1e-6);

        let events = recorder.take();
        assert!(logs(&events)
            .iter()
            .any(|(m, s)| m.starts_with("Error decoding audio:") && *s == Severity::Error));
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::Duration { .. })));
    }

    #[test]
    fn only_the_latest_load_is_observable() {
        let (mut engine, _, recorder) = setup();
        let first = engine.begin_load(tone(1.0), Some("first".into()));
        let second = engine.begin_load(tone(3.0), Some("second".into()));

        assert!(engine.finish_load(second.run()));
        recorder.take();

        // The first decode finishes late and must not replace the second.
        assert!(!engine.finish_load(first.run()));
        assert_relative_eq!(engine.controller().duration_secs().unwrap(), 3.0, epsilon = 1e-6);
        assert_eq!(engine.controller().asset().unwrap().name(), Some("second"));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn stale_outcome_dropped_even_when_it_completed_first() {
        let (mut engine, _, _) = setup();
        let first = engine.begin_load(tone(1.0), None);
        let outcome = first.run();
        let second = engine.begin_load(tone(2.0), None);

        assert!(!engine.finish_load(outcome));
        assert!(engine.controller().asset().is_none());
        assert!(engine.finish_load(second.run()));
    }

    #[test]
    fn transport_waits_for_pending_load() {
        let (mut engine, _, recorder) = setup();
        let job = engine.begin_load(tone(4.0), Some("late.wav".into()));
        recorder.take();

        assert!(!engine.play());
        assert!(!engine.seek(0.5));
        assert!(!engine.pause());
        assert!(!engine.stop());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(recorder.take().is_empty());

        assert!(engine.finish_load(job.run()));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Loaded);
        assert_eq!(snapshot.paused_offset_secs, 0.0);
        assert!(!recorder
            .take_non_log()
            .iter()
            .any(|e| matches!(e, EngineEvent::PlaybackStarted | EngineEvent::Seeked { .. })));
    }

    #[test]
    fn pending_load_replaces_asset_played_meanwhile() {
        let (mut engine, _, recorder) = setup();
        engine.load_audio(tone(2.0), None);
        let job = engine.begin_load(tone(4.0), None);

        assert!(engine.play());
        assert!(engine.seek(0.5));
        recorder.take();

        assert!(engine.finish_load(job.run()));
        assert_eq!(engine.state(), PlaybackState::Loaded);
        assert_eq!(engine.snapshot().paused_offset_secs, 0.0);
        assert_relative_eq!(engine.controller().duration_secs().unwrap(), 4.0, epsilon = 1e-6);
        assert_eq!(recorder.take_non_log()[0], EngineEvent::PlaybackStopped);
    }

    #[test]
    fn four_second_track_progress() {
        let (mut engine, clock, recorder) = setup();
        engine.load_audio(tone(4.0), None);
        assert!(engine.play());

        clock.set(2.0);
        assert_relative_eq!(engine.progress(), 0.5, epsilon = 1e-6);

        clock.set(4.1);
        assert_relative_eq!(engine.progress(), 1.0);
        assert!(engine.appears_ended());
        recorder.take();

        assert_relative_eq!(engine.tick(), 0.0);
        assert_eq!(engine.state(), PlaybackState::Loaded);
        assert_eq!(
            recorder.take_non_log(),
            vec![EngineEvent::PlaybackEnded, EngineEvent::PlaybackStopped]
        );
    }

    #[test]
    fn looping_track_never_ends_on_tick() {
        let (mut engine, clock, _) = setup();
        engine.load_audio(tone(4.0), None);
        engine.set_loop(true);
        engine.play();

        clock.set(9.0);
        assert_relative_eq!(engine.tick(), 0.25, epsilon = 1e-6);
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(!engine.appears_ended());
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let (mut engine, clock, _) = setup();
        engine.load_audio(tone(4.0), None);
        engine.play();
        clock.set(1.0);
        assert!(engine.pause());
        assert_relative_eq!(engine.snapshot().paused_offset_secs, 1.0, epsilon = 1e-6);

        clock.set(10.0);
        assert!(engine.play());
        clock.set(11.0);
        assert_relative_eq!(engine.progress(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn activation_without_asset_yields_silence() {
        let (mut engine, _, recorder) = setup();
        let stream = engine.activate_injection().unwrap();
        assert!(engine.injection_active());
        assert!(recorder.take_non_log().contains(&EngineEvent::Status { active: true }));

        let mut buf = [1.0f32; 64];
        assert_eq!(stream.read(&mut buf), 64);
        assert!(buf.iter().all(|s| *s == 0.0));

        let captured = engine.intercept(&CaptureRequest::audio()).unwrap();
        assert!(captured.virtual_audio().unwrap().same_stream(&stream));
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn injected_stream_carries_the_asset_at_volume() {
        let (mut engine, _, _) = setup();
        engine.load_audio(tone(1.0), None);
        engine.set_volume(2.0);
        engine.activate_injection().unwrap();

        let captured = engine.intercept(&CaptureRequest::audio()).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);

        let mut buf = [0.0f32; 32];
        captured.virtual_audio().unwrap().read(&mut buf);
        for sample in buf {
            assert_relative_eq!(sample, 0.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn stop_injection_stops_playback() {
        let (mut engine, _, recorder) = setup();
        engine.load_audio(tone(1.0), None);
        engine.activate_injection().unwrap();
        engine.play();
        recorder.take();

        assert!(engine.deactivate_injection());
        assert_eq!(engine.state(), PlaybackState::Loaded);
        let events = recorder.take();
        assert!(events.contains(&EngineEvent::Status { active: false }));
        assert!(logs(&events).contains(&(
            "INJECTION STOPPED: Physical Mic Available.".into(),
            Severity::Info
        )));
        assert!(!engine.deactivate_injection());
    }

    #[test]
    fn handle_dispatches_commands() {
        let (mut engine, clock, _) = setup();

        let job = match engine.handle(EngineCommand::LoadAudio {
            audio_data: tone(4.0),
            name: None,
        }) {
            CommandOutcome::LoadPending(job) => job,
            other => panic!("unexpected {:?}", other),
        };
        assert!(engine.finish_load(job.run()));

        engine.handle(EngineCommand::SetVolume { value: 0.3 });
        engine.handle(EngineCommand::SetLoop { enabled: true });
        engine.handle(EngineCommand::StartInjection);
        engine.handle(EngineCommand::Play);
        engine.handle(EngineCommand::Seek { fraction: 0.5 });
        clock.advance(1.0);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(snapshot.loop_enabled);
        assert!(snapshot.injection_active);
        assert_relative_eq!(snapshot.volume, 0.3);
        assert_relative_eq!(snapshot.progress, 0.75, epsilon = 1e-6);

        engine.handle(EngineCommand::Pause);
        assert_eq!(engine.state(), PlaybackState::Paused);
        engine.handle(EngineCommand::Stop);
        assert_eq!(engine.state(), PlaybackState::Loaded);
        engine.handle(EngineCommand::StopInjection);
        assert!(!engine.injection_active());
    }

    #[test]
    fn transport_without_asset_is_inert() {
        let (mut engine, _, recorder) = setup();
        assert!(!engine.play());
        assert!(!engine.pause());
        assert!(!engine.stop());
        assert!(!engine.seek(0.5));
        assert_relative_eq!(engine.progress(), 0.0);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn lists_virtual_source_first() {
        let (engine, _, _) = setup();
        let sources = engine.available_audio_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], AudioSource::virtual_microphone());
        assert_eq!(sources[1].id, "fake-mic");
    }
}
