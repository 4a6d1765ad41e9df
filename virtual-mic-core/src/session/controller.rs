use std::sync::Arc;

use log::{debug, info};

use crate::graph::builder::{SourceOptions, StreamGraphBuilder};
use crate::graph::sink::VirtualStream;
use crate::models::asset::AudioAsset;
use crate::models::error::CaptureError;
use crate::models::events::{EngineEvent, Severity};
use crate::models::state::PlaybackState;
use crate::notify::bus::NotificationBus;
use crate::traits::clock::Clock;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 2.0;

/// Owns the loaded asset and the transport state machine.
///
/// Timing is clock-based: while playing, the position is
/// `now - origin`, where `origin = start_time - paused_offset`. All
/// graph mutations (attaching, replacing, tearing down sources) go through
/// here.
pub struct PlaybackController {
    asset: Option<Arc<AudioAsset>>,
    state: PlaybackState,
    paused_offset_secs: f64,
    origin_secs: Option<f64>,
    loop_enabled: bool,
    volume: f32,
    graph: StreamGraphBuilder,
    clock: Arc<dyn Clock>,
    bus: NotificationBus,
}

impl PlaybackController {
    /// Timing uses the graph's clock, so the transport and the rendered
    /// audio share one notion of "now".
    pub fn new(graph: StreamGraphBuilder, bus: NotificationBus, volume: f32, loop_enabled: bool) -> Self {
        let clock = Arc::clone(graph.clock());
        Self {
            asset: None,
            state: PlaybackState::Idle,
            paused_offset_secs: 0.0,
            origin_secs: None,
            loop_enabled,
            volume: clamp_volume(volume).unwrap_or(1.0),
            graph,
            clock,
            bus,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn asset(&self) -> Option<&Arc<AudioAsset>> {
        self.asset.as_ref()
    }

    pub fn has_asset(&self) -> bool {
        self.asset.is_some()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.asset.as_ref().map(|a| a.duration_secs())
    }

    pub fn paused_offset_secs(&self) -> f64 {
        self.paused_offset_secs
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn stream(&self) -> Option<&VirtualStream> {
        self.graph.sink()
    }

    /// Live sink, created on first use. Existing holders keep the same one.
    pub fn ensure_stream(&mut self) -> Result<VirtualStream, CaptureError> {
        self.graph.ensure_sink(self.volume)
    }

    /// Install a new asset. Stops any playback first; offset resets to 0.
    pub fn load(&mut self, asset: AudioAsset) {
        self.stop();
        self.graph.forget_asset();
        info!(
            "loaded asset {} ({:.2}s)",
            asset.name().unwrap_or("<unnamed>"),
            asset.duration_secs()
        );
        self.asset = Some(Arc::new(asset));
        self.paused_offset_secs = 0.0;
        self.origin_secs = None;
        self.state = PlaybackState::Loaded;
    }

    /// Start or resume from the paused offset.
    ///
    /// Returns `Ok(false)` when there is nothing to do (no asset, or
    /// already playing).
    pub fn play(&mut self) -> Result<bool, CaptureError> {
        if !matches!(self.state, PlaybackState::Loaded | PlaybackState::Paused) {
            return Ok(false);
        }
        let Some(asset) = self.asset.clone() else {
            return Ok(false);
        };

        let origin = self.clock.now_secs() - self.paused_offset_secs;
        self.graph.build(
            &asset,
            self.volume,
            SourceOptions {
                loop_enabled: self.loop_enabled,
                origin_secs: origin,
            },
        )?;

        self.origin_secs = Some(origin);
        self.state = PlaybackState::Playing;
        self.bus.log("Playback started.", Severity::Info);
        self.bus.emit(EngineEvent::PlaybackStarted);
        Ok(true)
    }

    /// Freeze the position; the sink stays live.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_playing() {
            return false;
        }
        self.paused_offset_secs = self.position_secs();
        self.graph.teardown_source();
        self.origin_secs = None;
        self.state = PlaybackState::Paused;
        self.bus.log("Playback paused.", Severity::Warning);
        self.bus.emit(EngineEvent::PlaybackPaused);
        true
    }

    /// Return to `Loaded` at offset 0. Repeated calls are no-ops.
    pub fn stop(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.halt();
        self.bus.log("Playback stopped.", Severity::Warning);
        self.bus.emit(EngineEvent::PlaybackStopped);
        true
    }

    /// Move to `fraction` of the track. While playing, the old source is
    /// replaced by one at the new offset in a single step.
    pub fn seek(&mut self, fraction: f64) -> Result<bool, CaptureError> {
        let Some(asset) = self.asset.clone() else {
            return Ok(false);
        };
        if !fraction.is_finite() {
            return Ok(false);
        }

        let fraction = fraction.clamp(0.0, 1.0);
        self.paused_offset_secs = fraction * asset.duration_secs();

        if self.state.is_playing() {
            let origin = self.clock.now_secs() - self.paused_offset_secs;
            self.graph.build(
                &asset,
                self.volume,
                SourceOptions {
                    loop_enabled: self.loop_enabled,
                    origin_secs: origin,
                },
            )?;
            self.origin_secs = Some(origin);
        }

        self.bus.log(
            format!("Seeked to {}%.", (fraction * 100.0).round()),
            Severity::Info,
        );
        self.bus.emit(EngineEvent::Seeked { fraction });
        Ok(true)
    }

    /// Clamp and apply a gain. NaN is ignored. Returns the effective gain.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if let Some(volume) = clamp_volume(volume) {
            self.volume = volume;
            self.graph.set_gain(volume);
            debug!("volume set to {:.2}", volume);
        }
        self.volume
    }

    pub fn set_loop(&mut self, enabled: bool) {
        if enabled == self.loop_enabled {
            return;
        }
        // Re-anchor within the current lap so the position carries over.
        let origin = self
            .state
            .is_playing()
            .then(|| self.clock.now_secs() - self.position_secs());
        if origin.is_some() {
            self.origin_secs = origin;
        }
        self.loop_enabled = enabled;
        if let Some(source) = self.graph.active_source() {
            if let Some(origin) = origin {
                source.set_origin(origin);
            }
            source.set_loop(enabled);
        }
    }

    /// Fraction of the track played, in `[0, 1]`; 0 unless playing.
    pub fn progress(&self) -> f64 {
        if !self.state.is_playing() {
            return 0.0;
        }
        match self.duration_secs() {
            Some(duration) if duration > 0.0 => (self.position_secs() / duration).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Transition a finished non-looping track back to `Loaded`.
    ///
    /// Returns `true` if the track ended on this call.
    pub fn poll_end_of_track(&mut self) -> bool {
        if !self.state.is_playing() || self.loop_enabled {
            return false;
        }
        let Some(duration) = self.duration_secs() else {
            return false;
        };
        if self.elapsed_secs() < duration {
            return false;
        }

        self.halt();
        self.bus.log("Playback finished.", Severity::Info);
        self.bus.emit(EngineEvent::PlaybackEnded);
        self.bus.emit(EngineEvent::PlaybackStopped);
        true
    }

    fn halt(&mut self) {
        self.graph.teardown_source();
        self.paused_offset_secs = 0.0;
        self.origin_secs = None;
        self.state = PlaybackState::Loaded;
    }

    fn elapsed_secs(&self) -> f64 {
        self.origin_secs
            .map(|origin| (self.clock.now_secs() - origin).max(0.0))
            .unwrap_or(self.paused_offset_secs)
    }

    /// Current position within the track, wrapped when looping.
    fn position_secs(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        let Some(duration) = self.duration_secs().filter(|d| *d > 0.0) else {
            return 0.0;
        };
        if self.loop_enabled {
            elapsed % duration
        } else {
            elapsed.min(duration)
        }
    }
}

/// Clamp into `[MIN_VOLUME, MAX_VOLUME]`; `None` for NaN.
pub fn clamp_volume(volume: f32) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(MIN_VOLUME, MAX_VOLUME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::bus::tests::Recorder;
    use crate::traits::clock::ManualClock;
    use approx::assert_relative_eq;

    const RATE: u32 = 1_000;

    fn setup() -> (PlaybackController, Arc<ManualClock>, Arc<Recorder>) {
        let clock = Arc::new(ManualClock::new());
        let bus = NotificationBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(recorder.clone());
        let controller =
            PlaybackController::new(StreamGraphBuilder::new(RATE, 1, clock.clone()), bus, 1.0, false);
        (controller, clock, recorder)
    }

    fn asset(seconds: f64) -> AudioAsset {
        AudioAsset::new(vec![0.5; (seconds * RATE as f64) as usize], RATE, 1, None)
    }

    #[test]
    fn volume_is_always_clamped() {
        let (mut c, _, _) = setup();
        for (input, expected) in [(-1.0, 0.0), (0.0, 0.0), (0.7, 0.7), (2.0, 2.0), (5.0, 2.0)] {
            assert_relative_eq!(c.set_volume(input), expected);
            assert_relative_eq!(c.volume(), expected);
        }
        assert_relative_eq!(c.set_volume(f32::INFINITY), 2.0);
        assert_relative_eq!(c.set_volume(f32::NEG_INFINITY), 0.0);
        assert_relative_eq!(c.set_volume(f32::NAN), 0.0);
    }

    #[test]
    fn volume_reaches_the_live_gain_stage() {
        let (mut c, _, _) = setup();
        c.load(asset(1.0));
        c.play().unwrap();
        c.set_volume(3.0);
        assert_relative_eq!(c.stream().unwrap().gain(), 2.0);
    }

    #[test]
    fn play_is_noop_when_idle() {
        let (mut c, _, recorder) = setup();
        assert!(!c.play().unwrap());
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.stream().is_none());
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn pause_then_play_resumes_at_offset() {
        let (mut c, clock, _) = setup();
        c.load(asset(10.0));
        c.play().unwrap();
        clock.advance(3.0);
        assert!(c.pause());
        assert_relative_eq!(c.paused_offset_secs(), 3.0);
        assert_eq!(c.progress(), 0.0);

        clock.advance(100.0);
        c.play().unwrap();
        assert_relative_eq!(c.progress(), 0.3);
        let source = c.graph.active_source().unwrap();
        assert_eq!(source.position_frames(), 3 * RATE as usize);
    }

    #[test]
    fn pause_keeps_sink_and_drops_source() {
        let (mut c, _, _) = setup();
        c.load(asset(1.0));
        c.play().unwrap();
        let sink = c.stream().unwrap().clone();
        c.pause();
        assert!(!sink.has_source());
        c.play().unwrap();
        assert!(sink.same_stream(c.stream().unwrap()));
        assert!(sink.has_source());
    }

    #[test]
    fn seek_sets_exact_offset() {
        let (mut c, _, _) = setup();
        c.load(asset(10.0));
        assert!(c.seek(0.5).unwrap());
        assert_eq!(c.paused_offset_secs(), 5.0);
        assert_eq!(c.state(), PlaybackState::Loaded);
    }

    #[test]
    fn seek_while_playing_replays_from_new_offset() {
        let (mut c, clock, _) = setup();
        c.load(asset(10.0));
        c.play().unwrap();
        clock.advance(1.0);
        let old = c.graph.active_source().unwrap();

        c.seek(0.8).unwrap();
        assert_eq!(c.state(), PlaybackState::Playing);
        assert!(old.is_stopped());
        assert_relative_eq!(c.progress(), 0.8);
        assert_eq!(c.graph.active_source().unwrap().position_frames(), 8 * RATE as usize);
    }

    #[test]
    fn seek_clamps_and_ignores_garbage() {
        let (mut c, _, _) = setup();
        assert!(!c.seek(0.5).unwrap());
        c.load(asset(4.0));
        c.seek(1.5).unwrap();
        assert_eq!(c.paused_offset_secs(), 4.0);
        assert!(!c.seek(f64::NAN).unwrap());
        assert_eq!(c.paused_offset_secs(), 4.0);
    }

    #[test]
    fn load_while_playing_stops_previous() {
        let (mut c, clock, recorder) = setup();
        c.load(asset(10.0));
        c.play().unwrap();
        clock.advance(2.0);
        let old = c.graph.active_source().unwrap();
        recorder.take();

        c.load(asset(3.0));
        assert_eq!(c.state(), PlaybackState::Loaded);
        assert_eq!(c.paused_offset_secs(), 0.0);
        assert!(old.is_stopped());
        assert_eq!(c.duration_secs(), Some(3.0));
        assert_eq!(recorder.take_non_log(), vec![EngineEvent::PlaybackStopped]);
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut c, clock, recorder) = setup();
        c.load(asset(5.0));
        c.play().unwrap();
        clock.advance(1.0);
        recorder.take();

        assert!(c.stop());
        assert!(!c.stop());
        assert!(!c.stop());
        assert_eq!(c.state(), PlaybackState::Loaded);
        assert_eq!(c.paused_offset_secs(), 0.0);
        assert_eq!(recorder.take_non_log(), vec![EngineEvent::PlaybackStopped]);
    }

    #[test]
    fn stop_from_paused() {
        let (mut c, clock, _) = setup();
        c.load(asset(5.0));
        c.play().unwrap();
        clock.advance(2.0);
        c.pause();
        assert!(c.stop());
        assert_eq!(c.state(), PlaybackState::Loaded);
        assert_eq!(c.paused_offset_secs(), 0.0);
    }

    #[test]
    fn progress_follows_clock_and_clamps() {
        let (mut c, clock, _) = setup();
        c.load(asset(4.0));
        c.play().unwrap();
        clock.set(2.0);
        assert_relative_eq!(c.progress(), 0.5);
        clock.set(4.1);
        assert_relative_eq!(c.progress(), 1.0);
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn progress_wraps_when_looping() {
        let (mut c, clock, _) = setup();
        c.set_loop(true);
        c.load(asset(4.0));
        c.play().unwrap();
        clock.set(5.0);
        assert_relative_eq!(c.progress(), 0.25);
    }

    #[test]
    fn set_loop_applies_to_active_source() {
        let (mut c, _, _) = setup();
        c.load(asset(1.0));
        c.play().unwrap();
        c.set_loop(true);
        assert!(c.graph.active_source().unwrap().is_looping());
        c.set_loop(false);
        assert!(!c.graph.active_source().unwrap().is_looping());
    }

    #[test]
    fn disabling_loop_mid_lap_keeps_position() {
        let (mut c, clock, _) = setup();
        c.set_loop(true);
        c.load(asset(4.0));
        c.play().unwrap();
        clock.set(9.0);
        c.set_loop(false);
        assert_relative_eq!(c.progress(), 0.25);
        assert!(!c.poll_end_of_track());
    }

    #[test]
    fn end_of_track_returns_to_loaded() {
        let (mut c, clock, recorder) = setup();
        c.load(asset(4.0));
        c.play().unwrap();
        clock.set(3.9);
        assert!(!c.poll_end_of_track());
        recorder.take();

        clock.set(4.0);
        assert!(c.poll_end_of_track());
        assert_eq!(c.state(), PlaybackState::Loaded);
        assert_eq!(c.paused_offset_secs(), 0.0);
        assert_eq!(
            recorder.take_non_log(),
            vec![EngineEvent::PlaybackEnded, EngineEvent::PlaybackStopped]
        );
        assert!(!c.poll_end_of_track());
    }

    #[test]
    fn looping_track_never_ends() {
        let (mut c, clock, _) = setup();
        c.set_loop(true);
        c.load(asset(1.0));
        c.play().unwrap();
        clock.set(50.0);
        assert!(!c.poll_end_of_track());
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn play_while_playing_is_noop() {
        let (mut c, clock, _) = setup();
        c.load(asset(4.0));
        c.play().unwrap();
        clock.set(1.0);
        assert!(!c.play().unwrap());
        assert_relative_eq!(c.progress(), 0.25);
    }

    #[test]
    fn sink_receives_scaled_audio_while_playing() {
        let (mut c, _, _) = setup();
        c.load(asset(1.0));
        c.set_volume(0.5);
        c.play().unwrap();
        let mut out = [0.0; 16];
        c.stream().unwrap().read(&mut out);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    fn ramp(seconds: f64) -> AudioAsset {
        let frames = (seconds * RATE as f64) as usize;
        AudioAsset::new((0..frames).map(|i| i as f32).collect(), RATE, 1, None)
    }

    #[test]
    fn every_holder_hears_the_track_from_the_start() {
        let (mut c, _, _) = setup();
        c.load(ramp(10.0));
        c.play().unwrap();
        let a = c.stream().unwrap().clone();
        let b = c.stream().unwrap().clone();

        let mut heard_a = [0.0; 4];
        let mut heard_b = [0.0; 4];
        a.read(&mut heard_a);
        b.read(&mut heard_b);
        assert_eq!(heard_a, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(heard_b, [0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn delivered_audio_tracks_progress_across_pause() {
        let (mut c, clock, _) = setup();
        c.load(ramp(10.0));
        c.play().unwrap();
        let reader = c.stream().unwrap().clone();

        let mut head = vec![0.0; 500];
        reader.read(&mut head);
        assert_eq!(head[499], 499.0);

        // Reader stalls while the transport keeps running.
        clock.advance(3.0);
        let mut out = [0.0; 2];
        reader.read(&mut out);
        assert_eq!(out, [3_000.0, 3_001.0]);
        assert_relative_eq!(c.progress(), 0.3);

        c.pause();
        assert_relative_eq!(c.paused_offset_secs(), 3.0);
        clock.advance(10.0);
        c.play().unwrap();
        reader.read(&mut out);
        assert_eq!(out, [3_000.0, 3_001.0]);
    }

    #[test]
    fn seek_moves_what_holders_hear() {
        let (mut c, clock, _) = setup();
        c.load(ramp(10.0));
        c.play().unwrap();
        let reader = c.stream().unwrap().clone();
        let mut out = [0.0; 2];
        reader.read(&mut out);

        clock.advance(0.1);
        c.seek(0.5).unwrap();
        reader.read(&mut out);
        assert_eq!(out, [5_000.0, 5_001.0]);
    }

    #[test]
    fn disabling_loop_keeps_rendered_position() {
        let (mut c, clock, _) = setup();
        c.set_loop(true);
        c.load(ramp(4.0));
        c.play().unwrap();
        clock.set(9.0);
        c.set_loop(false);
        assert_eq!(c.graph.active_source().unwrap().position_frames(), RATE as usize);
    }
}
