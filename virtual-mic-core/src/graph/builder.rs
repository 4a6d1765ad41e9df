use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::models::asset::AudioAsset;
use crate::models::error::CaptureError;
use crate::processing::pcm_convert::PcmConverter;
use crate::traits::clock::Clock;

use super::sink::VirtualStream;
use super::source::SourceStage;

/// How a freshly built source should start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceOptions {
    pub loop_enabled: bool,
    /// Clock time at which frame 0 of the track would have played.
    pub origin_secs: f64,
}

/// Wires `source → gain → sink` and owns the single output sink.
///
/// ```text
/// [AudioAsset] → conform → [SourceStage] → [GainStage] → [VirtualStream sink]
///                              ↑ replaced on play/seek       ↑ created once
/// ```
pub struct StreamGraphBuilder {
    converter: PcmConverter,
    sink: Option<VirtualStream>,
    conformed: Option<(Uuid, Arc<[f32]>)>,
    clock: Arc<dyn Clock>,
}

impl StreamGraphBuilder {
    pub fn new(sample_rate: u32, channels: u16, clock: Arc<dyn Clock>) -> Self {
        Self {
            converter: PcmConverter::new(sample_rate, channels),
            sink: None,
            conformed: None,
            clock,
        }
    }

    /// Clock that positions every source this builder creates.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sink(&self) -> Option<&VirtualStream> {
        self.sink.as_ref()
    }

    /// Return the live sink, creating it on first use.
    pub fn ensure_sink(&mut self, gain: f32) -> Result<VirtualStream, CaptureError> {
        if let Some(sink) = &self.sink {
            return Ok(sink.clone());
        }

        let PcmConverter {
            target_sample_rate,
            target_channels,
        } = self.converter;
        if target_sample_rate == 0 {
            return Err(CaptureError::CaptureUnavailable(
                "output sample rate is zero".into(),
            ));
        }
        if !(1..=8).contains(&target_channels) {
            return Err(CaptureError::CaptureUnavailable(format!(
                "unsupported output channel count: {}",
                target_channels
            )));
        }

        let sink = VirtualStream::new(target_sample_rate, target_channels, gain);
        debug!(
            "created virtual sink {} ({} Hz x{})",
            sink.id(),
            target_sample_rate,
            target_channels
        );
        self.sink = Some(sink.clone());
        Ok(sink)
    }

    /// Attach a new source for `asset` to the sink.
    ///
    /// The previous source, if any, is stopped after the swap so the sink
    /// never observes a gap. The sink identity is unchanged.
    pub fn build(
        &mut self,
        asset: &AudioAsset,
        gain: f32,
        options: SourceOptions,
    ) -> Result<VirtualStream, CaptureError> {
        let sink = self.ensure_sink(gain)?;
        sink.set_gain(gain);

        let pcm = self.conformed_pcm(asset);
        let source = Arc::new(SourceStage::new(
            pcm,
            sink.channels(),
            sink.sample_rate(),
            Arc::clone(&self.clock),
            options.origin_secs,
            options.loop_enabled,
        ));

        if let Some(previous) = sink.attach_source(source) {
            previous.stop();
        }
        debug!(
            "attached source anchored at {:.3}s (loop: {})",
            options.origin_secs, options.loop_enabled
        );
        Ok(sink)
    }

    /// Stop and disconnect the active source. Safe to call repeatedly.
    ///
    /// Returns `true` if a source was actually torn down.
    pub fn teardown_source(&self) -> bool {
        let Some(source) = self.sink.as_ref().and_then(|s| s.detach_source()) else {
            return false;
        };
        source.stop();
        true
    }

    pub fn active_source(&self) -> Option<Arc<SourceStage>> {
        self.sink.as_ref().and_then(|s| s.source())
    }

    /// Live volume change on the gain stage, independent of transport state.
    pub fn set_gain(&self, gain: f32) {
        if let Some(sink) = &self.sink {
            sink.set_gain(gain);
        }
    }

    /// Drop the cached conversion of a replaced asset.
    pub fn forget_asset(&mut self) {
        self.conformed = None;
    }

    fn conformed_pcm(&mut self, asset: &AudioAsset) -> Arc<[f32]> {
        if let Some((id, pcm)) = &self.conformed {
            if *id == asset.id() {
                return Arc::clone(pcm);
            }
        }

        let pcm: Arc<[f32]> = if asset.sample_rate() == self.converter.target_sample_rate
            && asset.channels() == self.converter.target_channels
        {
            Arc::clone(asset.samples())
        } else {
            self.converter.conform(asset).into()
        };
        self.conformed = Some((asset.id(), Arc::clone(&pcm)));
        pcm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::clock::ManualClock;

    /// Source options that start playback `offset` seconds in at clock 0.
    fn options(offset: f64) -> SourceOptions {
        SourceOptions {
            loop_enabled: false,
            origin_secs: -offset,
        }
    }

    fn builder(sample_rate: u32, channels: u16) -> StreamGraphBuilder {
        StreamGraphBuilder::new(sample_rate, channels, Arc::new(ManualClock::new()))
    }

    #[test]
    fn sink_is_created_lazily_and_once() {
        let mut graph = builder(8_000, 1);
        assert!(graph.sink().is_none());
        let a = graph.ensure_sink(1.0).unwrap();
        let b = graph.ensure_sink(0.5).unwrap();
        assert!(a.same_stream(&b));
    }

    #[test]
    fn invalid_format_is_unavailable() {
        let mut graph = builder(0, 2);
        assert!(matches!(
            graph.ensure_sink(1.0),
            Err(CaptureError::CaptureUnavailable(_))
        ));
    }

    #[test]
    fn rebuild_replaces_only_the_source() {
        let asset = AudioAsset::new(vec![0.25; 8_000], 8_000, 1, None);
        let mut graph = builder(8_000, 1);

        let first = graph.build(&asset, 1.0, options(0.0)).unwrap();
        let old_source = graph.active_source().unwrap();
        let second = graph.build(&asset, 1.0, options(0.5)).unwrap();

        assert!(first.same_stream(&second));
        assert!(old_source.is_stopped());
        assert_eq!(graph.active_source().unwrap().position_frames(), 4_000);
    }

    #[test]
    fn teardown_is_idempotent() {
        let asset = AudioAsset::new(vec![0.25; 800], 8_000, 1, None);
        let mut graph = builder(8_000, 1);
        assert!(!graph.teardown_source());

        let sink = graph.build(&asset, 1.0, options(0.0)).unwrap();
        assert!(graph.teardown_source());
        assert!(!graph.teardown_source());
        assert!(!sink.has_source());
    }

    #[test]
    fn gain_applies_live() {
        let asset = AudioAsset::new(vec![1.0; 800], 8_000, 1, None);
        let mut graph = builder(8_000, 1);
        let sink = graph.build(&asset, 1.0, options(0.0)).unwrap();

        graph.set_gain(0.25);
        let mut out = [0.0; 4];
        sink.read(&mut out);
        assert_eq!(out, [0.25; 4]);
    }

    #[test]
    fn converts_to_sink_format() {
        let asset = AudioAsset::new(vec![0.5; 4_000], 4_000, 1, None);
        let mut graph = builder(8_000, 2);
        graph.build(&asset, 1.0, options(0.0)).unwrap();
        assert_eq!(graph.active_source().unwrap().total_frames(), 8_000);
    }
}
