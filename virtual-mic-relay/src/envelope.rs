//! Outbound stdout lines.

use chrono::{DateTime, Utc};
use serde::Serialize;

use virtual_mic_core::models::events::EngineEvent;
use virtual_mic_core::models::state::PlaybackState;

/// One line on stdout.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Envelope<'a> {
    Event {
        at: DateTime<Utc>,
        event: &'a EngineEvent,
    },
    #[serde(rename_all = "camelCase")]
    LoadResult {
        load_result: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
    },
    Progress {
        at: DateTime<Utc>,
        progress: f64,
        state: PlaybackState,
    },
}

impl<'a> Envelope<'a> {
    pub fn event(event: &'a EngineEvent) -> Self {
        Envelope::Event { at: Utc::now(), event }
    }

    pub fn progress(progress: f64, state: PlaybackState) -> Self {
        Envelope::Progress {
            at: Utc::now(),
            progress,
            state,
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtual_mic_core::models::events::Severity;

    #[test]
    fn event_envelope_shape() {
        let event = EngineEvent::log("Playback started.", Severity::Info);
        let value: serde_json::Value = serde_json::from_str(&Envelope::event(&event).to_line().unwrap()).unwrap();
        assert!(value["at"].is_string());
        assert_eq!(value["event"]["type"], "log");
        assert_eq!(value["event"]["message"], "Playback started.");
    }

    #[test]
    fn load_result_envelope_shape() {
        let line = Envelope::LoadResult {
            load_result: true,
            name: None,
        }
        .to_line()
        .unwrap();
        assert_eq!(line, "{\"loadResult\":true}\n");
    }
}
