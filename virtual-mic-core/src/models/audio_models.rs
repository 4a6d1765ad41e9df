use serde::{Deserialize, Serialize};

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    Usb,
    Virtual,
    Unknown,
}

/// An audio capture device, real or virtual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

impl AudioSource {
    /// Descriptor advertised for the engine's own stream.
    pub fn virtual_microphone() -> Self {
        Self {
            id: "virtual-mic".into(),
            name: "Virtual Microphone".into(),
            is_default: false,
            transport_type: Some(AudioTransportType::Virtual),
        }
    }
}
