//! Input device enumeration via the default cpal host.

use cpal::traits::{DeviceTrait, HostTrait};

use virtual_mic_core::models::audio_models::{AudioSource, AudioTransportType};
use virtual_mic_core::models::error::CaptureError;

/// List input (microphone) devices on the default host.
pub fn list_input_devices() -> Result<Vec<AudioSource>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Unknown(format!("failed to enumerate input devices: {}", e)))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioSource {
            id: name.clone(),
            is_default: default_name.as_deref() == Some(name.as_str()),
            transport_type: Some(transport_from_name(&name)),
            name,
        })
        .collect())
}

/// Find an input device by its name, or the default one.
pub(crate) fn find_input_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        None => host.default_input_device().ok_or(CaptureError::DeviceNotAvailable),
        Some(name) => host
            .input_devices()
            .map_err(|_| CaptureError::DeviceNotAvailable)?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or(CaptureError::DeviceNotAvailable),
    }
}

/// Best-effort guess; cpal does not expose the bus a device sits on.
pub(crate) fn transport_from_name(name: &str) -> AudioTransportType {
    let lower = name.to_lowercase();
    if ["bluetooth", "airpods", "hands-free", "headset (bt"]
        .iter()
        .any(|k| lower.contains(k))
    {
        AudioTransportType::Bluetooth
    } else if lower.contains("usb") {
        AudioTransportType::Usb
    } else if ["built-in", "internal", "macbook"].iter().any(|k| lower.contains(k)) {
        AudioTransportType::BuiltIn
    } else if ["virtual", "blackhole", "loopback", "cable"].iter().any(|k| lower.contains(k)) {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_guess_from_name() {
        assert_eq!(transport_from_name("AirPods Pro"), AudioTransportType::Bluetooth);
        assert_eq!(transport_from_name("USB Audio CODEC"), AudioTransportType::Usb);
        assert_eq!(transport_from_name("MacBook Pro Microphone"), AudioTransportType::BuiltIn);
        assert_eq!(transport_from_name("BlackHole 2ch"), AudioTransportType::Virtual);
        assert_eq!(transport_from_name("Mic 3"), AudioTransportType::Unknown);
    }
}
