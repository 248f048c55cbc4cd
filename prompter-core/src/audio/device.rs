//! Audio input device enumeration (spec §6 "Invoked").
//!
//! cpal exposes no stable cross-platform device identifier, so `id` and
//! `uid` are both the device's name as reported by the OS — stable
//! enough across runs to persist as a device selection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub uid: String,
    pub name: String,
}

/// Lists available input devices. Returns an empty `Vec` if cpal is
/// unavailable or enumeration fails.
#[cfg(feature = "audio-cpal")]
pub fn enumerate_audio_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device.name().unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                DeviceInfo { id: name.clone(), uid: name.clone(), name }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn enumerate_audio_input_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

/// Resolves a persisted `uid` back to a currently-valid device id, or
/// `None` if that device is no longer present (the caller should fall
/// back to the system default input).
pub fn resolve_device_id(uid: &str) -> Option<String> {
    enumerate_audio_input_devices().into_iter().find(|d| d.uid == uid).map(|d| d.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_device_id_is_none_for_unknown_uid() {
        assert_eq!(resolve_device_id("definitely-not-a-real-device-uid"), None);
    }
}
