//! CPTV value objects.
//!
//! Immutable snapshots produced by a decoding engine. Field names serialize in
//! camelCase so they match the JSON shape existing CPTV consumers expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container-level header of a CPTV recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CptvHeader {
    /// Recording start, microseconds since the Unix epoch.
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub compression: u8,
    pub device_name: String,
    pub fps: u8,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub device_id: Option<u32>,
    pub serial_number: Option<u32>,
    pub firmware_version: Option<String>,
    /// Opaque motion-detection configuration blob.
    pub motion_config: Option<String>,
    pub preview_secs: Option<u8>,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    pub loc_timestamp: Option<u64>,
    pub altitude: Option<f32>,
    pub accuracy: Option<f32>,
    pub has_background_frame: bool,
    /// Present when the container embeds its own frame count.
    pub total_frames: Option<u32>,
    pub min_value: Option<u16>,
    pub max_value: Option<u16>,
}

impl CptvHeader {
    /// Recording start as a UTC time, if the timestamp is representable.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.timestamp / 1_000_000).ok()?;
        let nanos = (self.timestamp % 1_000_000) as u32 * 1_000;
        DateTime::from_timestamp(secs, nanos)
    }
}

/// Per-frame image statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub min: u16,
    pub max: u16,
}

/// Header attached to every decoded frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CptvFrameHeader {
    /// Milliseconds the sensor had been powered when the frame was captured.
    pub time_on_ms: u32,
    pub last_ffc_time_ms: Option<u32>,
    pub last_ffc_temp_c: Option<f32>,
    pub frame_temp_c: Option<f32>,
    pub is_background_frame: bool,
    pub image_data: ImageData,
}

/// A decoded frame: `width * height` raw 16-bit samples plus its header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CptvFrame {
    pub data: Vec<u16>,
    pub meta: CptvFrameHeader,
}

impl CptvFrame {
    /// Zero samples means the engine had nothing left to give.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_serializes_camel_case() {
        let header = CptvHeader {
            device_name: "gp-01".into(),
            fps: 9,
            has_background_frame: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["deviceName"], "gp-01");
        assert_eq!(json["hasBackgroundFrame"], true);
        assert!(json["totalFrames"].is_null());
    }

    #[test]
    fn test_recorded_at_from_micros() {
        let header = CptvHeader {
            timestamp: 1_600_000_000_000_000,
            ..Default::default()
        };
        assert_eq!(header.recorded_at().unwrap().timestamp(), 1_600_000_000);

        let overflow = CptvHeader {
            timestamp: u64::MAX,
            ..Default::default()
        };
        assert!(overflow.recorded_at().is_none());
    }

    #[test]
    fn test_frame_header_round_trips_image_data() {
        let meta = CptvFrameHeader {
            time_on_ms: 1200,
            image_data: ImageData {
                width: 160,
                height: 120,
                min: 2800,
                max: 3400,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"timeOnMs\":1200"));
        assert!(json.contains("\"imageData\""));
    }
}
