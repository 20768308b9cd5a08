use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::media::MediaKind;

/// A past successful colorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub media_kind: MediaKind,

    /// Small JPEG preview, stored base64-encoded.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,

    /// Location of the full result (videos only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_reference: Option<String>,
}

impl HistoryEntry {
    pub fn image(thumbnail: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            media_kind: MediaKind::Image,
            thumbnail,
            file_reference: None,
        }
    }

    pub fn video(file_reference: Option<String>, thumbnail: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            media_kind: MediaKind::Video,
            thumbnail,
            file_reference,
        }
    }

    /// Day label such as "Apr 22, 2025" in the given time zone.
    pub fn day_label_in<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        self.timestamp
            .with_timezone(tz)
            .format("%b %-d, %Y")
            .to_string()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_thumbnail_is_base64_in_json() {
        let entry = HistoryEntry::image(Some(vec![0xff, 0xd8, 0xff]));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["thumbnail"], "/9j/");
        assert_eq!(json["media_kind"], "Image");
        assert!(json.get("file_reference").is_none());

        let back: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_missing_optional_fields_decode() {
        let json = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "timestamp": "2025-04-22T10:00:00Z",
            "media_kind": "Video"
        }"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.media_kind, MediaKind::Video);
        assert!(entry.thumbnail.is_none());
        assert!(entry.file_reference.is_none());
    }

    #[test]
    fn test_day_label_respects_time_zone() {
        let mut entry = HistoryEntry::image(None);
        entry.timestamp = Utc.with_ymd_and_hms(2025, 4, 22, 23, 30, 0).unwrap();

        assert_eq!(entry.day_label_in(&Utc), "Apr 22, 2025");
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(entry.day_label_in(&plus_two), "Apr 23, 2025");
    }
}
