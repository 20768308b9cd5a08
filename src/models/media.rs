use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of media submitted for colorization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Content type of the uploaded file part.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }

    /// Filename reported in the multipart `Content-Disposition`.
    pub fn upload_filename(self) -> &'static str {
        match self {
            MediaKind::Image => "image.jpg",
            MediaKind::Video => "video.mp4",
        }
    }

    /// Extension used for results when the payload gives no better hint.
    pub fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Video => "mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Guess the kind from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "heic" | "bmp" | "gif" => Some(MediaKind::Image),
            "mp4" | "mov" | "m4v" | "avi" | "mkv" => Some(MediaKind::Video),
            _ => None,
        }
    }
}
