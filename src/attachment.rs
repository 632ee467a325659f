//! Media attachments extracted from `m.room.message` events.

use matrix_media::{EncryptedFile, MediaSource};
use serde::Deserialize;

/// Marker key set on `m.audio` messages recorded as voice notes (MSC3245).
const VOICE_MARKER: &str = "org.matrix.msc3245.voice";

/// Extension used when neither the mimetype nor the body name one.
const DEFAULT_VOICE_EXTENSION: &str = "ogg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    VoiceMessage,
    Audio,
    Image,
    Video,
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub event_id: Option<String>,
    pub source: MediaSource,
    pub mimetype: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomMessageEvent {
    #[serde(default)]
    event_id: Option<String>,
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    msgtype: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    file: Option<EncryptedFile>,
    #[serde(default)]
    info: Option<MediaInfo>,
    #[serde(rename = "org.matrix.msc3245.voice", default)]
    voice: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    #[serde(default)]
    mimetype: Option<String>,
}

impl Attachment {
    /// Build an attachment from a raw room message event.
    ///
    /// Returns `None` for messages that carry no media.
    pub fn from_event(event: &serde_json::Value) -> Option<Self> {
        let event = RoomMessageEvent::deserialize(event).ok()?;
        let content = event.content;

        let kind = match content.msgtype.as_str() {
            "m.audio" if content.voice.is_some() => AttachmentKind::VoiceMessage,
            "m.audio" => AttachmentKind::Audio,
            "m.image" => AttachmentKind::Image,
            "m.video" => AttachmentKind::Video,
            "m.file" => AttachmentKind::File,
            _ => return None,
        };

        let source = match (content.file, content.url) {
            (Some(file), _) => MediaSource::Encrypted(Box::new(file)),
            (None, Some(url)) => MediaSource::Plain { url },
            (None, None) => return None,
        };

        Some(Self {
            kind,
            event_id: event.event_id,
            source,
            mimetype: content.info.and_then(|info| info.mimetype),
            body: content.body,
        })
    }

    pub fn is_voice_message(&self) -> bool {
        self.kind == AttachmentKind::VoiceMessage
    }

    /// Event id usable as a cache key, if the event has one.
    pub fn identifier(&self) -> Option<&str> {
        self.event_id.as_deref().filter(|id| !id.is_empty())
    }

    /// File extension for the staged download.
    pub fn file_extension(&self) -> &str {
        if let Some(ext) = self.mimetype.as_deref().and_then(extension_for_mimetype) {
            return ext;
        }
        self.body
            .as_deref()
            .and_then(|body| body.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or(DEFAULT_VOICE_EXTENSION)
    }
}

fn extension_for_mimetype(mimetype: &str) -> Option<&'static str> {
    // Ignore parameters such as `audio/ogg; codecs=opus`.
    let essence = mimetype.split(';').next().unwrap_or("").trim();
    let ext = match essence.to_ascii_lowercase().as_str() {
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/aac" => "aac",
        "audio/flac" => "flac",
        "audio/webm" => "webm",
        _ => return None,
    };
    Some(ext)
}
