//! Common types for WaBulk

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::MAX_MEDIA_BYTES;
use crate::Error;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for per-recipient delivery records
pub type PhoneStatusId = Uuid;

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^7\d{10}$").expect("valid phone regex"))
}

/// Russian mobile number in `7XXXXXXXXXX` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strip every non-digit character
    pub fn normalize(input: &str) -> String {
        input.chars().filter(char::is_ascii_digit).collect()
    }

    /// Parse a phone number from free-form user input
    pub fn parse(input: &str) -> crate::Result<Self> {
        let normalized = Self::normalize(input);
        if phone_pattern().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(Error::Validation(format!("invalid phone number: {}", input)))
        }
    }

    pub fn is_valid(input: &str) -> bool {
        phone_pattern().is_match(&Self::normalize(input))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Kind of WhatsApp message sent through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Voice,
    Sticker,
    Doc,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::Voice => write!(f, "voice"),
            MessageType::Sticker => write!(f, "sticker"),
            MessageType::Doc => write!(f, "doc"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "voice" => Ok(MessageType::Voice),
            "sticker" => Ok(MessageType::Sticker),
            "doc" => Ok(MessageType::Doc),
            _ => Err(format!("Invalid message type: {}", s)),
        }
    }
}

/// MIME types the gateway accepts for media messages
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/ogg",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "audio/mp4",
    "audio/aac",
    "audio/mpeg",
    "audio/ogg",
    "audio/webm",
    "image/gif",
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/svg+xml",
    "image/tiff",
    "image/webp",
    "video/mpeg",
    "video/mp4",
    "video/ogg",
    "video/quicktime",
    "video/webm",
    "video/x-ms-wmv",
    "video/x-flv",
];

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

impl MessageType {
    /// Derive the message type for a media attachment from its MIME type
    pub fn from_mime(mime: &str) -> Self {
        if !is_allowed_mime(mime) {
            return MessageType::Doc;
        }
        if mime.starts_with("image/") {
            MessageType::Image
        } else if mime.starts_with("audio/") {
            MessageType::Voice
        } else {
            MessageType::Doc
        }
    }
}

/// Media attached to a campaign
#[derive(Clone, PartialEq, Eq)]
pub struct Media {
    filename: String,
    mime_type: String,
    message_type: MessageType,
    data: Vec<u8>,
}

impl Media {
    /// Build a media value; an empty MIME type is guessed from the filename
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let mut mime_type = mime_type.into();
        if mime_type.trim().is_empty() {
            mime_type = mime_guess::from_path(&filename)
                .first()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
        }
        let message_type = MessageType::from_mime(&mime_type);
        Self {
            filename,
            mime_type,
            message_type,
            data,
        }
    }

    /// Rebuild media from stored metadata without re-deriving the type
    pub fn restore(
        filename: String,
        mime_type: String,
        message_type: MessageType,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename,
            mime_type,
            message_type,
            data,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_valid(&self) -> bool {
        !self.filename.is_empty()
            && !self.mime_type.is_empty()
            && !self.data.is_empty()
            && self.data.len() <= MAX_MEDIA_BYTES
            && is_allowed_mime(&self.mime_type)
    }
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("message_type", &self.message_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Finished | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CampaignStatus::Pending | CampaignStatus::Started)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Pending => write!(f, "pending"),
            CampaignStatus::Started => write!(f, "started"),
            CampaignStatus::Finished => write!(f, "finished"),
            CampaignStatus::Failed => write!(f, "failed"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "started" => Ok(CampaignStatus::Started),
            "finished" => Ok(CampaignStatus::Finished),
            "failed" => Ok(CampaignStatus::Failed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Per-recipient delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientStatus::Pending => write!(f, "pending"),
            RecipientStatus::Sent => write!(f, "sent"),
            RecipientStatus::Failed => write!(f, "failed"),
            RecipientStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecipientStatus::Pending),
            "sent" => Ok(RecipientStatus::Sent),
            "failed" => Ok(RecipientStatus::Failed),
            "cancelled" => Ok(RecipientStatus::Cancelled),
            _ => Err(format!("Invalid recipient status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phone_normalization() {
        let phone = PhoneNumber::parse("+7 (999) 000-11-22").unwrap();
        assert_eq!(phone.as_str(), "79990001122");
        assert!(PhoneNumber::parse("89990001122").is_err());
        assert!(PhoneNumber::parse("7999000112").is_err());
        assert!(PhoneNumber::parse("").is_err());
    }

    #[test]
    fn test_phone_normalize_idempotent() {
        for input in ["+7 (999) 000-11-22", "abc", "7-999-000-11-22 ext 5"] {
            let once = PhoneNumber::normalize(input);
            assert_eq!(PhoneNumber::normalize(&once), once);
        }
    }

    #[test]
    fn test_phone_deserialize_validates() {
        let phone: PhoneNumber = serde_json::from_str("\"+79990001122\"").unwrap();
        assert_eq!(phone.to_string(), "79990001122");
        assert!(serde_json::from_str::<PhoneNumber>("\"123\"").is_err());
    }

    #[test]
    fn test_message_type_from_mime() {
        assert_eq!(MessageType::from_mime("image/png"), MessageType::Image);
        assert_eq!(MessageType::from_mime("audio/ogg"), MessageType::Voice);
        assert_eq!(MessageType::from_mime("video/mp4"), MessageType::Doc);
        assert_eq!(MessageType::from_mime("application/pdf"), MessageType::Doc);
        // Unknown image types collapse to doc
        assert_eq!(MessageType::from_mime("image/bmp"), MessageType::Doc);
    }

    #[test]
    fn test_media_guesses_mime_from_extension() {
        let media = Media::new("photo.png", "", vec![1, 2, 3]);
        assert_eq!(media.mime_type(), "image/png");
        assert_eq!(media.message_type(), MessageType::Image);
        assert!(media.is_valid());

        let unknown = Media::new("blob.unknownext", "", vec![1]);
        assert_eq!(unknown.mime_type(), "application/octet-stream");
        assert!(!unknown.is_valid());
    }

    #[test]
    fn test_media_validity() {
        assert!(!Media::new("a.pdf", "application/pdf", vec![]).is_valid());
        assert!(!Media::new("", "application/pdf", vec![1]).is_valid());
        assert!(Media::new("a.pdf", "application/pdf", vec![1]).is_valid());
        let oversized = Media::new("a.pdf", "application/pdf", vec![0; MAX_MEDIA_BYTES + 1]);
        assert!(!oversized.is_valid());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("started".parse::<CampaignStatus>(), Ok(CampaignStatus::Started));
        assert!("running".parse::<CampaignStatus>().is_err());
        assert_eq!("sent".parse::<RecipientStatus>(), Ok(RecipientStatus::Sent));
        assert!(CampaignStatus::Cancelled.is_terminal());
        assert!(CampaignStatus::Pending.is_active());
    }
}
