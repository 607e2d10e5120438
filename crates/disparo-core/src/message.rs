use serde::{Deserialize, Serialize};

use crate::error::DisparoError;

/// Message kinds, one gateway endpoint each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    MediaUrl,
    MediaFile,
    Location,
    List,
}

impl MessageKind {
    /// Endpoint suffix under `/message/`, e.g. `sendText`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Text => "sendText",
            Self::MediaUrl => "sendMediaUrl",
            Self::MediaFile => "sendMediaFile",
            Self::Location => "sendLocation",
            Self::List => "sendList",
        }
    }

    /// Human-readable name for notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::MediaUrl => "media",
            Self::MediaFile => "file",
            Self::Location => "location",
            Self::List => "list",
        }
    }
}

/// One row of a list message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub row_id: String,
}

/// A titled group of rows in a list message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    #[serde(default)]
    pub rows: Vec<ListRow>,
}

impl ListSection {
    /// Parse the JSON array of sections a list message is built from.
    pub fn parse_all(json: &str) -> Result<Vec<ListSection>, DisparoError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Outbound message content, as entered in a send form.
///
/// Fields hold raw user input; [`Payload::invalid_fields`] checks them before
/// anything reaches the network.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text {
        text: String,
    },
    MediaUrl {
        media_url: String,
        caption: Option<String>,
    },
    MediaFile {
        file_name: String,
        mime_type: Option<String>,
        bytes: Vec<u8>,
        caption: Option<String>,
    },
    Location {
        latitude: String,
        longitude: String,
        name: Option<String>,
        address: Option<String>,
    },
    List {
        title: String,
        description: String,
        button_text: String,
        footer_text: Option<String>,
        sections: Vec<ListSection>,
    },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn media_url(media_url: impl Into<String>) -> Self {
        Self::MediaUrl {
            media_url: media_url.into(),
            caption: None,
        }
    }

    pub fn location(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self::Location {
            latitude: latitude.into(),
            longitude: longitude.into(),
            name: None,
            address: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::MediaUrl { .. } => MessageKind::MediaUrl,
            Self::MediaFile { .. } => MessageKind::MediaFile,
            Self::Location { .. } => MessageKind::Location,
            Self::List { .. } => MessageKind::List,
        }
    }

    /// Names of the required fields that are missing or malformed.
    pub fn invalid_fields(&self) -> Vec<String> {
        let mut bad = Vec::new();
        match self {
            Self::Text { text } => {
                if text.trim().is_empty() {
                    bad.push("text".to_string());
                }
            }
            Self::MediaUrl { media_url, .. } => {
                if media_url.trim().is_empty() {
                    bad.push("media_url".to_string());
                }
            }
            Self::MediaFile {
                file_name, bytes, ..
            } => {
                if file_name.trim().is_empty() || bytes.is_empty() {
                    bad.push("file".to_string());
                }
            }
            Self::Location {
                latitude,
                longitude,
                ..
            } => {
                if parse_coordinate(latitude, 90.0).is_none() {
                    bad.push("latitude".to_string());
                }
                if parse_coordinate(longitude, 180.0).is_none() {
                    bad.push("longitude".to_string());
                }
            }
            Self::List {
                title, sections, ..
            } => {
                if title.trim().is_empty() {
                    bad.push("title".to_string());
                }
                if sections.is_empty() || sections.iter().any(|s| s.rows.is_empty()) {
                    bad.push("sections".to_string());
                }
                for (i, section) in sections.iter().enumerate() {
                    for (j, row) in section.rows.iter().enumerate() {
                        if row.title.trim().is_empty() {
                            bad.push(format!("sections[{i}].rows[{j}].title"));
                        }
                        if row.row_id.trim().is_empty() {
                            bad.push(format!("sections[{i}].rows[{j}].row_id"));
                        }
                    }
                }
            }
        }
        bad
    }
}

/// Parse a latitude/longitude string, rejecting blanks and out-of-range values.
pub fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}
