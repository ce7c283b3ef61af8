//! Discord API model types.

use serde::{Deserialize, Serialize};

use crate::presentation::{PayloadImage, RenderedPayload, CHART_FILENAME};

/// Body of a create or edit message request.
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub embeds: Vec<Embed>,
    /// Replaces the message's attachments; empty clears a stale chart.
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentRef {
    pub id: u32,
    pub filename: String,
}

/// Channel object, reduced to what resolution needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Message object, reduced to its identity.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    pub id: String,
    pub channel_id: String,
}

/// The authenticated bot user.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

impl MessageBody {
    /// Build the request body; a chart is referenced as an uploaded attachment.
    pub fn from_payload(payload: &RenderedPayload) -> Self {
        let (image, attachments) = match &payload.image {
            Some(PayloadImage::Banner { url }) => (Some(EmbedImage { url: url.clone() }), Vec::new()),
            Some(PayloadImage::Chart { .. }) => (
                Some(EmbedImage {
                    url: format!("attachment://{}", CHART_FILENAME),
                }),
                vec![AttachmentRef {
                    id: 0,
                    filename: CHART_FILENAME.to_string(),
                }],
            ),
            None => (None, Vec::new()),
        };

        let embed = Embed {
            title: payload.title.clone(),
            description: payload.status_line.clone(),
            color: payload.color,
            timestamp: payload.timestamp.to_rfc3339(),
            fields: payload
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
            author: (!payload.heading.is_empty()).then(|| EmbedAuthor {
                name: payload.heading.clone(),
            }),
            footer: payload.footer.clone().map(|text| EmbedFooter { text }),
            image,
        };

        Self {
            embeds: vec![embed],
            attachments,
        }
    }
}
