//! Presentation module.
//!
//! Turns a probe result and history snapshot into a message payload.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::chart::ChartRenderer;
use crate::config::{DisplayMode, PresentationConfig, TargetConfig};
use crate::history::HistorySeries;
use crate::probe::ProbeResult;

/// Longest value a single field may carry.
const MAX_FIELD_LEN: usize = 1024;

/// File name the chart is uploaded under.
pub const CHART_FILENAME: &str = "chart.png";

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPayload {
    pub heading: String,
    pub title: String,
    pub status_line: String,
    pub color: u32,
    pub fields: Vec<PayloadField>,
    pub footer: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub image: Option<PayloadImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// The single image attached to a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PayloadImage {
    Banner { url: String },
    Chart {
        #[serde(skip)]
        png: Vec<u8>,
    },
}

impl RenderedPayload {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value.as_str())
    }

    pub fn chart_png(&self) -> Option<&[u8]> {
        match &self.image {
            Some(PayloadImage::Chart { png }) => Some(png.as_slice()),
            _ => None,
        }
    }
}

/// Builds payloads using the global presentation defaults.
pub struct PresentationBuilder {
    config: PresentationConfig,
    renderer: Arc<dyn ChartRenderer>,
}

impl PresentationBuilder {
    pub fn new(config: PresentationConfig, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { config, renderer }
    }

    pub fn renderer(&self) -> &dyn ChartRenderer {
        self.renderer.as_ref()
    }

    pub fn build(
        &self,
        target: &TargetConfig,
        result: &ProbeResult,
        history: &HistorySeries,
        now: DateTime<Utc>,
    ) -> RenderedPayload {
        let (host, port) = target.endpoint();
        let mut fields = vec![field("Address", format!("{}:{}", host, port), false)];

        let (status_line, color) = match result {
            ProbeResult::Online(status) => {
                fields.push(field("Players", format!("{}/{}", status.players, status.max_players), true));
                fields.push(field("Version", non_empty(&status.version, "Unknown"), true));
                fields.push(field("Latency", format!("{} ms", status.latency_ms), true));
                fields.push(field("MOTD", non_empty(&status.motd, &self.config.motd_fallback), false));

                if target.show_next_update {
                    let interval = ChronoDuration::from_std(target.update_interval())
                        .unwrap_or_else(|_| ChronoDuration::seconds(60));
                    let next = now + interval;
                    fields.push(field("Next update", format!("<t:{}:R>", next.timestamp()), false));
                }

                ("🟢 Online".to_string(), self.config.online_color.to_u32())
            }
            ProbeResult::Offline { error } => {
                fields.push(field("Error", non_empty(error, &self.config.offline_fallback), false));
                ("🔴 Offline".to_string(), self.config.offline_color.to_u32())
            }
        };

        RenderedPayload {
            heading: self.config.title.clone(),
            title: target.name.clone(),
            status_line,
            color,
            fields,
            footer: self.config.footer.clone(),
            timestamp: now,
            image: self.image_for(target, result, history),
        }
    }

    fn image_for(&self, target: &TargetConfig, result: &ProbeResult, history: &HistorySeries) -> Option<PayloadImage> {
        match target.display {
            DisplayMode::Banner => target
                .banner_url
                .as_ref()
                .map(|url| PayloadImage::Banner { url: url.clone() }),
            // History only moves on online ticks, so offline never charts.
            DisplayMode::Chart if result.is_online() => match self.renderer.render(history, target.chart_color) {
                Ok(Some(png)) => Some(PayloadImage::Chart { png }),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!("Chart rendering failed for {}: {}", target.name, e);
                    None
                }
            },
            DisplayMode::Chart | DisplayMode::None => None,
        }
    }
}

fn field(name: &str, value: String, inline: bool) -> PayloadField {
    PayloadField {
        name: name.to_string(),
        value: truncate(value, MAX_FIELD_LEN),
        inline,
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn truncate(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}
