//! Discord REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};

use super::models::*;
use super::{ChatClient, ChatError, Destination, MessageHandle};
use crate::config::DiscordConfig;
use crate::presentation::{RenderedPayload, CHART_FILENAME};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("DiscordBot (serverwatch, ", env!("CARGO_PKG_VERSION"), ")");

/// Bot-authenticated client for the Discord REST API.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Fetch the bot's own user; fails when the token is rejected.
    pub async fn current_user(&self) -> Result<CurrentUser, ChatError> {
        let resp = self.request(reqwest::Method::GET, "/users/@me").send().await?;
        Ok(check(resp).await?.json().await?)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Attach the payload, as multipart when a chart must be uploaded.
    fn with_payload(&self, req: RequestBuilder, payload: &RenderedPayload) -> Result<RequestBuilder, ChatError> {
        let body = MessageBody::from_payload(payload);

        let Some(png) = payload.chart_png() else {
            return Ok(req.json(&body));
        };

        let json = serde_json::to_string(&body).map_err(|e| ChatError::Encode(e.to_string()))?;
        let form = Form::new()
            .part("payload_json", Part::text(json).mime_str("application/json")?)
            .part(
                "files[0]",
                Part::bytes(png.to_vec())
                    .file_name(CHART_FILENAME)
                    .mime_str("image/png")?,
            );
        Ok(req.multipart(form))
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn resolve(&self, channel_id: &str) -> Result<Option<Destination>, ChatError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/channels/{}", channel_id))
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Ok(None);
        }

        let channel: ChannelObject = check(resp).await?.json().await?;
        Ok(Some(Destination {
            channel_id: channel.id,
            name: channel.name,
        }))
    }

    async fn send(&self, destination: &Destination, payload: &RenderedPayload) -> Result<MessageHandle, ChatError> {
        let req = self.request(
            reqwest::Method::POST,
            &format!("/channels/{}/messages", destination.channel_id),
        );
        let resp = self.with_payload(req, payload)?.send().await?;
        let message: MessageObject = check(resp).await?.json().await?;

        Ok(MessageHandle {
            channel_id: message.channel_id,
            message_id: message.id,
        })
    }

    async fn edit(&self, handle: &MessageHandle, payload: &RenderedPayload) -> Result<(), ChatError> {
        let req = self.request(
            reqwest::Method::PATCH,
            &format!("/channels/{}/messages/{}", handle.channel_id, handle.message_id),
        );
        let resp = self.with_payload(req, payload)?.send().await?;
        check(resp).await?;
        Ok(())
    }
}

/// Turn non-2xx responses into `ChatError::Api`.
async fn check(resp: Response) -> Result<Response, ChatError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChatError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::PayloadImage;
    use axum::{
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::{IntoResponse, Json},
        routing::{get, patch, post},
        Router,
    };
    use chrono::Utc;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    impl Recorded {
        fn push(&self, headers: &HeaderMap, body: &Bytes) {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            self.requests.lock().unwrap().push((
                header("authorization"),
                header("content-type"),
                String::from_utf8_lossy(body).into_owned(),
            ));
        }
    }

    async fn get_channel(Path(id): Path<String>) -> impl IntoResponse {
        if id == "missing" {
            return (AxumStatus::NOT_FOUND, Json(json!({"message": "Unknown Channel"}))).into_response();
        }
        Json(json!({"id": id, "name": "status", "type": 0})).into_response()
    }

    async fn create_message(
        State(rec): State<Recorded>,
        Path(id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        rec.push(&headers, &body);
        Json(json!({"id": "m1", "channel_id": id}))
    }

    async fn edit_message(
        State(rec): State<Recorded>,
        Path((id, mid)): Path<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        rec.push(&headers, &body);
        if mid == "gone" {
            return (AxumStatus::NOT_FOUND, "Unknown Message").into_response();
        }
        Json(json!({"id": mid, "channel_id": id})).into_response()
    }

    async fn me() -> impl IntoResponse {
        Json(json!({"id": "42", "username": "serverwatch"}))
    }

    async fn fake_api() -> (DiscordClient, Recorded) {
        let rec = Recorded::default();
        let router = Router::new()
            .route("/users/@me", get(me))
            .route("/channels/{id}", get(get_channel))
            .route("/channels/{id}/messages", post(create_message))
            .route("/channels/{id}/messages/{mid}", patch(edit_message))
            .with_state(rec.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = DiscordClient::new(&DiscordConfig {
            token: "secret".to_string(),
            api_base: format!("http://{}/", addr),
        })
        .unwrap();
        (client, rec)
    }

    fn payload(image: Option<PayloadImage>) -> RenderedPayload {
        RenderedPayload {
            heading: "Server Status".to_string(),
            title: "Survival".to_string(),
            status_line: "🟢 Online".to_string(),
            color: 0,
            fields: Vec::new(),
            footer: None,
            timestamp: Utc::now(),
            image,
        }
    }

    #[tokio::test]
    async fn test_current_user() {
        let (client, _) = fake_api().await;
        let me = client.current_user().await.unwrap();
        assert_eq!(me.username, "serverwatch");
    }

    #[tokio::test]
    async fn test_resolve() {
        let (client, _) = fake_api().await;
        let dest = client.resolve("123").await.unwrap().unwrap();
        assert_eq!(dest.channel_id, "123");
        assert_eq!(dest.name.as_deref(), Some("status"));

        assert!(client.resolve("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_json_and_multipart() {
        let (client, rec) = fake_api().await;
        let dest = Destination {
            channel_id: "123".to_string(),
            name: None,
        };

        let handle = client.send(&dest, &payload(None)).await.unwrap();
        assert_eq!(
            handle,
            MessageHandle {
                channel_id: "123".to_string(),
                message_id: "m1".to_string()
            }
        );

        client
            .send(&dest, &payload(Some(PayloadImage::Chart { png: b"PNGDATA".to_vec() })))
            .await
            .unwrap();

        let requests = rec.requests.lock().unwrap();
        let (auth, content_type, body) = &requests[0];
        assert_eq!(auth, "Bot secret");
        assert!(content_type.starts_with("application/json"));
        assert!(body.contains("\"embeds\""));

        let (_, content_type, body) = &requests[1];
        assert!(content_type.starts_with("multipart/form-data"));
        assert!(body.contains("name=\"payload_json\""));
        assert!(body.contains("filename=\"chart.png\""));
        assert!(body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn test_edit_reports_api_errors() {
        let (client, _) = fake_api().await;
        let ok = MessageHandle {
            channel_id: "123".to_string(),
            message_id: "m1".to_string(),
        };
        client.edit(&ok, &payload(None)).await.unwrap();

        let gone = MessageHandle {
            channel_id: "123".to_string(),
            message_id: "gone".to_string(),
        };
        match client.edit(&gone, &payload(None)).await {
            Err(ChatError::Api { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
