use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::header::{ HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use super::{ BackendError, ByteStream, ChatBackend };
use crate::models::chat::ChatRequest;

pub struct WebhookBackend {
    http: HttpClient,
    url: Url,
}

impl WebhookBackend {
    pub fn new(url: &str, connect_timeout: Option<Duration>) -> Result<Self, BackendError> {
        let url = Url::parse(url).map_err(|e|
            BackendError::Config(format!("webhook URL '{}' is invalid: {}", url, e))
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/event-stream, application/x-ndjson, text/plain")
        );

        let mut builder = HttpClient::builder().default_headers(headers);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChatBackend for WebhookBackend {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, BackendError> {
        info!("WebhookBackend::open_stream() → url={} session={}", self.url, request.session_id);

        let resp = self.http.post(self.url.clone()).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                let item = chunk
                    .map(|buf| buf.to_vec())
                    .map_err(|e| BackendError::Stream(e.to_string()));
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Webhook stream receiver dropped; closing response");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
