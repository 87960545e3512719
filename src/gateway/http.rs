//! HTTP implementation of [`RemoteGateway`].
//!
//! Talks JSON to the backend's REST API. Routes:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET` | `/libraries/` | list libraries |
//! | `POST` | `/libraries/` | create library |
//! | `GET`/`DELETE` | `/libraries/{id}` | get / delete library |
//! | `GET`/`POST` | `/libraries/{id}/documents` | list / upload documents |
//! | `PUT`/`DELETE` | `/libraries/{id}/documents/{doc}` | update / delete document |
//! | `GET`/`POST` | `/libraries/{id}/conversations` | list / create conversations |
//! | `GET`/`PATCH`/`DELETE` | `/libraries/conversations/{id}` | fetch / rename / delete |
//! | `POST` | `/libraries/conversations/{id}/messages` | append message |
//! | `POST` | `/libraries/{id}/chat` | ask a question |
//! | `GET` | `/health` | liveness |
//!
//! No retry or backoff is applied. A timeout is applied only when one is
//! configured; otherwise a hung call hangs the operation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    ChatRequest, ChatResponse, ConversationRecord, DocumentRecord, DocumentUpdate, LibraryRecord,
    MessageRecord, NewLibrary, RemoteGateway,
};
use crate::config::RemoteConfig;

/// Gateway backed by `reqwest`.
pub struct HttpGateway {
    base_url: String,
    client: Client,
}

impl HttpGateway {
    /// Build a gateway from the `[remote]` config section.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self::with_client(&config.base_url, client))
    }

    /// Build a gateway around an existing client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} failed with {}: {}", what, status, error_detail(&body_text));
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(request, what).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("{} returned a malformed body", what))
    }
}

/// Extract the backend's `{"detail": ...}` message, falling back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d.as_str() {
            Some(s) => s.to_string(),
            None => d.to_string(),
        }))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_libraries(&self) -> Result<Vec<LibraryRecord>> {
        self.send_json(self.client.get(self.url("/libraries/")), "list libraries")
            .await
    }

    async fn get_library(&self, id: &str) -> Result<LibraryRecord> {
        self.send_json(
            self.client.get(self.url(&format!("/libraries/{}", id))),
            "get library",
        )
        .await
    }

    async fn create_library(&self, library: &NewLibrary) -> Result<LibraryRecord> {
        self.send_json(
            self.client.post(self.url("/libraries/")).json(library),
            "create library",
        )
        .await
    }

    async fn delete_library(&self, id: &str) -> Result<()> {
        self.send(
            self.client.delete(self.url(&format!("/libraries/{}", id))),
            "delete library",
        )
        .await?;
        Ok(())
    }

    async fn list_documents(&self, library_id: &str) -> Result<Vec<DocumentRecord>> {
        self.send_json(
            self.client
                .get(self.url(&format!("/libraries/{}/documents", library_id))),
            "list documents",
        )
        .await
    }

    async fn upload_document(
        &self,
        library_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send_json(
            self.client
                .post(self.url(&format!("/libraries/{}/documents", library_id)))
                .multipart(form),
            "upload document",
        )
        .await
    }

    async fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        update: &DocumentUpdate,
    ) -> Result<()> {
        self.send(
            self.client
                .put(self.url(&format!(
                    "/libraries/{}/documents/{}",
                    library_id, document_id
                )))
                .json(update),
            "update document",
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, library_id: &str, document_id: &str) -> Result<()> {
        self.send(
            self.client.delete(self.url(&format!(
                "/libraries/{}/documents/{}",
                library_id, document_id
            ))),
            "delete document",
        )
        .await?;
        Ok(())
    }

    async fn list_conversations(&self, library_id: &str) -> Result<Vec<ConversationRecord>> {
        self.send_json(
            self.client
                .get(self.url(&format!("/libraries/{}/conversations", library_id))),
            "list conversations",
        )
        .await
    }

    async fn create_conversation(
        &self,
        library_id: &str,
        title: &str,
    ) -> Result<ConversationRecord> {
        self.send_json(
            self.client
                .post(self.url(&format!("/libraries/{}/conversations", library_id)))
                .json(&serde_json::json!({ "title": title })),
            "create conversation",
        )
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord> {
        self.send_json(
            self.client
                .get(self.url(&format!("/libraries/conversations/{}", id))),
            "get conversation",
        )
        .await
    }

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        self.send(
            self.client
                .patch(self.url(&format!("/libraries/conversations/{}", id)))
                .json(&serde_json::json!({ "title": title })),
            "update conversation",
        )
        .await?;
        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/libraries/conversations/{}", id))),
            "delete conversation",
        )
        .await?;
        Ok(())
    }

    async fn append_message(&self, conversation_id: &str, message: &MessageRecord) -> Result<()> {
        self.send(
            self.client
                .post(self.url(&format!(
                    "/libraries/conversations/{}/messages",
                    conversation_id
                )))
                .json(message),
            "append message",
        )
        .await?;
        Ok(())
    }

    async fn chat(&self, library_id: &str, request: &ChatRequest) -> Result<ChatResponse> {
        self.send_json(
            self.client
                .post(self.url(&format!("/libraries/{}/chat", library_id)))
                .json(request),
            "chat",
        )
        .await
    }

    async fn health(&self) -> Result<serde_json::Value> {
        self.send_json(self.client.get(self.url("/health")), "health check")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gw = HttpGateway::with_client("http://localhost:8000/", Client::new());
        assert_eq!(gw.base_url(), "http://localhost:8000");
        assert_eq!(gw.url("/libraries/"), "http://localhost:8000/libraries/");
    }

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(error_detail(r#"{"detail":"Library not found"}"#), "Library not found");
        assert_eq!(error_detail("plain failure"), "plain failure");
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"bad"}]}"#),
            r#"[{"msg":"bad"}]"#
        );
    }
}
