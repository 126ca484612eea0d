//! Backoffice API client

use bo_common::ApiResponse;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::notify::{Notifier, TracingNotifier};
use crate::token::{TokenProvider, TokenSource};

/// Client for the platform REST API
///
/// Every call waits (bounded) for an identity token and attaches it as a
/// bearer credential. Non-2xx responses come back as [`SdkError::Http`].
/// Successful mutations hand their envelope `message` to the [`Notifier`].
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    http_client: reqwest::Client,
    tokens: TokenProvider,
    notifier: Arc<dyn Notifier>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, tokens: impl TokenSource + 'static) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let tokens = TokenProvider::new(Arc::new(tokens), config.token_wait_attempts, config.token_wait_delay);

        Ok(Self {
            config: Arc::new(config),
            http_client,
            tokens,
            notifier: Arc::new(TracingNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await?.data.ok_or(SdkError::EmptyData)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(body)).await?.data.ok_or(SdkError::EmptyData)
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PUT, path, Some(body)).await?.data.ok_or(SdkError::EmptyData)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request::<(), serde_json::Value>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Send a request and return the full response envelope
    pub async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<ApiResponse<T>>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self.http_client.request(method.clone(), &url);

        match self.tokens.wait_for_token().await {
            Some(token) => builder = builder.bearer_auth(token),
            None => debug!(%url, "Sending request without identity token"),
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SdkError::from_status(status, &text));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
        if is_mutation(&method) && !envelope.message.is_empty() {
            self.notifier.notify(&envelope.message);
        }
        Ok(envelope)
    }
}

fn is_mutation(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
