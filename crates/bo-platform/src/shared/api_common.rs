//! Common API types and utilities

use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request},
    http::{header::CONTENT_TYPE, request::Parts},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};

pub use bo_common::{ApiResponse, CursorPage, PagedResult};

use crate::data::PageRequest;
use crate::shared::error::PlatformError;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: u32 = 200;

const DEFAULT_PAGE_SIZE: u32 = 20;

mod string_or_number {
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize_u32_opt<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNum {
            Num(u32),
            Str(String),
        }

        match Option::<StringOrNum>::deserialize(deserializer)? {
            Some(StringOrNum::Num(n)) => Ok(Some(n)),
            Some(StringOrNum::Str(s)) => s.parse().map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Offset pagination parameters (`pageIndex` is zero-based)
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    #[serde(default, alias = "page", deserialize_with = "string_or_number::deserialize_u32_opt")]
    page_index: Option<u32>,
    #[serde(default, alias = "size", deserialize_with = "string_or_number::deserialize_u32_opt")]
    page_size: Option<u32>,
}

impl PaginationParams {
    pub fn new(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index: Some(page_index),
            page_size: Some(page_size),
        }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index.unwrap_or(0)
    }

    /// Requested size clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn to_request(&self) -> PageRequest {
        PageRequest::new(self.page_index(), self.page_size())
    }
}

/// Cursor pagination parameters
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CursorParams {
    /// Opaque cursor returned as `nextCursor` by the previous page
    pub cursor: Option<String>,
    #[serde(default, deserialize_with = "string_or_number::deserialize_u32_opt")]
    limit: Option<u32>,
}

impl CursorParams {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// JSON body extractor whose rejections use the platform error envelope.
///
/// Missing content type is 415, a body of the wrong shape is 422 and
/// malformed JSON is 400.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Optional JSON body. An empty body is `None`; anything else must be valid
/// JSON of the right shape, with the same rejections as [`ValidatedJson`].
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(is_json_content_type);
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| PlatformError::validation(rejection.body_text()))?;
        if bytes.is_empty() {
            return Ok(Self(None));
        }
        if !is_json {
            return Err(PlatformError::UnsupportedMediaType {
                message: "Expected request with `Content-Type: application/json`".to_string(),
            });
        }

        match Json::<T>::from_bytes(&bytes) {
            Ok(Json(value)) => Ok(Self(Some(value))),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

fn is_json_content_type(value: &str) -> bool {
    let mime = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Path parameters; a value that doesn't parse is a 400 in the platform envelope
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(PlatformError::validation(rejection.body_text())),
        }
    }
}

/// Query string parameters, rejected like [`ValidatedPath`]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(PlatformError::validation(rejection.body_text())),
        }
    }
}

fn map_json_rejection(rejection: JsonRejection) -> PlatformError {
    match rejection {
        JsonRejection::MissingJsonContentType(e) => PlatformError::UnsupportedMediaType {
            message: e.body_text(),
        },
        JsonRejection::JsonDataError(e) => PlatformError::Unprocessable {
            code: "INVALID_REQUEST_BODY".to_string(),
            message: e.body_text(),
        },
        JsonRejection::JsonSyntaxError(e) => PlatformError::validation(e.body_text()),
        other => PlatformError::validation(other.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_accepts_strings_and_aliases() {
        let params: PaginationParams =
            serde_json::from_value(serde_json::json!({"page": "2", "size": 500})).unwrap();
        assert_eq!(params.page_index(), 2);
        assert_eq!(params.page_size(), MAX_PAGE_SIZE);

        let params: PaginationParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.page_index(), 0);
        assert_eq!(params.page_size(), 20);
    }

    #[test]
    fn test_json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type(""));
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let params = PaginationParams::new(0, 0);
        assert_eq!(params.page_size(), 1);
        assert_eq!(params.to_request().offset(), 0);
    }
}
