//! Response envelopes
//!
//! Every HTTP response body, success or failure, is wrapped in [`ApiResponse`].
//! List endpoints put a [`PagedResult`] or [`CursorPage`] inside `data`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
    pub error_code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(200, data, "OK")
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::with_status(201, data, message)
    }

    pub fn with_status(status_code: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            status_code,
            message: message.into(),
            data: Some(data),
            error_code: None,
        }
    }

    /// Failure envelope; `data` is always null
    pub fn failure(status_code: u16, message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            message: message.into(),
            data: None,
            error_code: Some(error_code.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Offset pagination envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub page_index: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
    pub items: Vec<T>,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, page_index: u32, page_size: u32, total_count: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size as u64)
        };

        Self {
            page_index,
            page_size,
            total_count,
            total_pages,
            items,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            page_index: self.page_index,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// Cursor pagination envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> CursorPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = PagedResult::new(vec![1, 2, 3], 0, 3, 10);
        assert_eq!(page.total_pages, 4);

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, 0, 10);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_failure_envelope_shape() {
        let body: ApiResponse<()> = ApiResponse::failure(404, "Department not found", "NOT_FOUND");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["statusCode"], 404);
        assert_eq!(json["errorCode"], "NOT_FOUND");
        assert!(json["data"].is_null());
    }

    #[test]
    fn test_cursor_page_field_names() {
        let page = CursorPage {
            items: vec!["a"],
            next_cursor: Some("a".to_string()),
            has_more: true,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["nextCursor"], "a");
        assert_eq!(json["hasMore"], true);
    }
}
