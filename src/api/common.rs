//! Common API utilities and shared types

use axum::body::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::api::middleware::ApiError;
use crate::models::{ListParams, PagedResult};

// ============================================================================
// Pagination
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for list endpoints
pub fn default_page_size() -> u32 {
    10
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.page_size)
    }
}

/// Paged list body returned by every list endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            page_size: result.page_size,
            total_pages,
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Parse a JSON body that may be omitted entirely
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_and_clamping() {
        let query: PaginationQuery = serde_json::from_str("{}").unwrap();
        let params = query.params();
        assert_eq!((params.page, params.page_size), (1, 10));

        let query = PaginationQuery { page: 0, page_size: 1000 };
        let params = query.params();
        assert_eq!((params.page, params.page_size), (1, 100));
    }

    #[test]
    fn test_page_response_counts_pages() {
        let params = ListParams::new(2, 10);
        let page: PageResponse<i64> = PagedResult::new(vec![11, 12], 12, &params).into();
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.items, vec![11, 12]);
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Body {
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn test_optional_json() {
        let empty: Body = optional_json(&Bytes::from_static(b"")).unwrap();
        assert_eq!(empty, Body::default());

        let blank: Body = optional_json(&Bytes::from_static(b" \n")).unwrap();
        assert_eq!(blank, Body::default());

        let named: Body = optional_json(&Bytes::from_static(br#"{"name":"x"}"#)).unwrap();
        assert_eq!(named.name.as_deref(), Some("x"));

        assert!(optional_json::<Body>(&Bytes::from_static(b"{")).is_err());
    }
}
