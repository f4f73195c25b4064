use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::PageRequest;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Default, Serialize)]
pub struct ResponseMetadata {
    /// Total rows matching the request, across all pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Request parameters as the handler applied them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            metadata: None,
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::success(data)
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        let metadata = self.metadata.take().unwrap_or_default();
        self.metadata = Some(ResponseMetadata {
            total_count: Some(count),
            ..metadata
        });
        self
    }

    pub fn with_pagination(mut self, page: PageRequest, total: u64) -> Self {
        let metadata = self.metadata.take().unwrap_or_default();
        self.metadata = Some(ResponseMetadata {
            total_count: Some(total),
            page: Some(page.page),
            page_size: Some(page.size),
            ..metadata
        });
        self
    }

    pub fn with_query<Q: Serialize>(mut self, query: &Q) -> Self {
        let metadata = self.metadata.take().unwrap_or_default();
        self.metadata = Some(ResponseMetadata {
            query: serde_json::to_value(query).ok(),
            ..metadata
        });
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn test_created_response() {
        assert_eq!(ApiResponse::created(1).status, StatusCode::CREATED);
    }

    #[test]
    fn test_response_with_pagination() {
        let response = ApiResponse::success("data").with_pagination(PageRequest { page: 2, size: 20 }, 100);

        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.page, Some(2));
        assert_eq!(metadata.page_size, Some(20));
        assert_eq!(metadata.total_count, Some(100));
    }

    #[test]
    fn test_query_echo_keeps_pagination() {
        let response = ApiResponse::success(Vec::<u8>::new())
            .with_pagination(PageRequest { page: 1, size: 20 }, 0)
            .with_query(&serde_json::json!({"q": "LAB25"}));

        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["metadata"]["query"]["q"], "LAB25");
        assert_eq!(json["metadata"]["page_size"], 20);
        assert_eq!(json["metadata"]["total_count"], 0);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ApiResponse::success(vec![1, 2]).with_count(2)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["metadata"]["total_count"], 2);
        assert!(json.get("error").is_none());
        assert!(json.get("status").is_none());
    }
}
