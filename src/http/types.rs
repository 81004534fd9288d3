use serde::{Deserialize, Serialize};

/// Standard response envelope returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// List envelope with paging information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        id: u32,
        name: String,
    }

    #[test]
    fn test_api_response_without_message() {
        let response: ApiResponse<Vec<Product>> =
            serde_json::from_str(r#"{"data": [{"id": 1, "name": "Laptop"}], "success": true}"#)
                .unwrap();
        assert!(response.success);
        assert!(response.message.is_none());
        assert_eq!(response.data[0].name, "Laptop");
    }

    #[test]
    fn test_paginated_response() {
        let response: PaginatedResponse<Product> = serde_json::from_str(
            r#"{
                "data": [{"id": 2, "name": "Phone"}],
                "message": "ok",
                "success": true,
                "pagination": {"page": 2, "limit": 1, "total": 5, "totalPages": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(response.pagination.total_pages, 5);
        assert_eq!(response.data, vec![Product { id: 2, name: "Phone".to_string() }]);
        assert_eq!(response.message.as_deref(), Some("ok"));
    }
}
