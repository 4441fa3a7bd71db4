use spin_sdk::http::Response;
use serde::Serialize;
use std::collections::BTreeMap;

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("Batch validation failed: {0:?}")]
    BatchValidation(BTreeMap<usize, FieldErrors>),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Internal Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::BatchValidation(_) | ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation(errors) => serde_json::json!({"errors": errors}),
            ApiError::BatchValidation(errors) => serde_json::json!({"errors": errors}),
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => serde_json::json!({"error": msg}),
            ApiError::Unauthorized => serde_json::json!({"error": "Unauthorized"}),
            ApiError::Forbidden => serde_json::json!({"error": "Forbidden"}),
            // Store details stay in the logs.
            ApiError::Internal(_) => serde_json::json!({"error": "Internal server error"}),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        if let ApiError::Internal(inner) = &err {
            tracing::error!(error = %inner, "request failed");
        }
        Response::builder()
            .status(err.status())
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&err.body()).unwrap_or_default())
            .build()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Malformed JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("title", "This field is required.");
        errors.add("title", "Too long.");
        errors.add("content", "This field is required.");

        assert_eq!(errors.get("title").map(|m| m.len()), Some(2));
        let body = serde_json::to_value(&errors).unwrap();
        assert_eq!(body["content"][0], "This field is required.");
    }

    #[test]
    fn empty_field_errors_pass() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(matches!(
            FieldErrors::single("email", "bad").into_result(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn batch_errors_are_keyed_by_index() {
        let mut batch = BTreeMap::new();
        batch.insert(2, FieldErrors::single("name", "This field is required."));
        let err = ApiError::BatchValidation(batch);

        assert_eq!(err.status(), 400);
        assert_eq!(err.body()["errors"]["2"]["name"][0], "This field is required.");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status(), 500);
        assert_eq!(err.body()["error"], "Internal server error");
    }
}
