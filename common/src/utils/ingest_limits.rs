#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Checks the identity a pipeline call is made on behalf of.
pub fn validate_identity(chatbot_id: &str, user_id: &str) -> Result<(), IngestValidationError> {
    if user_id.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "user id is required to start ingestion".into(),
        ));
    }
    if chatbot_id.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "chatbot id is required to start ingestion".into(),
        ));
    }
    Ok(())
}

pub fn validate_upload(
    max_upload_bytes: usize,
    file_name: &str,
    file_size: usize,
) -> Result<(), IngestValidationError> {
    if file_name.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "No file provided for ingestion".into(),
        ));
    }

    if file_size > max_upload_bytes {
        return Err(IngestValidationError::PayloadTooLarge(format!(
            "File is too large. Maximum allowed is {max_upload_bytes} bytes"
        )));
    }

    Ok(())
}

/// Returns the trimmed URL when it parses as an absolute URL.
pub fn validate_url(raw: &str) -> Result<String, IngestValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IngestValidationError::BadRequest(
            "No URL provided for ingestion".into(),
        ));
    }

    reqwest::Url::parse(trimmed)
        .map(|_| trimmed.to_string())
        .map_err(|e| IngestValidationError::BadRequest(format!("Invalid URL '{trimmed}': {e}")))
}
