use mime::Mime;
use validator::Validate;

/// Longest accepted file name, in bytes. Keeps derived keys well under S3's 1024-byte limit.
pub const MAX_FILENAME_BYTES: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Raw upload metadata, as received from the client
#[derive(Debug, Clone, Validate)]
pub struct UploadMetadata {
    #[validate(length(
        min = 1,
        max = 255,
        message = "File name must be between 1 and 255 characters"
    ))]
    pub file_name: String,
    #[validate(length(min = 1, message = "Content type cannot be empty"))]
    pub content_type: String,
}

/// Metadata that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedMetadata {
    pub file_name: String,
    pub content_type: Mime,
}

impl UploadMetadata {
    pub fn new(file_name: &str, content_type: &str) -> Self {
        Self {
            file_name: file_name.trim().to_string(),
            content_type: content_type.trim().to_string(),
        }
    }

    /// Checks shape, file name safety and the content type allow-list.
    pub fn check(
        self,
        allowed_content_types: &[String],
    ) -> Result<ValidatedMetadata, ValidationError> {
        if let Err(errors) = self.validate() {
            let field_errors = errors.field_errors();
            let code = if field_errors.contains_key("file_name") {
                "INVALID_FILENAME"
            } else {
                "INVALID_CONTENT_TYPE"
            };
            return Err(ValidationError::new(code, errors.to_string()));
        }

        validate_file_name(&self.file_name)?;
        let content_type = validate_content_type(&self.content_type, allowed_content_types)?;

        Ok(ValidatedMetadata {
            file_name: self.file_name,
            content_type,
        })
    }
}

/// Rejects names that could escape the key prefix or break the key format
pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.len() > MAX_FILENAME_BYTES {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            format!(
                "File name is {} bytes long, at most {} are allowed",
                name.len(),
                MAX_FILENAME_BYTES
            ),
        ));
    }

    if name == "." || name.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", name);
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "File name cannot contain '..'",
        ));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "File name cannot contain path separators",
        ));
    }

    if name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "File name cannot contain control characters",
        ));
    }

    Ok(())
}

/// Parses `content_type` and matches it against the allow-list.
///
/// Entries are either exact essences (`image/png`) or wildcards (`image/*`,
/// `*/*`). An empty allow-list accepts any well-formed type.
pub fn validate_content_type(
    content_type: &str,
    allowed: &[String],
) -> Result<Mime, ValidationError> {
    let parsed: Mime = content_type.parse().map_err(|_| {
        ValidationError::new(
            "INVALID_CONTENT_TYPE",
            format!("'{}' is not a valid content type", content_type),
        )
    })?;

    if allowed.is_empty() || allowed.iter().any(|pattern| mime_matches(&parsed, pattern)) {
        return Ok(parsed);
    }

    Err(ValidationError::new(
        "CONTENT_TYPE_NOT_ALLOWED",
        format!("Content type '{}' is not allowed", parsed.essence_str()),
    ))
}

fn mime_matches(mime: &Mime, pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    match pattern.split_once('/') {
        Some(("*", "*")) => true,
        Some((type_, "*")) => mime.type_().as_str().eq_ignore_ascii_case(type_),
        Some(_) => mime.essence_str().eq_ignore_ascii_case(&pattern),
        None => pattern == "*",
    }
}
