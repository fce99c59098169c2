use std::fmt;

/// Bytes read from the head of a video to check its container signature.
pub const VIDEO_HEADER_LEN: usize = 12;

/// ISO base media box type expected at offset 4 of an MP4 file.
const FTYP: &[u8; 4] = b"ftyp";

const MAX_STORED_NAME_LEN: usize = 255;
const MAX_EXTENSION_LEN: usize = 10;

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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub const FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
pub const INVALID_VIDEO_SIGNATURE: &str = "INVALID_VIDEO_SIGNATURE";
pub const EMPTY_FILE: &str = "EMPTY_FILE";
pub const EXECUTABLE_CONTENT: &str = "EXECUTABLE_CONTENT";
pub const INVALID_FILENAME: &str = "INVALID_FILENAME";
pub const INVALID_FIELD: &str = "INVALID_FIELD";

/// Validates video size against maximum limit. `size == max_size` is accepted.
pub fn validate_video_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::new(
            FILE_TOO_LARGE,
            format!(
                "Video size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        ));
    }
    Ok(())
}

/// Accepts the content only if its first 12 bytes carry `ftyp` at offset 4.
/// Shorter content is rejected.
pub fn verify_video_signature(data: &[u8]) -> Result<(), ValidationError> {
    if data.len() < VIDEO_HEADER_LEN || &data[4..8] != FTYP {
        return Err(ValidationError::new(
            INVALID_VIDEO_SIGNATURE,
            "Only MP4 video files are accepted",
        ));
    }
    Ok(())
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }

    // ELF
    if header.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return true;
    }

    // PE/COFF
    if header.starts_with(&[0x4D, 0x5A]) {
        return true;
    }

    // Mach-O
    if header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return true;
    }

    header.starts_with(b"#!")
}

pub fn validate_thumbnail(data: &[u8]) -> Result<(), ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::new(EMPTY_FILE, "Thumbnail file is empty"));
    }
    if is_executable_content(data) {
        return Err(ValidationError::new(
            EXECUTABLE_CONTENT,
            "Thumbnail contains executable content which is not allowed",
        ));
    }
    Ok(())
}

/// Extracts a safe extension from a client-supplied filename: ASCII
/// alphanumeric, at most 10 characters, lowercased.
pub fn sanitize_extension(original: Option<&str>) -> Option<String> {
    let name = original?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Builds a collision-free stored filename, keeping the original extension
/// when it is safe.
pub fn generate_stored_name(original: Option<&str>) -> String {
    let id = uuid::Uuid::new_v4();
    match sanitize_extension(original) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Rejects names that could escape the storage directory. Used for every
/// filename taken from a URL path.
pub fn validate_stored_name(name: &str) -> Result<(), ValidationError> {
    let invalid = name.is_empty()
        || name.len() > MAX_STORED_NAME_LEN
        || name.starts_with('.')
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(|c| c.is_control() || c == ':');

    if invalid {
        tracing::warn!("Rejected stored filename: {:?}", name);
        return Err(ValidationError::new(INVALID_FILENAME, "Invalid filename"));
    }
    Ok(())
}

/// Trims a required text field and rejects it when blank or too long.
pub fn require_text(
    field: &str,
    value: &str,
    max_chars: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(
            INVALID_FIELD,
            format!("{} must not be empty", field),
        ));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ValidationError::new(
            INVALID_FIELD,
            format!("{} must be at most {} characters", field, max_chars),
        ));
    }
    Ok(trimmed.to_string())
}

/// Splits repeated and comma-separated tag values into a deduplicated list,
/// preserving first-seen order.
pub fn normalize_tags<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for value in values {
        for tag in value.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}
