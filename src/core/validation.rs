//! Input validation for chat messages and uploads.

use crate::core::traits::UploadedFile;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

static SUSPICIOUS_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<script|javascript:|data:|vbscript:|onload=|onerror=")
        .expect("Invalid suspicious content regex")
});

/// Returns the trimmed message, or a user-facing reason why it was rejected.
pub fn validate_chat_message(message: &str) -> Result<&str, String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err("This field is required".to_owned());
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(format!(
            "Text must be no more than {MAX_MESSAGE_CHARS} characters long"
        ));
    }
    if SUSPICIOUS_CONTENT_RE.is_match(trimmed) {
        return Err("Message contains potentially harmful content".to_owned());
    }
    Ok(trimmed)
}

pub fn validate_file(file: &UploadedFile, max_size: u64) -> Result<(), String> {
    if file.filename.trim().is_empty() {
        return Err("File name is required".to_owned());
    }

    if file.size() > max_size {
        return Err(format!(
            "File too large. Maximum size is {}MB",
            max_size / (1024 * 1024)
        ));
    }

    match file.extension() {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}
