use crate::entities::uploads::UploadKind;
use anyhow::{Result, anyhow};
use std::collections::HashMap;

/// Limits applied to one kind of upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub kind: UploadKind,
    /// Multipart field carrying the file
    pub form_field_name: &'static str,
    pub allowed_mimes: Vec<&'static str>,
    pub max_file_size: usize,
}

/// Policy lookup table, built once at startup
#[derive(Debug, Clone)]
pub struct UploadPolicies {
    policies: HashMap<UploadKind, UploadPolicy>,
}

impl Default for UploadPolicies {
    fn default() -> Self {
        let picture = UploadPolicy {
            kind: UploadKind::Picture,
            form_field_name: "picture",
            allowed_mimes: vec!["image/png", "image/jpg", "image/jpeg"],
            max_file_size: 5 * 1024 * 1024, // 5 MB
        };

        Self {
            policies: HashMap::from([(picture.kind, picture)]),
        }
    }
}

impl UploadPolicies {
    pub fn get(&self, kind: UploadKind) -> Option<&UploadPolicy> {
        self.policies.get(&kind)
    }

    pub fn largest_file_size(&self) -> usize {
        self.policies
            .values()
            .map(|p| p.max_file_size)
            .max()
            .unwrap_or(0)
    }

    /// Resolves a kind from its name in the request path
    pub fn resolve(&self, name: &str) -> Option<&UploadPolicy> {
        UploadKind::from_name(name).and_then(|kind| self.get(kind))
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                size, max_size
            ),
        }));
    }
    Ok(())
}

/// Validates the declared content type against the policy allowlist and
/// returns it normalized.
pub fn validate_mime_type(content_type: &str, policy: &UploadPolicy) -> Result<String> {
    let normalized = content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_lowercase())
        .unwrap_or_else(|_| content_type.trim().to_lowercase());

    if policy.allowed_mimes.iter().any(|allowed| *allowed == normalized) {
        return Ok(normalized);
    }

    Err(anyhow!(ValidationError {
        code: "INVALID_MIME_TYPE",
        message: format!(
            "MIME type '{}' is not allowed for {} uploads",
            content_type,
            policy.kind.as_str()
        ),
    }))
}

/// Sniffs the content and checks it agrees with the allowlist. Returns the
/// file extension to store it under.
pub fn verify_magic_bytes(data: &[u8], policy: &UploadPolicy) -> Result<&'static str> {
    if data.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        }));
    }

    match infer::get(data) {
        Some(kind) if policy.allowed_mimes.contains(&kind.mime_type()) => Ok(kind.extension()),
        Some(kind) => Err(anyhow!(ValidationError {
            code: "CONTENT_MISMATCH",
            message: format!("File content looks like '{}'", kind.mime_type()),
        })),
        None => Err(anyhow!(ValidationError {
            code: "CONTENT_MISMATCH",
            message: "File content type could not be recognised".to_string(),
        })),
    }
}
