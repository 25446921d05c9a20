use crate::api::errors::ApiError;
use std::path::Path;

pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        "gif" => mime == "image/gif",
        _ => false,
    }
}

/// Strips path separators and control characters from a client filename.
pub(crate) fn sanitized_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "sheet.png".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_upload_accepts_matching_extension_and_mime() {
        let allowed = vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()];
        assert!(validate_image_upload("scan.PNG", "image/png", &allowed).is_ok());
        assert!(validate_image_upload("scan.jpeg", "image/jpeg", &allowed).is_ok());
    }

    #[test]
    fn image_upload_rejects_unknown_extension() {
        let allowed = vec!["png".to_string()];
        assert!(validate_image_upload("scan.pdf", "application/pdf", &allowed).is_err());
        assert!(validate_image_upload("scan", "image/png", &allowed).is_err());
    }

    #[test]
    fn image_upload_rejects_mime_mismatch() {
        let allowed = vec!["png".to_string()];
        assert!(validate_image_upload("scan.png", "image/jpeg", &allowed).is_err());
    }

    #[test]
    fn sanitized_filename_strips_separators() {
        assert_eq!(sanitized_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitized_filename("scan one.png"), "scan one.png");
        assert_eq!(sanitized_filename("..."), "sheet.png");
    }
}
