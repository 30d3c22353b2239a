//! Opaque asset upload contract.
//!
//! The store never interprets uploaded bytes. It resolves the target
//! folder, validates the request shape and hands the payload to an
//! [`AssetUploader`]. Upload failures degrade to an empty URL.

use crate::model::container::FolderId;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

static BASE64_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("valid base64 regex"));
static MIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.+-]*/[A-Za-z0-9][A-Za-z0-9.+-]*$")
        .expect("valid mime regex")
});

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Base64 payload, optionally prefixed with a `data:<mime>;base64,` header.
    pub base64_payload: String,
    pub mime_type: String,
    pub target_name: String,
    /// Upload category, e.g. `student_photos`.
    pub category: String,
}

impl UploadRequest {
    pub fn new(
        base64_payload: impl Into<String>,
        mime_type: impl Into<String>,
        target_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            base64_payload: base64_payload.into(),
            mime_type: mime_type.into(),
            target_name: target_name.into(),
            category: category.into(),
        }
    }

    /// Payload with any data-URL header removed.
    pub fn payload_body(&self) -> &str {
        let payload = self.base64_payload.trim();
        match payload.split_once(";base64,") {
            Some((prefix, body)) if prefix.starts_with("data:") => body,
            _ => payload,
        }
    }

    /// Checks the request shape; returns a short error code on failure.
    pub fn validate(&self) -> Result<(), &'static str> {
        let body = self.payload_body();
        if body.is_empty() {
            return Err("empty_payload");
        }
        if body.len() % 4 != 0 || !BASE64_RE.is_match(body) {
            return Err("invalid_base64");
        }
        if !MIME_RE.is_match(self.mime_type.trim()) {
            return Err("invalid_mime_type");
        }
        if self.target_name.trim().is_empty() {
            return Err("empty_target_name");
        }
        if self.category.trim().is_empty() {
            return Err("empty_category");
        }
        Ok(())
    }
}

/// External file-hosting collaborator.
pub trait AssetUploader: Send + Sync {
    /// Uploads into `folder`; returns a public URL, or an empty string on
    /// failure. Must not panic.
    fn upload(&self, folder: &FolderId, request: &UploadRequest) -> String;
}

/// Validates and forwards one upload; every failure yields `""`.
pub fn upload_or_empty(
    uploader: &dyn AssetUploader,
    folder: &FolderId,
    request: &UploadRequest,
) -> String {
    if let Err(code) = request.validate() {
        warn!(
            "event=asset_upload module=upload status=error error_code={} category={}",
            code,
            request.category.trim()
        );
        return String::new();
    }
    let url = uploader.upload(folder, request);
    if url.trim().is_empty() {
        warn!(
            "event=asset_upload module=upload status=error error_code=uploader_failed category={}",
            request.category.trim()
        );
        return String::new();
    }
    info!(
        "event=asset_upload module=upload status=ok category={} bytes_b64={}",
        request.category.trim(),
        request.payload_body().len()
    );
    url
}

#[cfg(test)]
mod tests {
    use super::{upload_or_empty, AssetUploader, UploadRequest};
    use crate::model::container::FolderId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubUploader {
        url: &'static str,
        calls: AtomicUsize,
    }

    impl AssetUploader for StubUploader {
        fn upload(&self, folder: &FolderId, request: &UploadRequest) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.url.is_empty() {
                return String::new();
            }
            format!("{}/{}/{}", self.url, folder, request.target_name)
        }
    }

    fn stub(url: &'static str) -> StubUploader {
        StubUploader {
            url,
            calls: AtomicUsize::new(0),
        }
    }

    fn photo() -> UploadRequest {
        UploadRequest::new("aGVsbG8=", "image/png", "S001.png", "student_photos")
    }

    #[test]
    fn forwards_valid_request() {
        let uploader = stub("https://files.test");
        let url = upload_or_empty(&uploader, &FolderId::new("f1"), &photo());
        assert_eq!(url, "https://files.test/f1/S001.png");
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn accepts_data_url_prefix() {
        let mut request = photo();
        request.base64_payload = "data:image/png;base64,aGVsbG8=".to_string();
        assert_eq!(request.payload_body(), "aGVsbG8=");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn invalid_request_never_reaches_uploader() {
        let uploader = stub("https://files.test");
        let mut request = photo();
        request.base64_payload = "not base64!".to_string();
        assert_eq!(upload_or_empty(&uploader, &FolderId::new("f1"), &request), "");

        let mut request = photo();
        request.mime_type = "png".to_string();
        assert_eq!(request.validate(), Err("invalid_mime_type"));
        assert_eq!(upload_or_empty(&uploader, &FolderId::new("f1"), &request), "");
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn uploader_failure_degrades_to_empty() {
        let uploader = stub("");
        assert_eq!(upload_or_empty(&uploader, &FolderId::new("f1"), &photo()), "");
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    }
}
