//! Cloud upload of pipeline artifacts.

use log::info;
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cloud credentials not configured: {0}")]
    MissingCredentials(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

const USER_PROJECT_HEADER: &str = "x-goog-user-project";

pub trait Uploader: Send + Sync {
    /// Uploads `local` as `object_name` and returns the remote URI.
    fn upload(&self, local: &Path, object_name: &str) -> Result<String, UploadError>;
}

/// Google Cloud Storage simple (media) uploads with a bearer token.
pub struct GcsUploader {
    bucket: String,
    access_token: String,
    project_id: Option<String>,
    client: Client,
}

impl GcsUploader {
    pub fn new(bucket: Option<String>, access_token: Option<String>) -> Result<Self, UploadError> {
        let bucket = bucket
            .filter(|b| !b.is_empty())
            .ok_or(UploadError::MissingCredentials("CLOUD_BUCKET_NAME"))?;
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(UploadError::MissingCredentials("GCS_ACCESS_TOKEN"))?;

        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            bucket,
            access_token,
            project_id: None,
            client,
        })
    }

    /// Project billed for the requests (`x-goog-user-project`).
    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id.filter(|p| !p.is_empty());
        self
    }

    pub fn upload_url(&self) -> String {
        format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o",
            self.bucket
        )
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("wav") => "audio/wav",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

impl Uploader for GcsUploader {
    fn upload(&self, local: &Path, object_name: &str) -> Result<String, UploadError> {
        let body = fs::read(local).map_err(|e| UploadError::Io(local.display().to_string(), e))?;

        let mut request = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", object_name)])
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(local))
            .body(body);
        if let Some(project) = &self.project_id {
            request = request.header(USER_PROJECT_HEADER, project);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Api {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let uri = format!("gs://{}/{}", self.bucket, object_name);
        info!("☁️ Uploaded {:?} -> {}", local, uri);
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_bucket_and_token() {
        assert!(matches!(
            GcsUploader::new(None, Some("t".into())).err().unwrap(),
            UploadError::MissingCredentials("CLOUD_BUCKET_NAME")
        ));
        assert!(matches!(
            GcsUploader::new(Some("b".into()), None).err().unwrap(),
            UploadError::MissingCredentials("GCS_ACCESS_TOKEN")
        ));
    }

    #[test]
    fn test_upload_url() {
        let uploader = GcsUploader::new(Some("media".into()), Some("t".into())).unwrap();
        assert_eq!(
            uploader.upload_url(),
            "https://storage.googleapis.com/upload/storage/v1/b/media/o"
        );
    }

    #[test]
    fn test_project_header_is_optional() {
        let uploader = GcsUploader::new(Some("media".into()), Some("t".into())).unwrap();
        assert_eq!(uploader.project_id, None);

        let uploader = uploader.with_project(Some("demo-project".into()));
        assert_eq!(uploader.project_id.as_deref(), Some("demo-project"));

        let uploader = uploader.with_project(Some(String::new()));
        assert_eq!(uploader.project_id, None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a_keyframe_0.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.wav")), "audio/wav");
        assert_eq!(content_type_for(Path::new("a_summary.txt")), "text/plain; charset=utf-8");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn test_missing_local_file() {
        let uploader = GcsUploader::new(Some("media".into()), Some("t".into())).unwrap();
        let err = uploader
            .upload(Path::new("/nonexistent/file.jpg"), "keyframes/file.jpg")
            .unwrap_err();
        assert!(matches!(err, UploadError::Io(..)));
    }
}
