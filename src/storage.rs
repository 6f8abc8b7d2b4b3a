use aws_sdk_s3::Client as S3Client;

use crate::error::{Error, Result};

/// Object storage for profile pictures.
///
/// Uploads happen at the edge; the backend only ever deletes objects it
/// previously handed out URLs for, when a user replaces their picture.
pub struct MediaStore {
    client: S3Client,
    bucket: String,
}

impl MediaStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Delete a stored object given its public URL. Failing to delete
    /// aborts the enclosing update, so a replaced picture is never left
    /// orphaned in the bucket.
    pub async fn delete_by_url(&self, url: &str) -> Result<()> {
        let key = object_key(url).ok_or_else(|| {
            warn!("Stored picture URL has no object key: {url}");
            Error::Dependency("Failed to delete the previous profile picture".to_string())
        })?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                warn!("Object storage delete for `{key}` failed: {err}");
                Error::Dependency("Failed to delete the previous profile picture".to_string())
            })?;
        Ok(())
    }
}

/// The object key inside a public URL: everything after the host.
fn object_key(url: &str) -> Option<&str> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme
        .split_once('/')
        .map(|(_, key)| key)
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_extracted_from_bucket_urls() {
        assert_eq!(
            Some("profile-pictures/1679998123_avatar.png"),
            object_key("https://pictures.s3.amazonaws.com/profile-pictures/1679998123_avatar.png")
        );
    }

    #[test]
    fn urls_without_a_key_are_rejected() {
        assert_eq!(None, object_key("https://pictures.s3.amazonaws.com"));
        assert_eq!(None, object_key("https://pictures.s3.amazonaws.com/"));
    }
}
