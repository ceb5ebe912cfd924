use aws_sdk_s3::Client as S3Client;
use std::time::Duration;

use crate::error::{storage_error, ServiceError, ServiceResult};
use crate::policy::{self, Capability};
use crate::types::{PhotoUpload, PhotoUploadRequest, Principal};

const UPLOAD_URL_TTL: Duration = Duration::from_secs(3600);

/// Object key for a report photo, namespaced by uploader
fn photo_key(uid: &str, file_name: &str, image_id: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());
    format!("reports/{}/{}.{}", uid, image_id, extension)
}

fn check_content_type(content_type: &str) -> ServiceResult<()> {
    if content_type.starts_with("image/") {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "Only image uploads are accepted, got {}",
            content_type
        )))
    }
}

/// Presigned PUT for a hazard photo. The returned `image_ref` goes into the
/// report submission.
pub async fn presign_photo_upload(
    s3_client: &S3Client,
    bucket: &str,
    actor: &Principal,
    req: &PhotoUploadRequest,
) -> ServiceResult<PhotoUpload> {
    policy::authorize(actor, Capability::SubmitReport)?;
    check_content_type(&req.content_type)?;

    let image_ref = photo_key(&actor.uid, &req.file_name, &uuid::Uuid::new_v4().to_string());

    let presigning = aws_sdk_s3::presigning::PresigningConfig::expires_in(UPLOAD_URL_TTL)
        .map_err(storage_error("build presigning config"))?;
    let presigned_request = s3_client
        .put_object()
        .bucket(bucket)
        .key(&image_ref)
        .content_type(&req.content_type)
        .presigned(presigning)
        .await
        .map_err(storage_error("presign photo upload"))?;

    tracing::info!("Issued upload URL for {} to {}", image_ref, actor.uid);

    Ok(PhotoUpload {
        image_ref,
        upload_url: presigned_request.uri().to_string(),
        method: "PUT".to_string(),
        content_type: req.content_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_keeps_extension_under_uploader() {
        assert_eq!(
            photo_key("u1", "IMG_0042.JPG", "abc"),
            "reports/u1/abc.jpg"
        );
        assert_eq!(photo_key("u1", "photo", "abc"), "reports/u1/abc.jpg");
        assert_eq!(photo_key("u1", "weird.p/ng", "abc"), "reports/u1/abc.jpg");
    }

    #[test]
    fn only_images_are_accepted() {
        assert!(check_content_type("image/png").is_ok());
        assert!(matches!(
            check_content_type("application/pdf"),
            Err(ServiceError::Validation(_))
        ));
    }
}
