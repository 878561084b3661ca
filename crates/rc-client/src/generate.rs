use log::info;
use uuid::Uuid;

use rc_core::{JobSpec, LocatorCodec, LocatorError, ObjectLocator, TemplateRead, extension_of};

use crate::error::GatewayError;
use crate::store::ObjectStore;

pub const RECAST_PIPELINE: &str = "recast";

/// Uploads the user's source image under `user/<uuid>.<ext>` and returns its
/// locator.
pub async fn upload_source_image(
    store: &dyn ObjectStore,
    bucket: &str,
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
) -> Result<ObjectLocator, GatewayError> {
    let key = format!("user/{}.{}", Uuid::new_v4(), extension_of(filename));
    let url = store.put(bytes, bucket, &key, content_type).await?;
    info!("uploaded source image to {url}");

    Ok(ObjectLocator {
        bucket: bucket.to_string(),
        key,
    })
}

/// Builds one recast job per selected template, pairing the uploaded source
/// image with the template's asset. Malformed template URLs surface
/// synchronously.
pub fn build_recast_jobs(
    codec: &LocatorCodec,
    source: &ObjectLocator,
    templates: &[TemplateRead],
) -> Result<Vec<JobSpec>, LocatorError> {
    templates
        .iter()
        .map(|template| {
            let template_asset = codec.parse(&template.url)?;

            let mut input = serde_json::Map::new();
            input.insert("source_image_bucket".into(), source.bucket.clone().into());
            input.insert("source_image_key".into(), source.key.clone().into());
            input.insert(
                "template_image_bucket".into(),
                template_asset.bucket.into(),
            );
            input.insert("template_image_key".into(), template_asset.key.into());

            Ok(JobSpec {
                job_id: Uuid::new_v4().to_string(),
                pipeline_name: RECAST_PIPELINE.to_string(),
                input,
            })
        })
        .collect()
}
