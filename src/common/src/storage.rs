use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder};
use std::sync::Arc;
use url::Url;

use crate::config::StorageConfig;

/// Create the object store the uploads are kept in.
pub fn create_object_store(storage_config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let builder = create_s3_builder(storage_config)?;
    Ok(Arc::new(builder.build()?))
}

/// Create an S3 builder bound to the configured bucket.
///
/// Credentials and region always come from the configuration; a custom
/// endpoint switches to S3-compatible mode and allows plain HTTP when the
/// endpoint asks for it.
pub fn create_s3_builder(storage_config: &StorageConfig) -> Result<AmazonS3Builder> {
    if storage_config.bucket.is_empty() {
        return Err(anyhow::anyhow!("Storage configuration must specify a bucket"));
    }

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&storage_config.bucket)
        .with_region(&storage_config.region)
        .with_access_key_id(&storage_config.access_key_id)
        .with_secret_access_key(&storage_config.secret_access_key)
        .with_virtual_hosted_style_request(storage_config.virtual_hosted_style);

    if let Some(endpoint) = storage_config
        .endpoint
        .as_deref()
        .filter(|endpoint| !endpoint.is_empty())
    {
        let url = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid storage endpoint '{}': {}", endpoint, e))?;

        match url.scheme() {
            "http" => builder = builder.with_allow_http(true),
            "https" => {}
            scheme => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage endpoint scheme: {}. Supported: http, https",
                    scheme
                ));
            }
        }

        log::debug!("Using S3-compatible endpoint {endpoint}");
        builder = builder.with_endpoint(endpoint);
    }

    Ok(builder)
}
