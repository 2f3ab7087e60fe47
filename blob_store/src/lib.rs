use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt};
use object_store::{
    aws::{AmazonS3Builder, AmazonS3ConfigKey},
    parse_url,
    parse_url_opts,
    path::Path,
    Attribute,
    AttributeValue,
    Attributes,
    ObjectStore,
    ObjectStoreScheme,
    PutOptions,
    PutPayload,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    pub path: Option<String>,
}

impl BlobStorageConfig {
    pub fn new(path: &str) -> Self {
        BlobStorageConfig {
            path: Some(format!("file://{}", path)),
        }
    }
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        let blob_store_path = format!(
            "file://{}",
            env::current_dir()
                .expect("unable to get current directory")
                .join("dataset_storage/blobs")
                .display()
        );
        info!("using blob store path: {}", blob_store_path);
        BlobStorageConfig {
            path: Some(blob_store_path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Clone)]
pub struct BlobStorage {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    // The local filesystem backend rejects object attributes, so content
    // types are only attached where the backend can persist them.
    supports_attributes: bool,
}

impl BlobStorage {
    pub fn new(config: BlobStorageConfig) -> Result<Self> {
        let url = config
            .path
            .clone()
            .ok_or_else(|| anyhow!("blob storage path is not configured"))?;
        let (object_store, path, scheme) = Self::build_object_store(&url)?;
        Ok(Self {
            object_store: Arc::new(object_store),
            path,
            supports_attributes: !matches!(scheme, ObjectStoreScheme::Local),
        })
    }

    pub fn build_object_store(
        url_str: &str,
    ) -> Result<(Box<dyn ObjectStore>, Path, ObjectStoreScheme)> {
        let url = &url_str.parse::<Url>()?;
        let (scheme, _) = ObjectStoreScheme::parse(url)?;
        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // inject AWS environment variables to prioritize keys over
                // instance metadata credentials.
                let opts: Vec<(AmazonS3ConfigKey, String)> = std::env::vars_os()
                    .filter_map(|(os_key, os_value)| {
                        if let (Some(key), Some(value)) = (os_key.to_str(), os_value.to_str()) {
                            if key.starts_with("AWS_") {
                                if let Ok(config_key) = key.to_ascii_lowercase().parse() {
                                    return Some((config_key, String::from(value)));
                                }
                            }
                        }
                        None
                    })
                    .collect();

                let mut s3_builder = AmazonS3Builder::new().with_url(url_str);
                for (key, value) in opts.iter() {
                    s3_builder = s3_builder.with_config(*key, value.clone());
                }
                let s3 = s3_builder.build()?;
                let (_, path) = parse_url_opts(url, opts)?;
                Ok((Box::new(s3), path, scheme))
            }
            _ => {
                let (object_store, path) = parse_url(url)?;
                Ok((object_store, path, scheme))
            }
        }
    }

    pub fn get_object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    fn object_path(&self, key: &str) -> Path {
        Path::from(format!("{}/{}", self.path, key))
    }

    /// Write a stream of chunks to `key`, recording `content_type` as the
    /// object's content-type metadata where the backend supports it.
    pub async fn put(
        &self,
        key: &str,
        mut data: impl futures::Stream<Item = Result<Bytes>> + Send + Unpin,
        content_type: Option<&str>,
    ) -> Result<PutResult> {
        let path = self.object_path(key);
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut size_bytes: u64 = 0;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            chunks.push(chunk);
        }

        let mut opts = PutOptions::default();
        if self.supports_attributes {
            if let Some(content_type) = content_type {
                let mut attributes = Attributes::new();
                attributes.insert(
                    Attribute::ContentType,
                    AttributeValue::from(content_type.to_string()),
                );
                opts.attributes = attributes;
            }
        }

        self.object_store
            .put_opts(&path, PutPayload::from_iter(chunks), opts)
            .await?;
        Ok(PutResult {
            url: path.to_string(),
            size_bytes,
        })
    }

    pub async fn get(&self, key: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let client_clone = self.object_store.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.object_path(key);
        let get_result = client_clone
            .get(&path)
            .await
            .map_err(|e| anyhow!("can't get object {:?}: {:?}", path, e))?;
        tokio::spawn(async move {
            let mut stream = get_result.into_stream();
            while let Some(chunk) = stream.next().await {
                let _ = tx
                    .send(chunk.map_err(|e| anyhow!("error reading object {:?}: {:?}", path, e)));
            }
        });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    pub async fn read_bytes(&self, key: &str) -> Result<Bytes> {
        let mut reader = self.get(key).await?;
        let mut bytes = BytesMut::new();
        while let Some(chunk) = reader.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes.into())
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn one_chunk(data: &'static [u8]) -> impl futures::Stream<Item = Result<Bytes>> + Send + Unpin {
        Box::pin(stream::once(async move { Ok(Bytes::from_static(data)) }))
    }

    #[tokio::test]
    async fn test_local_put_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = BlobStorageConfig::new(dir.path().to_str().unwrap());
        let storage = BlobStorage::new(config).unwrap();

        let result = storage
            .put("images/sample.jpg", one_chunk(b"not really a jpeg"), None)
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 17);
        assert!(result.url.ends_with("images/sample.jpg"));

        let bytes = storage.read_bytes("images/sample.jpg").await.unwrap();
        assert_eq!(bytes.as_ref(), b"not really a jpeg");
    }

    #[tokio::test]
    async fn test_local_put_ignores_content_type() {
        // LocalFileSystem has nowhere to store attributes; the put must
        // still succeed when a content type is supplied.
        let dir = tempfile::tempdir().unwrap();
        let config = BlobStorageConfig::new(dir.path().to_str().unwrap());
        let storage = BlobStorage::new(config).unwrap();

        storage
            .put("labels/sample.txt", one_chunk(b"0 0.5 0.5"), Some("text/plain"))
            .await
            .unwrap();
        let bytes = storage.read_bytes("labels/sample.txt").await.unwrap();
        assert_eq!(bytes.as_ref(), b"0 0.5 0.5");
    }

    #[tokio::test]
    async fn test_memory_put_records_content_type() {
        let config = BlobStorageConfig {
            path: Some("memory:///".to_string()),
        };
        let storage = BlobStorage::new(config).unwrap();

        storage
            .put("images/sample.jpg", one_chunk(b"abc"), Some("image/jpeg"))
            .await
            .unwrap();

        let get_result = storage
            .get_object_store()
            .get(&Path::from("images/sample.jpg"))
            .await
            .unwrap();
        assert_eq!(
            get_result
                .attributes
                .get(&Attribute::ContentType)
                .map(|v| v.as_ref()),
            Some("image/jpeg")
        );
    }

    #[tokio::test]
    async fn test_multi_chunk_put_size() {
        let config = BlobStorageConfig {
            path: Some("memory:///".to_string()),
        };
        let storage = BlobStorage::new(config).unwrap();

        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let result = storage
            .put("images/chunked.jpg", Box::pin(stream::iter(chunks)), None)
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 11);

        let bytes = storage.read_bytes("images/chunked.jpg").await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello world");
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let config = BlobStorageConfig { path: None };
        assert!(BlobStorage::new(config).is_err());
    }
}
