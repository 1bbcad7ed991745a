use std::convert::Infallible;
use std::fmt;
use std::fs::File;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, StorageClass};
use aws_smithy_types::body::SdkBody;
use bytes::Bytes;
use chrono::Local;
use futures::{StreamExt, TryStreamExt};
use http_body::{Body, Frame, SizeHint};
use serde::Deserialize;
use tokio::runtime::Builder;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use super::{ProgressCallback, ProgressTracker, UploadStatus, Uploader};
use crate::logging::traced;

const MIB: u64 = 1024 * 1024;
/// Smallest part size S3 accepts for all but the last part.
const MIN_PART_MB: u64 = 5;
const MAX_PARTS: u64 = 10_000;
/// Frame size of request bodies, and so the granularity of progress deltas.
const BODY_CHUNK: usize = 64 * 1024;

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_part_size() -> u64 {
    16
}

fn default_concurrency() -> usize {
    4
}

/// Connection settings of an S3 (or S3-compatible) upload profile.
#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct S3Settings {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores; enables path-style addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    #[serde(default = "default_part_size")]
    pub part_size_mb: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("storage_class", &self.storage_class)
            .field("part_size_mb", &self.part_size_mb)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Uploads through the AWS SDK.
///
/// Files that fit in one part go out as a single `PutObject`; larger files
/// use a multipart upload with up to `concurrency` parts in flight. Request
/// bodies report every frame the SDK reads from them as a raw byte delta.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    settings: S3Settings,
}

impl S3Uploader {
    pub fn new(settings: S3Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &S3Settings {
        &self.settings
    }

    /// Part size for a file of `size` bytes, grown to stay within the part limit.
    pub fn part_size(&self, size: u64) -> u64 {
        let configured = self.settings.part_size_mb.max(MIN_PART_MB) * MIB;
        configured.max(size.div_ceil(MAX_PARTS))
    }

    fn send(
        &self,
        filepath: &Path,
        key: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<u64> {
        let size = std::fs::metadata(filepath)
            .with_context(|| format!("cannot stat {}", filepath.display()))?
            .len();
        let tracker = ProgressTracker::new(size);
        let on_bytes = |delta: u64| {
            if let (Some(event), Some(callback)) = (tracker.advance(delta), on_progress) {
                callback(event);
            }
        };
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("cannot start async runtime")?;
        runtime.block_on(self.transfer(filepath, key, size, &on_bytes))?;
        Ok(size)
    }

    async fn client(&self) -> Client {
        let settings = &self.settings;
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "hostkeeper-config",
            ));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.endpoint.is_some())
            .build();
        Client::from_conf(config)
    }

    async fn transfer(
        &self,
        filepath: &Path,
        key: &str,
        size: u64,
        on_bytes: &(dyn Fn(u64) + Sync),
    ) -> anyhow::Result<()> {
        let client = self.client().await;
        let bucket = self.settings.bucket.as_str();
        let storage_class = StorageClass::from(self.settings.storage_class.as_str());
        let part_size = self.part_size(size);

        if size <= part_size {
            let data = read_chunk(filepath, 0, size)?;
            let (sender, deltas) = mpsc::unbounded_channel();
            let request = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .storage_class(storage_class)
                .body(counting_stream(Bytes::from(data), sender))
                .send();
            counted(request, deltas, on_bytes)
                .await
                .map_err(sdk_error("PutObject"))?;
            return Ok(());
        }

        let created = client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .storage_class(storage_class)
            .send()
            .await
            .map_err(sdk_error("CreateMultipartUpload"))?;
        let upload_id = created
            .upload_id()
            .context("CreateMultipartUpload returned no upload id")?
            .to_string();

        let parts = self
            .send_parts(&client, filepath, key, &upload_id, size, part_size, on_bytes)
            .await;
        let parts = match parts {
            Ok(parts) => parts,
            Err(err) => {
                let aborted = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort) = aborted {
                    warn_not_aborted(key, &upload_id, &DisplayErrorContext(abort));
                }
                return Err(err);
            }
        };

        client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error("CompleteMultipartUpload"))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_parts(
        &self,
        client: &Client,
        filepath: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
        part_size: u64,
        on_bytes: &(dyn Fn(u64) + Sync),
    ) -> anyhow::Result<Vec<CompletedPart>> {
        let bucket = self.settings.bucket.as_str();
        let count = size.div_ceil(part_size);
        let mut parts: Vec<CompletedPart> = futures::stream::iter(0..count)
            .map(|index| async move {
                let offset = index * part_size;
                let length = part_size.min(size - offset);
                let chunk = read_chunk(filepath, offset, length)?;
                let part_number = i32::try_from(index + 1)?;
                let (sender, deltas) = mpsc::unbounded_channel();
                let request = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(counting_stream(Bytes::from(chunk), sender))
                    .send();
                let output = counted(request, deltas, on_bytes)
                    .await
                    .map_err(sdk_error("UploadPart"))?;
                Ok::<_, anyhow::Error>(
                    CompletedPart::builder()
                        .e_tag(output.e_tag().unwrap_or_default())
                        .part_number(part_number)
                        .build(),
                )
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .try_collect()
            .await?;
        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }
}

impl Uploader for S3Uploader {
    fn provider(&self) -> &str {
        "s3"
    }

    fn upload(
        &self,
        filepath: &Path,
        key: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> UploadStatus {
        traced("uploader", "s3", &key, || {
            let mut status = UploadStatus::new(filepath, key);
            status.started = Some(Local::now());
            match self.send(filepath, key, on_progress) {
                Ok(size) => {
                    status.size = Some(size);
                    status.completed = Some(Local::now());
                }
                Err(err) => status.exception = Some(format!("{err:#}")),
            }
            status
        })
    }
}

fn read_chunk(path: &Path, offset: u64, length: u64) -> anyhow::Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset))?;
    let mut chunk = vec![0; usize::try_from(length)?];
    file.read_exact(&mut chunk)
        .with_context(|| format!("short read at offset {offset} of {}", path.display()))?;
    Ok(chunk)
}

fn warn_not_aborted(key: &str, upload_id: &str, error: &dyn fmt::Display) {
    warn!(
        key,
        upload_id,
        error = %error,
        "multipart upload not aborted, uploaded parts remain stored"
    );
}

/// In-memory request body that sends the length of every frame it yields.
#[derive(Debug)]
struct CountingBody {
    data: Bytes,
    chunk: usize,
    deltas: UnboundedSender<u64>,
}

impl Body for CountingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.data.is_empty() {
            return Poll::Ready(None);
        }
        let length = self.chunk.max(1).min(self.data.len());
        let frame = self.data.split_to(length);
        // A closed receiver only means nobody is listening anymore.
        let _ = self.deltas.send(length as u64);
        Poll::Ready(Some(Ok(Frame::data(frame))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.len() as u64)
    }
}

/// A retryable stream over `data` that counts into `deltas`.
fn counting_stream(data: Bytes, deltas: UnboundedSender<u64>) -> ByteStream {
    ByteStream::new(SdkBody::retryable(move || {
        SdkBody::from_body_1_x(CountingBody {
            data: data.clone(),
            chunk: BODY_CHUNK,
            deltas: deltas.clone(),
        })
    }))
}

/// Drives `request`, passing byte deltas to `on_bytes` while it runs.
async fn counted<T>(
    request: impl Future<Output = T>,
    mut deltas: UnboundedReceiver<u64>,
    on_bytes: &(dyn Fn(u64) + Sync),
) -> T {
    tokio::pin!(request);
    loop {
        tokio::select! {
            output = &mut request => {
                while let Ok(delta) = deltas.try_recv() {
                    on_bytes(delta);
                }
                return output;
            }
            Some(delta) = deltas.recv() => on_bytes(delta),
        }
    }
}

fn sdk_error<E>(operation: &'static str) -> impl FnOnce(E) -> anyhow::Error
where
    E: std::error::Error,
{
    move |err| anyhow::anyhow!("{operation} failed: {}", DisplayErrorContext(err))
}
