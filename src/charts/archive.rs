//! Pull a single file out of a packaged chart layer.
use std::io;
use std::path::Path;
use std::pin::pin;

use async_compression::futures::bufread::GzipDecoder;
use async_tar::Archive;
use bytes::Bytes;
use futures::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt};
use futures::{Stream, StreamExt, TryStreamExt};
use tracing::debug;

use super::error::ServiceError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A file found inside a chart archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChartFile {
    /// Path as stored in the archive, e.g. `mychart/values.yaml`.
    pub path: String,
    pub contents: Vec<u8>,
}

/// Scan a (possibly gzipped) tar stream for the first entry whose path ends
/// with `file_name` and return its contents.
///
/// Matching is a plain string suffix test, so `values.yaml` also matches
/// `mychart/charts/sub/values.yaml` if that entry comes first.
pub async fn extract_file<S>(layer: S, file_name: &str) -> Result<ChartFile, ServiceError>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + Unpin,
{
    let mut reader = layer.into_async_read();

    let compressed = {
        let head = reader
            .fill_buf()
            .await
            .map_err(ServiceError::upstream("failed to read chart layer"))?;
        if head.is_empty() {
            return Err(ServiceError::UpstreamFailure(
                "chart layer is empty".to_string(),
            ));
        }
        head.starts_with(&GZIP_MAGIC)
    };

    let reader: Box<dyn AsyncRead + Send + Unpin> = if compressed {
        Box::new(GzipDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let entries = Archive::new(reader)
        .entries()
        .map_err(ServiceError::upstream("failed to read tar archive"))?;
    let mut entries = pin!(entries);

    while let Some(entry) = entries.next().await {
        let mut entry = entry
            .map_err(ServiceError::upstream("failed to read tar archive"))?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if path.ends_with(file_name) {
            debug!(%path, "found file in chart archive");
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .await
                .map_err(ServiceError::upstream(
                    "failed to read file from chart archive",
                ))?;
            return Ok(ChartFile { path, contents });
        }
    }

    Err(ServiceError::FileNotFound(format!(
        "'{file_name}' not found in chart archive"
    )))
}

/// Content type a transport should advertise for a file name.
pub fn content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    if extension.eq_ignore_ascii_case("json") {
        "application/json"
    } else if extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml") {
        "application/x-yaml; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    }
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::fixtures::{stream, tar, tar_gz};
    use super::*;

    #[tokio::test]
    async fn returns_matching_entry() {
        let layer = tar_gz(&[
            ("chartA/Chart.yaml", b"name: chartA\n"),
            ("chartA/values.yaml", b"replicas: 2\n"),
        ]);
        let file = extract_file(stream(&layer), "values.yaml").await.unwrap();
        assert_eq!(file.path, "chartA/values.yaml");
        assert_eq!(file.contents, b"replicas: 2\n");
    }

    #[tokio::test]
    async fn first_suffix_match_wins() {
        let layer = tar_gz(&[
            ("chartA/charts/sub/values.yaml", b"sub: true\n"),
            ("chartA/values.yaml", b"top: true\n"),
        ]);
        let file = extract_file(stream(&layer), "values.yaml").await.unwrap();
        assert_eq!(file.path, "chartA/charts/sub/values.yaml");
        assert_eq!(file.contents, b"sub: true\n");
    }

    #[tokio::test]
    async fn missing_file() {
        let layer = tar_gz(&[("chartA/Chart.yaml", b"name: chartA\n")]);
        let err = extract_file(stream(&layer), "values.yaml").await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::FileNotFound("'values.yaml' not found in chart archive".to_string())
        );
    }

    #[tokio::test]
    async fn reads_uncompressed_tar() {
        let layer = tar(&[("chartA/README.md", b"# chart\n")]);
        let file = extract_file(stream(&layer), "README.md").await.unwrap();
        assert_eq!(file.contents, b"# chart\n");
    }

    #[tokio::test]
    async fn corrupt_gzip_is_upstream_failure() {
        let mut layer = tar_gz(&[("chartA/values.yaml", b"replicas: 2\n")]);
        // Keep the gzip header, break the deflate data.
        layer[10..].fill(0xff);
        let err = extract_file(stream(&layer), "values.yaml").await.unwrap_err();
        assert_eq!(err.kind(), crate::charts::error::ErrorKind::UpstreamFailure);
    }

    #[tokio::test]
    async fn empty_layer_is_upstream_failure() {
        let err = extract_file(stream(&[]), "values.yaml").await.unwrap_err();
        assert!(matches!(err, ServiceError::UpstreamFailure(_)));
    }

    #[tokio::test]
    async fn stream_errors_are_upstream_failures() {
        let failing =
            futures::stream::iter(vec![Err::<Bytes, _>(io::Error::other("connection reset"))]);
        let err = extract_file(failing, "values.yaml").await.unwrap_err();
        assert!(
            matches!(err, ServiceError::UpstreamFailure(msg) if msg.contains("connection reset"))
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("values.json"), "application/json");
        assert_eq!(content_type("values.yaml"), "application/x-yaml; charset=utf-8");
        assert_eq!(content_type("Chart.yml"), "application/x-yaml; charset=utf-8");
        assert_eq!(content_type("README.md"), "text/plain; charset=utf-8");
        assert_eq!(content_type("values"), "text/plain; charset=utf-8");
    }

    #[test]
    fn content_type_ignores_extension_case() {
        assert_eq!(content_type("VALUES.JSON"), "application/json");
        assert_eq!(content_type("app/Values.YAML"), "application/x-yaml; charset=utf-8");
        assert_eq!(content_type("yaml"), "text/plain; charset=utf-8");
    }
}
