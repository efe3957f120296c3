//! Byte sources for scene assets: local files and HTTP(S).

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::LoadError;

/// Where an asset URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    File(PathBuf),
    Http(String),
}

impl AssetSource {
    /// `http://` and `https://` go over the network; anything else is a path,
    /// with an optional `file://` prefix.
    pub fn parse(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            AssetSource::Http(url.to_string())
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            AssetSource::File(PathBuf::from(path))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AssetSource::Http(_))
    }
}

/// An opened byte stream plus its announced length, if any.
pub struct OpenedSource {
    pub reader: Box<dyn Read + Send>,
    pub total_bytes: Option<u64>,
}

impl std::fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSource")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Result of a HEAD probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub url: String,
    /// HTTP status; `None` for files.
    pub status: Option<u16>,
    pub content_length: Option<u64>,
    pub reachable: bool,
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, LoadError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LoadError::Request(e.to_string()))
}

pub fn open(source: &AssetSource, timeout: Duration) -> Result<OpenedSource, LoadError> {
    match source {
        AssetSource::File(path) => {
            let file = File::open(path)?;
            let total_bytes = file.metadata().ok().map(|m| m.len());
            Ok(OpenedSource {
                reader: Box::new(file),
                total_bytes,
            })
        }
        AssetSource::Http(url) => {
            let response = http_client(timeout)?
                .get(url)
                .send()
                .map_err(|e| LoadError::Request(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(LoadError::Http {
                    status: status.as_u16(),
                });
            }
            let total_bytes = response.content_length();
            Ok(OpenedSource {
                reader: Box::new(response),
                total_bytes,
            })
        }
    }
}

/// Check that `url` exists without downloading it.
pub fn probe(url: &str, timeout: Duration) -> Result<ProbeReport, LoadError> {
    match AssetSource::parse(url) {
        AssetSource::File(path) => match std::fs::metadata(&path) {
            Ok(meta) => Ok(ProbeReport {
                url: url.to_string(),
                status: None,
                content_length: Some(meta.len()),
                reachable: meta.is_file(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProbeReport {
                url: url.to_string(),
                status: None,
                content_length: None,
                reachable: false,
            }),
            Err(e) => Err(e.into()),
        },
        AssetSource::Http(url) => {
            let response = http_client(timeout)?
                .head(&url)
                .send()
                .map_err(|e| LoadError::Request(e.to_string()))?;
            let status = response.status();
            Ok(ProbeReport {
                content_length: response.content_length(),
                status: Some(status.as_u16()),
                reachable: status.is_success(),
                url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_distinguishes_remote_and_local() {
        assert!(AssetSource::parse("https://example.com/a.glb").is_remote());
        assert!(AssetSource::parse("http://example.com/a.glb").is_remote());
        assert_eq!(
            AssetSource::parse("file:///tmp/a.glb"),
            AssetSource::File(PathBuf::from("/tmp/a.glb"))
        );
        assert_eq!(
            AssetSource::parse("assets/art-gallery.glb"),
            AssetSource::File(PathBuf::from("assets/art-gallery.glb"))
        );
    }

    #[test]
    fn open_file_reports_length() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[7u8; 300]).expect("write");
        let source = AssetSource::File(file.path().to_path_buf());
        let mut opened = open(&source, Duration::from_secs(1)).expect("open");
        assert_eq!(opened.total_bytes, Some(300));
        let mut buf = Vec::new();
        opened.reader.read_to_end(&mut buf).expect("read");
        assert_eq!(buf.len(), 300);
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = AssetSource::File(dir.path().join("missing.glb"));
        let err = open(&source, Duration::from_secs(1)).expect_err("missing");
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn probe_local_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"glTF").expect("write");
        let url = file.path().to_string_lossy().into_owned();
        let report = probe(&url, Duration::from_secs(1)).expect("probe");
        assert!(report.reachable);
        assert_eq!(report.content_length, Some(4));
        assert_eq!(report.status, None);

        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope.glb").to_string_lossy().into_owned();
        let report = probe(&missing, Duration::from_secs(1)).expect("probe");
        assert!(!report.reachable);
    }
}
