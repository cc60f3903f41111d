//! Fetching external module archives.
//!
//! Remote locations are downloaded with a blocking HTTP client. Cache
//! validators (`ETag`, `Last-Modified`) are kept in a sidecar file next to the
//! downloaded archive so that re-fetching an unchanged location is a cheap
//! `304 Not Modified` round trip.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

/// Error fetching a location.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {uri} failed: {source}")]
    Http {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{uri} responded with status {status}")]
    Status { uri: String, status: u16 },

    #[error("cannot fetch {uri} while offline")]
    Offline { uri: String },

    #[error("invalid location {uri}: {message}")]
    InvalidUri { uri: String, message: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads a location into a local file.
pub trait Transport: Send + Sync {
    /// Fetch `uri` into `destination` and return the local path.
    fn fetch(&self, uri: &str, destination: &Path) -> Result<PathBuf, TransportError>;
}

/// Transport for `http(s):` and `file:` locations as well as plain paths.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    offline: bool,
}

impl HttpTransport {
    pub fn new(offline: bool) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sonata/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| TransportError::Http {
                uri: String::new(),
                source,
            })?;
        Ok(HttpTransport { client, offline })
    }

    fn download(&self, uri: &str, destination: &Path) -> Result<PathBuf, TransportError> {
        if self.offline {
            if destination.is_file() {
                debug!("Offline, using {}", destination.display());
                return Ok(destination.to_path_buf());
            }
            return Err(TransportError::Offline {
                uri: uri.to_string(),
            });
        }

        let sidecar = validator_path(destination);
        let mut request = self.client.get(uri);
        if destination.is_file() {
            let validators = fs::read_to_string(&sidecar).unwrap_or_default();
            let (etag, modified) = parse_validators(&validators);
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = modified {
                request = request.header(IF_MODIFIED_SINCE, modified);
            }
        }

        let http_error = |source| TransportError::Http {
            uri: uri.to_string(),
            source,
        };
        let response = request.send().map_err(http_error)?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!("Not modified: {}", uri);
            return Ok(destination.to_path_buf());
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let etag = header(ETAG);
        let modified = header(LAST_MODIFIED);
        let bytes = response.bytes().map_err(http_error)?;

        write_atomically(destination, &bytes)?;
        let validators = format_validators(etag.as_deref(), modified.as_deref());
        if validators.is_empty() {
            let _ = fs::remove_file(&sidecar);
        } else {
            fs::write(&sidecar, validators).map_err(|source| TransportError::Io {
                path: sidecar.clone(),
                source,
            })?;
        }

        info!("Fetched {} ({} bytes)", uri, bytes.len());
        Ok(destination.to_path_buf())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, uri: &str, destination: &Path) -> Result<PathBuf, TransportError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return self.download(uri, destination);
        }

        let source = if uri.starts_with("file:") {
            let url = url::Url::parse(uri).map_err(|e| TransportError::InvalidUri {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
            url.to_file_path()
                .map_err(|_| TransportError::InvalidUri {
                    uri: uri.to_string(),
                    message: "not a local file".to_string(),
                })?
        } else {
            PathBuf::from(uri)
        };

        copy_file(&source, destination)?;
        debug!("Copied {} to {}", source.display(), destination.display());
        Ok(destination.to_path_buf())
    }
}

/// Path of the cache validator sidecar for a downloaded file.
pub fn validator_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".validator");
    PathBuf::from(name)
}

fn format_validators(etag: Option<&str>, modified: Option<&str>) -> String {
    let mut text = String::new();
    if let Some(etag) = etag {
        text.push_str(&format!("etag: {}\n", etag));
    }
    if let Some(modified) = modified {
        text.push_str(&format!("last-modified: {}\n", modified));
    }
    text
}

fn parse_validators(text: &str) -> (Option<String>, Option<String>) {
    let mut etag = None;
    let mut modified = None;
    for line in text.lines() {
        match line.split_once(": ") {
            Some(("etag", value)) => etag = Some(value.to_string()),
            Some(("last-modified", value)) => modified = Some(value.to_string()),
            _ => {}
        }
    }
    (etag, modified)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TransportError + '_ {
    move |source| TransportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<PathBuf, TransportError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_error(parent))?;
    Ok(parent.to_path_buf())
}

fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<(), TransportError> {
    let parent = ensure_parent(destination)?;
    let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(io_error(&parent))?;
    temp.write_all(bytes).map_err(io_error(destination))?;
    temp.persist(destination)
        .map_err(|e| io_error(destination)(e.error))?;
    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> Result<(), TransportError> {
    ensure_parent(destination)?;
    if source != destination {
        fs::copy(source, destination).map_err(io_error(source))?;
    }
    Ok(())
}
