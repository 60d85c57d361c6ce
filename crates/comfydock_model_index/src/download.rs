use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

use comfydock_workflow::{LoaderTable, infer_category};
use url::Url;

use crate::{DownloadError, ModelRepository, ModelWithLocation, SourceType};

/// Progress callback: `(bytes_downloaded, total_bytes)`. The total is absent
/// when the server sends no Content-Length.
pub type ProgressFn<'a> = &'a dyn Fn(u64, Option<u64>);

/// A request to fetch one model into the global models directory.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Absolute target path under the global models directory.
    pub target_path: PathBuf,
}

/// Streams model files from URLs into the global models directory, hashing
/// while downloading, and registers the result in the model index together
/// with its source URL.
pub struct ModelDownloader<'a> {
    repository: &'a ModelRepository,
    models_dir: PathBuf,
    loaders: LoaderTable,
    client: reqwest::blocking::Client,
}

impl<'a> ModelDownloader<'a> {
    pub fn new(repository: &'a ModelRepository, models_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            repository,
            models_dir: models_dir.into(),
            loaders: LoaderTable,
            client,
        }
    }

    /// Suggest a relative target path for a URL. Known loader node types pin
    /// the base directory; otherwise the category is inferred from the
    /// filename hint, defaulting to the generic models directory.
    pub fn suggest_path(
        &self,
        url: &str,
        node_type: Option<&str>,
        filename_hint: Option<&str>,
    ) -> PathBuf {
        let filename = extract_filename(url, filename_hint);

        if let Some(node_type) = node_type {
            if self.loaders.is_loader(node_type) {
                let base = self.loaders.directories(node_type)[0];
                return Path::new(base).join(filename);
            }
        }
        if let Some(hint) = filename_hint {
            return Path::new(infer_category(hint)).join(filename);
        }
        Path::new("models").join(filename)
    }

    /// Download and index a model.
    ///
    /// A URL already recorded as a source short-circuits to the existing
    /// model. Otherwise the body is streamed into a temporary file next to
    /// the target (hashing as it goes), renamed into place atomically, and
    /// registered with its location and source.
    pub fn download(
        &self,
        request: &DownloadRequest,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<ModelWithLocation, DownloadError> {
        if let Some(existing) = self.repository.find_by_source_url(&request.url)? {
            tracing::info!(
                "model already downloaded from this URL: {}",
                existing.relative_path
            );
            return Ok(existing);
        }

        let parent = request
            .target_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.models_dir.clone());
        fs_err::create_dir_all(&parent)?;

        tracing::info!("downloading {}", request.url);
        let response = self
            .client
            .get(&request.url)
            .send()
            .map_err(|source| DownloadError::Request {
                url: request.url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }
        let total_size = response.content_length();

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        let mut hasher = blake3::Hasher::new();
        let mut downloaded: u64 = 0;
        let mut reader = response;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = reader
                .read(&mut buffer)
                .map_err(DownloadError::Io)?;
            if read == 0 {
                break;
            }
            temp.write_all(&buffer[..read])?;
            hasher.update(&buffer[..read]);
            downloaded += read as u64;
            if let Some(on_progress) = on_progress {
                on_progress(downloaded, total_size);
            }
        }
        temp.flush()?;

        let short_hash = crate::hash::compute_short_hash(temp.path())
            .map_err(DownloadError::Index)?;
        let blake3_hash = hasher.finalize().to_hex().to_string();

        // The temp file lives in the target's parent, so this rename is
        // atomic; failure drops the temp file via its guard.
        temp.persist(&request.target_path)
            .map_err(|err| DownloadError::Io(err.error))?;

        let relative_path = request
            .target_path
            .strip_prefix(&self.models_dir)
            .unwrap_or(&request.target_path)
            .to_string_lossy()
            .replace('\\', "/");
        let filename = request
            .target_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mtime = fs_err::metadata(&request.target_path)?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        self.repository
            .ensure_model(&short_hash, downloaded, Some(&blake3_hash), None)?;
        self.repository
            .add_location(&short_hash, &relative_path, &filename, mtime)?;
        self.repository.add_source(
            &short_hash,
            SourceType::detect(&request.url),
            &request.url,
            None,
        )?;

        tracing::info!("downloaded and indexed {relative_path}");
        Ok(ModelWithLocation {
            hash: short_hash,
            file_size: downloaded,
            blake3_hash: Some(blake3_hash),
            sha256_hash: None,
            relative_path,
            filename,
            mtime,
            last_seen: mtime as i64,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        })
    }
}

fn extract_filename(url: &str, filename_hint: Option<&str>) -> String {
    // A URL path segment with an extension wins.
    if let Ok(parsed) = Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
        {
            if last.contains('.') && !last.is_empty() {
                return last.to_string();
            }
        }
    }
    if let Some(hint) = filename_hint {
        if let Some(name) = Path::new(hint).file_name().and_then(|n| n.to_str()) {
            return name.to_string();
        }
    }
    "downloaded_model.safetensors".to_string()
}
