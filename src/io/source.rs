use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

use bevy::{
    asset::io::{AssetReaderError, ErasedAssetReader, Reader},
    tasks::BoxedFuture,
};

use crate::error::FetchError;


/// Retrieves raw tier payloads by location.
pub trait PayloadSource: Send + Sync + 'static {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxedFuture<'a, Result<Vec<u8>, FetchError>>;
}


fn fetch_error(location: &str, err: AssetReaderError) -> FetchError {
    match err {
        AssetReaderError::NotFound(_) => FetchError::NotFound(location.to_string()),
        AssetReaderError::HttpError(status) => FetchError::Http {
            location: location.to_string(),
            status,
        },
        AssetReaderError::Io(err) => FetchError::Io {
            location: location.to_string(),
            message: err.to_string(),
        },
        #[allow(unreachable_patterns)]
        other => FetchError::Io {
            location: location.to_string(),
            message: other.to_string(),
        },
    }
}


/// Payload source over bevy asset readers.
///
/// Relative locations (`/models/compressed/scan_low.ply.gz`) resolve against
/// the root reader; `http://` and `https://` locations go through the web
/// readers when the `web_asset` feature is enabled.
pub struct AssetReaderSource {
    root: Box<dyn ErasedAssetReader>,
    #[cfg(feature = "web_asset")]
    http: Box<dyn ErasedAssetReader>,
    #[cfg(feature = "web_asset")]
    https: Box<dyn ErasedAssetReader>,
}

impl AssetReaderSource {
    pub fn new(root: Box<dyn ErasedAssetReader>) -> Self {
        Self {
            root,
            #[cfg(feature = "web_asset")]
            http: Box::new(bevy_web_asset::WebAssetReader::Http),
            #[cfg(feature = "web_asset")]
            https: Box::new(bevy_web_asset::WebAssetReader::Https),
        }
    }

    /// Files below `root` on native targets.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn files(root: impl AsRef<Path>) -> Self {
        Self::new(Box::new(bevy::asset::io::file::FileAssetReader::new(root)))
    }

    /// Same-origin http requests below `root` in the browser.
    #[cfg(target_arch = "wasm32")]
    pub fn http(root: impl AsRef<Path>) -> Self {
        Self::new(Box::new(bevy::asset::io::wasm::HttpWasmAssetReader::new(root)))
    }

    /// Default source of the platform, rooted at `assets`.
    pub fn platform_default() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            Self::http("assets")
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            Self::files("assets")
        }
    }

    fn route<'a>(&self, location: &'a str) -> Result<(&dyn ErasedAssetReader, &'a str), FetchError> {
        #[cfg(feature = "web_asset")]
        {
            if let Some(rest) = location.strip_prefix("https://") {
                return Ok((self.https.as_ref(), rest));
            }
            if let Some(rest) = location.strip_prefix("http://") {
                return Ok((self.http.as_ref(), rest));
            }
        }

        #[cfg(not(feature = "web_asset"))]
        {
            if location.starts_with("http://") || location.starts_with("https://") {
                return Err(FetchError::UnsupportedLocation(location.to_string()));
            }
        }

        Ok((self.root.as_ref(), location.trim_start_matches('/')))
    }
}

impl PayloadSource for AssetReaderSource {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxedFuture<'a, Result<Vec<u8>, FetchError>> {
        Box::pin(async move {
            let (reader, path) = self.route(location)?;

            let mut payload = Vec::new();
            let mut stream = reader
                .read(Path::new(path))
                .await
                .map_err(|err| fetch_error(location, err))?;

            stream
                .read_to_end(&mut payload)
                .await
                .map_err(|err| FetchError::Io {
                    location: location.to_string(),
                    message: err.to_string(),
                })?;

            Ok(payload)
        })
    }
}


/// In-memory payloads keyed by location, for tests and embedded clouds.
#[derive(Clone, Default)]
pub struct MemorySource {
    payloads: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: impl Into<String>, payload: impl Into<Arc<[u8]>>) {
        self.payloads
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(location.into(), payload.into());
    }

    pub fn remove(&self, location: &str) {
        self.payloads
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(location);
    }
}

impl PayloadSource for MemorySource {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxedFuture<'a, Result<Vec<u8>, FetchError>> {
        let payload = self
            .payloads
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(location)
            .map(|payload| payload.to_vec())
            .ok_or_else(|| FetchError::NotFound(location.to_string()));

        Box::pin(async move { payload })
    }
}
