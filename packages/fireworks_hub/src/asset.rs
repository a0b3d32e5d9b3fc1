//! Asset resolution: map a request attribute to an image and encode it for
//! the wire.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use data_encoding::BASE64;
use tracing::debug;

use crate::error::HubError;

/// An asset encoded for transport (a base64 data URI for known image types).
pub type EncodedAsset = String;

/// Colours with a dedicated picture. Anything else gets the default asset.
pub const PALETTE: [&str; 8] = [
    "blue", "green", "orange", "pink", "purple", "red", "white", "yellow",
];

/// File name used when an attribute is not in the palette.
pub const DEFAULT_ASSET: &str = "heart.jpeg";

/// Resolves request attributes to encoded assets.
///
/// Implementations are synchronous and hold no hub state. Unknown attributes
/// map to the default asset rather than failing; only I/O problems fail.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, attribute: &str) -> Result<EncodedAsset, HubError>;

    fn resolve_default(&self) -> Result<EncodedAsset, HubError>;
}

/// Pick the file name for an attribute (expected lower-case).
pub fn asset_file_name(attribute: &str) -> String {
    if PALETTE.contains(&attribute) {
        format!("{attribute}.jpeg")
    } else {
        DEFAULT_ASSET.to_string()
    }
}

/// Base64-encode image bytes, prefixed with a data URI for png/jpeg.
pub fn encode_image(path: &Path, bytes: &[u8]) -> EncodedAsset {
    let encoded = BASE64.encode(bytes);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => format!("data:image/png;base64,{encoded}"),
        Some("jpg") | Some("jpeg") => format!("data:image/jpeg;base64,{encoded}"),
        _ => encoded,
    }
}

/// Reads assets from a directory, caching each encoded file after its first
/// successful load.
pub struct FileAssetResolver {
    dir: PathBuf,
    default_asset: String,
    cache: Mutex<HashMap<PathBuf, EncodedAsset>>,
}

impl FileAssetResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_default(dir, DEFAULT_ASSET)
    }

    pub fn with_default(dir: impl Into<PathBuf>, default_asset: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_asset: default_asset.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, file_name: &str) -> Result<EncodedAsset, HubError> {
        let path = self.dir.join(file_name);

        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&path).cloned()) {
            return Ok(hit);
        }

        let bytes = std::fs::read(&path).map_err(|e| HubError::AssetResolution {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Loaded asset");

        let encoded = encode_image(&path, &bytes);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path, encoded.clone());
        }
        Ok(encoded)
    }
}

impl AssetResolver for FileAssetResolver {
    fn resolve(&self, attribute: &str) -> Result<EncodedAsset, HubError> {
        let file_name = asset_file_name(attribute);
        if file_name == DEFAULT_ASSET {
            return self.resolve_default();
        }
        self.load(&file_name)
    }

    fn resolve_default(&self) -> Result<EncodedAsset, HubError> {
        self.load(&self.default_asset)
    }
}
