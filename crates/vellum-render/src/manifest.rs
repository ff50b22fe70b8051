//! Client asset manifest produced by the build.
//!
//! The renderer only reads it to decide which files get preload, prefetch,
//! stylesheet and script tags.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;

/// Client asset manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    /// URL prefix of every asset.
    #[serde(rename = "publicPath", default)]
    pub public_path: String,
    /// Every emitted asset.
    #[serde(default)]
    pub all: Vec<String>,
    /// Assets of the entry chunks.
    #[serde(default)]
    pub initial: Vec<String>,
    /// Assets of lazily loaded chunks.
    #[serde(rename = "async", default)]
    pub async_files: Vec<String>,
    /// Module hash to indexes into `all`.
    #[serde(default)]
    pub modules: HashMap<String, Vec<usize>>,
}

/// Kind of an asset, as used in `<link rel=preload as=...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// JavaScript.
    Script,
    /// CSS.
    Style,
    /// Web font.
    Font,
    /// Image.
    Image,
    /// Anything else.
    Other,
}

impl AssetKind {
    /// Guesses the kind from a file name.
    pub fn from_file(file: &str) -> Self {
        let path = file.split(['?', '#']).next().unwrap_or(file);
        let extension = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "js" | "mjs" => Self::Script,
            "css" => Self::Style,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" => Self::Image,
            _ => Self::Other,
        }
    }

    /// Value of the `as` attribute, if the kind can be preloaded.
    pub fn as_attr(&self) -> Option<&'static str> {
        match self {
            Self::Script => Some("script"),
            Self::Style => Some("style"),
            Self::Font => Some("font"),
            Self::Image => Some("image"),
            Self::Other => None,
        }
    }
}

/// A file with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHint {
    /// File name relative to the public path.
    pub file: String,
    /// Asset kind.
    pub kind: AssetKind,
}

impl AssetHint {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            kind: AssetKind::from_file(file),
        }
    }
}

impl RenderManifest {
    /// Parses a manifest from JSON.
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            AppError::with_source(
                ErrorKind::Manifest,
                format!("Invalid client manifest: {e}"),
                e,
            )
        })
    }

    /// Reads a manifest from disk.
    pub async fn load(path: &Path) -> AppResult<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Manifest,
                format!("Cannot read client manifest {}: {e}", path.display()),
                e,
            )
        })?;
        let manifest = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            assets = manifest.all.len(),
            modules = manifest.modules.len(),
            "Client manifest loaded"
        );
        Ok(manifest)
    }

    /// Reads a manifest from disk, falling back to an empty one.
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Client manifest unavailable, rendering without asset hints"
                );
                Self::default()
            }
        }
    }

    /// Public URL of an asset.
    pub fn asset_url(&self, file: &str) -> String {
        format!("{}{}", self.public_path, file)
    }

    /// Files the given module was bundled into.
    pub fn files_for_module(&self, identifier: &str) -> Vec<&str> {
        self.modules
            .get(&module_hash(identifier))
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|&i| self.all.get(i).map(String::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Async files needed by the modules rendered for this request.
    pub fn used_async_files<'a, I>(&self, modules: I) -> BTreeSet<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let async_files: BTreeSet<&str> = self.async_files.iter().map(String::as_str).collect();
        modules
            .into_iter()
            .flat_map(|module| self.files_for_module(module))
            .filter(|file| async_files.contains(file))
            .collect()
    }

    /// Candidates for `<link rel=preload>`: initial files, then async files
    /// used during rendering.
    pub fn preload_candidates<'a, I>(&self, modules: I) -> Vec<AssetHint>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used = self.used_async_files(modules);
        self.initial
            .iter()
            .map(String::as_str)
            .chain(self.async_files.iter().map(String::as_str).filter(|f| used.contains(f)))
            .filter(|file| is_hint_candidate(file))
            .map(AssetHint::new)
            .collect()
    }

    /// Candidates for `<link rel=prefetch>`: async files not used during
    /// rendering.
    pub fn prefetch_candidates<'a, I>(&self, modules: I) -> Vec<AssetHint>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used = self.used_async_files(modules);
        self.async_files
            .iter()
            .map(String::as_str)
            .filter(|file| !used.contains(file) && is_hint_candidate(file))
            .map(AssetHint::new)
            .collect()
    }

    /// Stylesheets to link: initial styles plus used async styles.
    pub fn styles<'a, I>(&self, modules: I) -> Vec<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used = self.used_async_files(modules);
        self.initial
            .iter()
            .map(String::as_str)
            .chain(self.async_files.iter().map(String::as_str).filter(|f| used.contains(f)))
            .filter(|file| AssetKind::from_file(file) == AssetKind::Style)
            .collect()
    }

    /// Entry scripts.
    pub fn scripts(&self) -> Vec<&str> {
        self.initial
            .iter()
            .map(String::as_str)
            .filter(|file| AssetKind::from_file(file) == AssetKind::Script)
            .collect()
    }
}

fn is_hint_candidate(file: &str) -> bool {
    !file.ends_with(".map") && !file.contains(".hot-update.")
}

/// Hash used as key of [`RenderManifest::modules`].
///
/// Stable across builds for the same module identifier; matches the hash the
/// client build writes into the manifest.
pub fn module_hash(identifier: &str) -> String {
    let mut hash = fold(0, "[object String]");
    hash = fold(hash, "string");
    hash = fold(hash, identifier);
    format!("{hash:08x}")
}

fn fold(mut hash: i64, text: &str) -> i64 {
    if text.is_empty() {
        return hash;
    }
    for unit in text.encode_utf16() {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        hash = i64::from((shifted - hash + i64::from(unit)) as i32);
    }
    if hash < 0 { hash * -2 } else { hash }
}
