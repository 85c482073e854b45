//! Text asset access.
//!
//! Shader sources are read through [`AssetSource`] so the host decides where they
//! live (APK assets, a directory, the binary itself).

mod embedded;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{RenderError, Result};

pub use embedded::{
    EmbeddedAssets, BACKGROUND_CAMERA_FRAG, BACKGROUND_CAMERA_VERT, BACKGROUND_DEPTH_FRAG,
    BACKGROUND_DEPTH_VERT,
};

/// Source of UTF-8 text assets.
pub trait AssetSource {
    /// Reads the asset `name` as UTF-8 text.
    ///
    /// Missing or unreadable assets yield [`RenderError::Asset`].
    fn read_text(&self, name: &str) -> Result<String>;
}

impl<A: AssetSource + ?Sized> AssetSource for &A {
    fn read_text(&self, name: &str) -> Result<String> {
        (**self).read_text(name)
    }
}

impl<A: AssetSource + ?Sized> AssetSource for Box<A> {
    fn read_text(&self, name: &str) -> Result<String> {
        (**self).read_text(name)
    }
}

pub(crate) fn not_found(name: &str) -> RenderError {
    RenderError::Asset {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no such asset"),
    }
}

/// Assets resolved relative to a directory on disk.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirAssets {
    fn read_text(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        log::debug!("reading asset {}", path.display());
        std::fs::read_to_string(&path).map_err(|source| RenderError::Asset {
            name: name.to_string(),
            source,
        })
    }
}

/// In-memory assets keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, String>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.insert(name.into(), text.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }
}

impl AssetSource for MemoryAssets {
    fn read_text(&self, name: &str) -> Result<String> {
        self.files.get(name).cloned().ok_or_else(|| not_found(name))
    }
}
