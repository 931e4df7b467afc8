use std::path::{Path, PathBuf};

use serde::Serialize;

/// Handle to a module inside its owning [`Process`](super::Process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// A loaded executable or library image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    name: String,
    path: PathBuf,
    size: u64,
    base_address: u64,
}

impl Module {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64, base_address: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            base_address,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the image file on disk.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }
}

/// Size of an image file on disk, or `fallback` (usually the mapped image
/// size) when the file cannot be inspected.
pub(crate) fn image_size(path: &Path, fallback: u64) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_falls_back() {
        let size = image_size(Path::new("/definitely/not/here.dll"), 0x1000);
        assert_eq!(size, 0x1000);
    }

    #[test]
    fn test_accessors() {
        let module = Module::new("dxhr.exe", "C:/Games/dxhr.exe", 0x2000, 0x400000);
        assert_eq!(module.name(), "dxhr.exe");
        assert_eq!(module.size(), 0x2000);
        assert_eq!(module.base_address(), 0x400000);
    }
}
