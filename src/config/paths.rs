//! Companion file naming.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const MASTER_EXTENSION: &str = "mst";
pub const XRF_EXTENSION: &str = "xrf";

/// The `.mst`/`.xrf` pair sharing one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePaths {
    base: PathBuf,
}

impl DatabasePaths {
    /// Accepts either the bare base name or a path to one of the two files.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let base = match path.extension().and_then(|e| e.to_str()) {
            Some(ext)
                if ext.eq_ignore_ascii_case(MASTER_EXTENSION)
                    || ext.eq_ignore_ascii_case(XRF_EXTENSION) =>
            {
                path.with_extension("")
            }
            _ => path.to_path_buf(),
        };
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn master(&self) -> PathBuf {
        self.with_suffix(MASTER_EXTENSION)
    }

    pub fn xrf(&self) -> PathBuf {
        self.with_suffix(XRF_EXTENSION)
    }

    /// Appends rather than replaces, so dotted base names survive.
    fn with_suffix(&self, ext: &str) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.master().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        let paths = DatabasePaths::new("/data/cds");
        assert_eq!(paths.master(), PathBuf::from("/data/cds.mst"));
        assert_eq!(paths.xrf(), PathBuf::from("/data/cds.xrf"));
    }

    #[test]
    fn test_extension_is_stripped() {
        assert_eq!(DatabasePaths::new("/data/cds.MST").base(), Path::new("/data/cds"));
        assert_eq!(DatabasePaths::new("/data/cds.xrf").base(), Path::new("/data/cds"));
    }

    #[test]
    fn test_dotted_base_name_kept() {
        let paths = DatabasePaths::new("/data/lilacs.2024");
        assert_eq!(paths.master(), PathBuf::from("/data/lilacs.2024.mst"));
    }
}
