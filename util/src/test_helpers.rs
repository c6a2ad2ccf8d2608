use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a unique temporary directory to act as the storage root for one test.
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
///
/// Keep the returned `TempDir` in scope for as long as you need the files.
pub fn setup_test_storage_root() -> TempDir {
    TempDir::new().expect("failed to create tempdir")
}

/// Canonical absolute path of a test root, falling back to the raw path.
pub fn root_path(tmp: &TempDir) -> PathBuf {
    tmp.path()
        .canonicalize()
        .unwrap_or_else(|_| tmp.path().to_path_buf())
}
