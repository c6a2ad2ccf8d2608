use std::{
    io,
    path::{Path, PathBuf},
};

/// Create a directory (and all parents) if it doesn't exist, and return the path.
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = path.as_ref();
    std::fs::create_dir_all(p)?;
    Ok(p.to_path_buf())
}

/// Resolve a configured root to an absolute path.
/// If relative, resolve against current_dir().
pub fn absolute_root(root: &str) -> PathBuf {
    let p = PathBuf::from(root);
    if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

/// A single bucket folder: {STORAGE_ROOT}/{bucket}
pub fn bucket_dir(storage_root: &str, bucket: &str) -> PathBuf {
    absolute_root(storage_root).join(bucket)
}

/// Path of one archived object: {STORAGE_ROOT}/{bucket}/{key}
pub fn object_path(storage_root: &str, bucket: &str, key: &str) -> PathBuf {
    bucket_dir(storage_root, bucket).join(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_roots_are_kept() {
        let root = if cfg!(windows) { "C:\\archive" } else { "/srv/archive" };
        assert_eq!(absolute_root(root), PathBuf::from(root));
    }

    #[test]
    fn relative_roots_resolve_against_cwd() {
        let resolved = absolute_root("data/archive");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("data/archive"));
    }

    #[test]
    fn object_path_nests_key_under_bucket() {
        let p = object_path("/srv/archive", "bucket-a", "hw1.zip-20240101120000000Z");
        assert!(p.ends_with("bucket-a/hw1.zip-20240101120000000Z"));
    }
}
