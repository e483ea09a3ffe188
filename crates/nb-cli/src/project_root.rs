use std::path::{Path, PathBuf};

/// File that marks the project root.
pub const ROOT_MARKER: &str = "Makefile";
/// Environment variable naming the project root explicitly.
pub const ROOT_ENV: &str = "SIMON_NB_PROJECT_ROOT";

/// Outcome of project-root discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootDiscovery {
    pub root: Option<PathBuf>,
    /// Explicit root that was ignored because it has no marker.
    pub ignored: Option<PathBuf>,
}

/// Finds the project root.
///
/// An explicit root wins when it contains the marker. Otherwise the
/// directory tree is walked upward from `start` until a directory holding
/// the marker is found.
pub fn discover(explicit: Option<&Path>, start: &Path) -> RootDiscovery {
    let mut ignored = None;
    if let Some(dir) = explicit {
        if dir.join(ROOT_MARKER).is_file() {
            return RootDiscovery {
                root: Some(dir.to_path_buf()),
                ignored: None,
            };
        }
        ignored = Some(dir.to_path_buf());
    }

    let root = start
        .ancestors()
        .find(|dir| dir.join(ROOT_MARKER).is_file())
        .map(Path::to_path_buf);
    RootDiscovery { root, ignored }
}

/// `.env` files to load, project root first. dotenvy never overrides a
/// variable that is already set, so the project-root file wins over the
/// working-directory file, and the process environment wins over both.
pub fn env_files(root: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut files = vec![root.join(".env")];
    let local = cwd.join(".env");
    if !files.contains(&local) {
        files.push(local);
    }
    files.retain(|path| path.is_file());
    files
}
