/*!
Module path resolution.

Pure functions: the same inputs always produce the same path, and nothing
here touches the filesystem.
*/

use std::env::consts::DLL_SUFFIX;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// File name of a provider module, following the platform convention
///
/// `"legacy"` becomes `legacy.so` on Linux, `legacy.dylib` on macOS and
/// `legacy.dll` on Windows. A name that already carries the suffix is kept.
pub fn module_file_name(name: &str) -> String {
    if name.ends_with(DLL_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, DLL_SUFFIX)
    }
}

/// Compute the on-disk path of a provider module
///
/// An explicit path wins outright. Otherwise the platform file name for
/// `name` is placed in `env_dir` when the environment override is present,
/// or in `builtin_dir`.
pub fn resolve_module_path(
    name: &str,
    explicit_path: Option<&Path>,
    env_dir: Option<&OsStr>,
    builtin_dir: &Path,
) -> PathBuf {
    if let Some(path) = explicit_path {
        return path.to_path_buf();
    }

    let file_name = module_file_name(name);
    match env_dir {
        Some(dir) => Path::new(dir).join(file_name),
        None => builtin_dir.join(file_name),
    }
}
