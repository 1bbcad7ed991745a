use std::path::{Path, PathBuf};

/// Expands a leading `~` or `$HOME` to the user's home directory.
///
/// Paths without either prefix, or when no home directory can be determined,
/// are returned unchanged.
pub fn expand_path(path: &Path) -> PathBuf {
    let Some(input) = path.to_str() else {
        return path.to_path_buf();
    };
    PathBuf::from(expand_home(input))
}

fn expand_home(input: &str) -> String {
    let rest = if input == "~" || input.starts_with("~/") {
        &input[1..]
    } else if input == "$HOME" || input.starts_with("$HOME/") {
        &input[5..]
    } else {
        return input.into();
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.to_string_lossy()),
        None => input.into(),
    }
}

/// Returns the final component of `path` as a string, or an empty string.
pub fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
