//! Where Sift stores its own data (config).
//!
//! Images stay in the folder the user points us at. We only store app state here.

use std::path::PathBuf;

/// Returns the directory where Sift stores config and other app data.
/// On macOS: `~/Library/Application Support/Sift/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Sift", "Sift")?.data_local_dir().to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default image root when nothing is configured: the user's desktop.
pub fn default_image_root() -> Option<PathBuf> {
    directories::UserDirs::new()
        .and_then(|u| u.desktop_dir().map(|p| p.to_path_buf()))
        .or_else(|| directories::BaseDirs::new().map(|b| b.home_dir().join("Desktop")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }

    #[test]
    fn default_root_is_absolute() {
        if let Some(p) = default_image_root() {
            assert!(p.is_absolute());
        }
    }
}
