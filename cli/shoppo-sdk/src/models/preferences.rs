use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::{JsonFileError, acquire_lock, read_json_file, write_json_file};

pub const PREFERENCES_FILENAME: &str = "preferences.json";

/// How favorites are displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoritesLayout {
    #[default]
    List,
    Grid,
}

impl Display for FavoritesLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FavoritesLayout::List => write!(f, "list"),
            FavoritesLayout::Grid => write!(f, "grid"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown favorites layout '{0}', expected 'list' or 'grid'")]
pub struct UnknownLayout(String);

impl FromStr for FavoritesLayout {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(FavoritesLayout::List),
            "grid" => Ok(FavoritesLayout::Grid),
            other => Err(UnknownLayout(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub favorites_layout: FavoritesLayout,
}

impl Preferences {
    pub fn path(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join(PREFERENCES_FILENAME)
    }

    /// Read the preferences stored in `data_dir`, defaults if there are none.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, JsonFileError> {
        Ok(read_json_file(Self::path(data_dir))?.unwrap_or_default())
    }

    pub fn save(&self, data_dir: impl AsRef<Path>) -> Result<(), JsonFileError> {
        let path = Self::path(data_dir);
        let lock = acquire_lock(&path)?;
        write_json_file(self, &path, &lock)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_to_list() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Preferences::load(dir.path()).unwrap().favorites_layout,
            FavoritesLayout::List
        );
    }

    #[test]
    fn layout_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let preferences = Preferences {
            favorites_layout: FavoritesLayout::Grid,
        };
        preferences.save(dir.path()).unwrap();

        assert_eq!(Preferences::load(dir.path()).unwrap(), preferences);
        let raw = std::fs::read_to_string(Preferences::path(dir.path())).unwrap();
        assert!(raw.contains(r#""favorites_layout": "grid""#));
    }

    #[test]
    fn parses_layout_names() {
        assert_eq!("grid".parse::<FavoritesLayout>().unwrap(), FavoritesLayout::Grid);
        assert!("table".parse::<FavoritesLayout>().is_err());
    }
}
