// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor configuration (`soundedit.ron`).
//!
//! Lists the known games and the manifest each one uses.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent
pub const CONFIG_FILE_NAME: &str = "soundedit.ron";

/// A game and its manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    /// Game name, used as the registry key
    pub name: String,
    /// Path to the game's JSON manifest
    pub manifest: PathBuf,
}

/// Editor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Known games
    pub games: Vec<GameEntry>,
    /// Game selected when `--game` is not given
    pub default_game: Option<String>,
}

impl EditorConfig {
    /// Load a config file. Relative manifest paths resolve against its directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: EditorConfig = ron::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for game in &mut config.games {
            if game.manifest.is_relative() {
                game.manifest = base.join(&game.manifest);
            }
        }

        tracing::debug!("Loaded config {} ({} games)", path.display(), config.games.len());
        Ok(config)
    }

    /// Load `explicit` if given, else `soundedit.ron` in `dir` if present, else defaults
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let implicit = dir.join(CONFIG_FILE_NAME);
        if implicit.is_file() {
            Self::load(&implicit)
        } else {
            Ok(Self::default())
        }
    }

    /// A game by name
    pub fn game(&self, name: &str) -> Option<&GameEntry> {
        self.games.iter().find(|g| g.name == name)
    }

    /// Pick a game: the requested one, else the default, else the first listed
    pub fn select(&self, requested: Option<&str>) -> anyhow::Result<&GameEntry> {
        let name = match requested.or(self.default_game.as_deref()) {
            Some(name) => name,
            None => match self.games.first() {
                Some(game) => return Ok(game),
                None => bail!("No games configured; pass --manifest or add one to {CONFIG_FILE_NAME}"),
            },
        };
        self.game(name).with_context(|| {
            let known: Vec<_> = self.games.iter().map(|g| g.name.as_str()).collect();
            format!("Unknown game '{name}' (configured: {})", known.join(", "))
        })
    }
}
