//! Process-wide registry of known license plates.
//!
//! The registry is populated once at startup and is read-only afterwards, so
//! validators read it concurrently without any locking.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use std::path::Path;

static GLOBAL_REGISTRY: OnceCell<PlateRegistry> = OnceCell::new();

/// Plates known to the application at build time
pub const DEFAULT_PLATES: &[&str] = &[
    "007-CMD-228",
    "DK-1234-AB",
    "DK 4444 H",
    "AA-012-BC",
    "AA-796-CX",
];

/// Immutable list of registered plate strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlateRegistry {
    entries: Vec<String>,
}

impl PlateRegistry {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Registry seeded with [`DEFAULT_PLATES`]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PLATES.iter().copied())
    }

    /// Load a registry from a text file: one plate per line, blank lines and
    /// lines starting with `#` are ignored.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plate registry {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    /// Parse registry text (same format as [`PlateRegistry::load_file`])
    pub fn parse(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Exact, case-sensitive membership of the raw string
    pub fn contains(&self, plate: &str) -> bool {
        self.entries.iter().any(|entry| entry == plate)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install `registry` as the process-wide registry.
    ///
    /// Fails if a registry has already been installed; the first one stays.
    pub fn install(registry: PlateRegistry) -> Result<&'static PlateRegistry> {
        let count = registry.len();
        GLOBAL_REGISTRY
            .set(registry)
            .map_err(|_| anyhow!("Plate registry is already installed"))?;
        tracing::info!(entries = count, "Installed plate registry");
        GLOBAL_REGISTRY
            .get()
            .ok_or_else(|| anyhow!("Plate registry missing after install"))
    }

    /// The installed process-wide registry, if any
    pub fn global() -> Option<&'static PlateRegistry> {
        GLOBAL_REGISTRY.get()
    }
}
