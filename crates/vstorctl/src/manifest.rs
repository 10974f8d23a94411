use anyhow::{Context, Result};
use common::UnitParams;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Units to provision at startup.
///
/// ```yaml
/// capacity: 32
/// units:
///   - unique_id: 6f1c1a5e-3c55-4a3e-9d53-0a4cf7f0e2a1
///     block_count: 2048
///     block_length: 512
///     max_transfer_length: 65536
///     write_protected: false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Overrides `VSTOR_CAPACITY` when present.
    #[serde(default)]
    pub capacity: Option<usize>,
    pub units: Vec<UnitParams>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing unit manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
    }
}
