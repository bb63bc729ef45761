use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::{error::ProfileError, pointer_chain::PointerChain, value::ValueKind};

#[derive(Clone, Debug, Deserialize)]
pub struct ProcessTarget {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ValueEntry {
    /// Defaults to the process executable.
    pub module: Option<String>,
    pub base_offset: u64,
    #[serde(default)]
    pub offsets: Vec<u64>,
    pub kind: ValueKind,
}

/// Named pointer chains for one game.
#[derive(Clone, Debug, Deserialize)]
pub struct TrainerProfile {
    pub process: ProcessTarget,
    #[serde(default)]
    pub values: BTreeMap<String, ValueEntry>,
}

impl TrainerProfile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_owned(),
            source,
        })?;
        let profile = Self::from_toml_str(&text)?;
        debug!(
            "loaded {} ({} values) from {}",
            profile.process.name,
            profile.values.len(),
            path.display()
        );
        Ok(profile)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(text)?)
    }

    pub fn value(&self, name: &str) -> Result<&ValueEntry, ProfileError> {
        self.values
            .get(name)
            .ok_or_else(|| ProfileError::UnknownValue(name.to_owned()))
    }

    pub fn pointer_chain(&self, name: &str) -> Result<(PointerChain, ValueKind), ProfileError> {
        let entry = self.value(name)?;
        let module = entry.module.as_ref().unwrap_or(&self.process.name);
        Ok((
            PointerChain::new(module.clone(), entry.base_offset, entry.offsets.clone()),
            entry.kind,
        ))
    }
}
