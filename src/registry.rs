use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::checksum::{Checksum, ChecksumEngine};
use crate::error::RegistryError;
use crate::model::TypeDefinition;

/// Immutable mapping from type name to checksum for every non-local type a
/// process knows about.
///
/// A registry is built once and never mutated. Reloading a schema produces a
/// new value; share it between threads with `Arc<Registry>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, Checksum>,
}

impl Registry {
    /// Checksum every non-local definition.
    ///
    /// Fails on the first name claimed by more than one definition, local or
    /// not. Local definitions are still visible to the engine so references
    /// to them resolve, but never get an entry of their own.
    pub fn build<I>(definitions: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = TypeDefinition>,
    {
        let definitions: Vec<TypeDefinition> = definitions.into_iter().collect();

        let mut seen = HashSet::with_capacity(definitions.len());
        for def in &definitions {
            if !seen.insert(def.name.as_str()) {
                return Err(RegistryError::DuplicateName {
                    name: def.name.clone(),
                });
            }
        }

        let engine = ChecksumEngine::new(&definitions);
        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;
        for def in &definitions {
            if def.local {
                skipped += 1;
                continue;
            }
            if let Some(sum) = engine.compute(&def.name) {
                debug!(name = %def.name, checksum = %sum, "computed checksum");
                entries.insert(def.name.clone(), sum);
            }
        }

        info!(
            types = entries.len(),
            local = skipped,
            "built checksum registry"
        );
        Ok(Self { entries })
    }

    /// Wrap an already generated name to checksum table.
    pub fn from_checksums(entries: BTreeMap<String, Checksum>) -> Self {
        Self { entries }
    }

    /// Build from a JSON array of definitions.
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let definitions: Vec<TypeDefinition> = serde_json::from_str(json)?;
        Self::build(definitions)
    }

    /// Build from a JSON schema file emitted by the schema compiler.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Read-only view of every entry.
    pub fn get(&self) -> &BTreeMap<String, Checksum> {
        &self.entries
    }

    pub fn lookup(&self, name: &str) -> Result<Checksum, RegistryError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Checksum)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
