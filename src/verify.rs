//! Compares a peer's checksums against the local registry.
//!
//! Only names the peer reports are classified. A local type the peer does
//! not mention is never an incompatibility.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::error::{TransportError, VerifyError};
use crate::exchange::{ChecksumMap, ChecksumSource};
use crate::registry::Registry;

/// Classification of one remote type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    Match,
    /// Both sides know the type but disagree on its shape.
    Mismatch { local: Checksum, remote: Checksum },
    /// The local process has no definition for the type.
    Unknown { remote: Checksum },
}

/// Full result of a verification, keyed by type name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verification {
    entries: BTreeMap<String, Compatibility>,
}

impl Verification {
    pub fn get(&self, name: &str) -> Option<&Compatibility> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Compatibility)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn matches(&self) -> impl Iterator<Item = &str> {
        self.filter(|c| matches!(c, Compatibility::Match))
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &str> {
        self.filter(|c| matches!(c, Compatibility::Mismatch { .. }))
    }

    pub fn unknowns(&self) -> impl Iterator<Item = &str> {
        self.filter(|c| matches!(c, Compatibility::Unknown { .. }))
    }

    fn filter<F>(&self, pred: F) -> impl Iterator<Item = &str>
    where
        F: Fn(&Compatibility) -> bool,
    {
        self.entries
            .iter()
            .filter(move |&(_, c)| pred(c))
            .map(|(k, _)| k.as_str())
    }

    /// No shared type disagrees. Unknown names do not count against it.
    pub fn is_compatible(&self) -> bool {
        self.mismatches().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify every name in `remote` against `local`.
pub fn verify(local: &Registry, remote: &ChecksumMap) -> Verification {
    let entries = remote
        .iter()
        .map(|(name, &theirs)| {
            let class = match local.get().get(name) {
                None => {
                    debug!(%name, "type unknown locally");
                    Compatibility::Unknown { remote: theirs }
                }
                Some(&ours) if ours == theirs => Compatibility::Match,
                Some(&ours) => {
                    warn!(%name, local = %ours, remote = %theirs, "checksum mismatch");
                    Compatibility::Mismatch {
                        local: ours,
                        remote: theirs,
                    }
                }
            };
            (name.clone(), class)
        })
        .collect();

    Verification { entries }
}

/// Fetch the peer's checksums and classify them. Transport failures are
/// returned untouched; there is no partial result.
pub fn verify_peer<S>(local: &Registry, peer: &S) -> Result<Verification, TransportError>
where
    S: ChecksumSource + ?Sized,
{
    let remote = peer.get_schema_checksums()?;
    let verification = verify(local, &remote);
    debug!(
        checked = verification.len(),
        mismatched = verification.mismatches().count(),
        unknown = verification.unknowns().count(),
        "verified peer checksums"
    );
    Ok(verification)
}

/// What a caller treats as fatal. The verifier itself never decides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyPolicy {
    pub reject_mismatch: bool,
    pub reject_unknown: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            reject_mismatch: true,
            reject_unknown: false,
        }
    }
}

impl VerifyPolicy {
    /// Fails listing every offending name, not only the first.
    pub fn enforce(&self, verification: &Verification) -> Result<(), VerifyError> {
        let mismatched: Vec<String> = if self.reject_mismatch {
            verification.mismatches().map(str::to_string).collect()
        } else {
            Vec::new()
        };
        let unknown: Vec<String> = if self.reject_unknown {
            verification.unknowns().map(str::to_string).collect()
        } else {
            Vec::new()
        };

        if mismatched.is_empty() && unknown.is_empty() {
            Ok(())
        } else {
            Err(VerifyError::Incompatible {
                mismatched,
                unknown,
            })
        }
    }
}
