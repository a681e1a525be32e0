//! Deterministic provider and credential selection.
//!
//! Selection is weighted but reproducible: the same task identity always
//! hashes to the same provider and key, so repeated runs spread load the
//! same way and a failing page can be traced to the vendor that served it.
//! The hash is the first eight bytes of a SHA-256 digest, never the
//! process RNG.

use ladder_models::Region;
use sha2::{Digest as _, Sha256};

use crate::SourceError;
use crate::plan::FetchTask;
use crate::provider::{ProviderPool, ProviderSlot};

/// Stable 64-bit hash of `parts` joined with `:`.
#[must_use]
pub fn stable_hash(parts: &[&str]) -> u64 {
    let digest = Sha256::digest(parts.join(":").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Routes fetch tasks to enabled providers.
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    providers: Vec<ProviderSlot>,
}

impl ProviderRouter {
    /// Builds a router over the enabled slots of `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoProviders`] if no provider has both a
    /// non-zero weight and a credential.
    pub fn new(pool: &ProviderPool) -> Result<Self, SourceError> {
        let providers = pool.enabled();
        if providers.is_empty() {
            return Err(SourceError::NoProviders);
        }
        log::info!(
            "Routing across {} provider(s): {}",
            providers.len(),
            providers
                .iter()
                .map(|p| format!(
                    "{} (weight {}, {} key(s))",
                    p.id(),
                    p.weight,
                    p.credentials.len()
                ))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { providers })
    }

    /// Enabled providers, sorted by id.
    #[must_use]
    pub fn providers(&self) -> &[ProviderSlot] {
        &self.providers
    }

    /// Looks up an enabled provider by id.
    #[must_use]
    pub fn slot(&self, id: &str) -> Option<&ProviderSlot> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// First-attempt provider for a page.
    #[must_use]
    pub fn assign(&self, region: Region, page: u32) -> &str {
        let hash = stable_hash(&[region.as_ref(), &page.to_string()]);
        weighted_pick(self.providers.iter(), hash).unwrap_or_else(|| self.providers[0].id())
    }

    /// Provider for the attempt recorded on `task`.
    ///
    /// Odd attempts always move to a different provider when more than one
    /// is enabled. Even attempts are re-drawn across all providers.
    #[must_use]
    pub fn reroute(&self, task: &FetchTask) -> &str {
        let hash = stable_hash(&[
            task.region.as_ref(),
            &task.page.to_string(),
            &task.attempt.to_string(),
        ]);

        if self.providers.len() > 1 && task.attempt % 2 == 1 {
            let others = self.providers.iter().filter(|p| p.id() != task.provider);
            if let Some(id) = weighted_pick(others, hash) {
                return id;
            }
            // Every other provider has zero weight after all; take the next
            // one in id order.
            let current = self
                .providers
                .iter()
                .position(|p| p.id() == task.provider)
                .unwrap_or(0);
            return self.providers[(current + 1) % self.providers.len()].id();
        }

        weighted_pick(self.providers.iter(), hash).unwrap_or_else(|| self.providers[0].id())
    }

    /// API key for `task`, chosen by region, page, provider and attempt.
    #[must_use]
    pub fn credential(&self, task: &FetchTask) -> Option<&str> {
        let slot = self.slot(&task.provider)?;
        if slot.credentials.is_empty() {
            return None;
        }
        let hash = stable_hash(&[
            task.region.as_ref(),
            &task.page.to_string(),
            &task.provider,
            &task.attempt.to_string(),
        ]);
        let len = slot.credentials.len() as u64;
        let index = usize::try_from(hash % len).unwrap_or(0);
        slot.credentials.get(index).map(String::as_str)
    }
}

/// Walks weighted buckets in order and returns the id `hash` lands in.
fn weighted_pick<'a>(
    candidates: impl Iterator<Item = &'a ProviderSlot> + Clone,
    hash: u64,
) -> Option<&'a str> {
    let total: u64 = candidates.clone().map(|p| u64::from(p.weight)).sum();
    if total == 0 {
        return None;
    }
    let mut point = hash % total;
    for candidate in candidates {
        let weight = u64::from(candidate.weight);
        if point < weight {
            return Some(candidate.id());
        }
        point -= weight;
    }
    None
}
