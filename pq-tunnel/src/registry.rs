//! Threshold table mapping health to a suite

use crate::agility::HealthSignal;
use crate::config::{AgilityPolicy, TunnelConfig};
use crate::error::{Result, TunnelError};
use crate::suite::{SuiteDescriptor, SuiteId};

/// One row of the table
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryEntry {
    /// Lower bound, inclusive
    pub threshold: f64,
    pub descriptor: SuiteDescriptor,
}

/// Immutable suite table sorted by descending threshold.
///
/// Built once and shared behind `Arc`; it holds no interior mutability, so
/// concurrent sessions read it without locking.
#[derive(Clone, Debug)]
pub struct SuiteRegistry {
    entries: Vec<RegistryEntry>,
    fallback: SuiteDescriptor,
}

impl SuiteRegistry {
    /// The default table: 70 / 40 / 20 with the X25519 fallback.
    pub fn standard() -> Self {
        Self::assemble(&AgilityPolicy::default())
    }

    pub fn from_config(config: &TunnelConfig) -> Result<Self> {
        Self::from_policy(&config.agility)
    }

    pub fn from_policy(policy: &AgilityPolicy) -> Result<Self> {
        policy.validate()?;
        let registry = Self::assemble(policy);
        for entry in &registry.entries {
            entry.descriptor.validate()?;
        }
        registry.fallback.validate()?;
        Ok(registry)
    }

    fn assemble(policy: &AgilityPolicy) -> Self {
        let mut entries: Vec<RegistryEntry> = policy
            .thresholds
            .iter()
            .map(|t| RegistryEntry {
                threshold: t.min_health,
                descriptor: SuiteDescriptor::standard(t.suite),
            })
            .collect();
        entries.sort_by(|a, b| b.threshold.total_cmp(&a.threshold));

        Self {
            entries,
            fallback: SuiteDescriptor::standard(policy.fallback_suite),
        }
    }

    /// First suite whose threshold is at or below `health`, else the fallback.
    pub fn resolve(&self, health: HealthSignal) -> &SuiteDescriptor {
        self.resolve_value(health.value())
    }

    pub(crate) fn resolve_value(&self, health: f64) -> &SuiteDescriptor {
        self.entries
            .iter()
            .find(|entry| entry.threshold <= health)
            .map(|entry| &entry.descriptor)
            .unwrap_or(&self.fallback)
    }

    /// Descriptor for `id`, or `SuiteMismatch` if this registry does not carry it.
    pub fn lookup(&self, id: SuiteId) -> Result<&SuiteDescriptor> {
        self.get(id).ok_or_else(|| TunnelError::SuiteMismatch {
            expected: "a registered suite".into(),
            received: id.to_string(),
        })
    }

    /// Validate a suite code claimed by a peer.
    pub fn lookup_wire(&self, code: u8) -> Result<&SuiteDescriptor> {
        let id = SuiteId::from_wire_code(code).ok_or_else(|| TunnelError::SuiteMismatch {
            expected: "a registered suite".into(),
            received: format!("unknown suite code {code:#04x}"),
        })?;
        self.lookup(id)
    }

    pub fn get(&self, id: SuiteId) -> Option<&SuiteDescriptor> {
        self.entries
            .iter()
            .map(|entry| &entry.descriptor)
            .chain(std::iter::once(&self.fallback))
            .find(|descriptor| descriptor.id == id)
    }

    /// Threshold of `id`; the fallback sits at zero.
    pub fn threshold_of(&self, id: SuiteId) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.id == id)
            .map(|entry| entry.threshold)
            .or_else(|| (self.fallback.id == id).then_some(0.0))
    }

    pub fn fallback(&self) -> &SuiteDescriptor {
        &self.fallback
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }
}

impl Default for SuiteRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
