//! # Runtime Configuration
//!
//! - [`ConfigRegistry`]: global configuration sections, keyed by name.
//! - [`ConfigSections`]: a batch of named sections, as handed to tenant registration.
//! - [`RuntimeConfig`]: which modules are enabled, loaded from the environment.
//!
//! ## Environment
//!
//! Every module is enabled unless switched off:
//!
//! ```text
//! MODULITH_MODULE_CACHE=false          # disables "cache"
//! MODULITH_MODULE_AUTH_PROVIDER=0      # disables "auth-provider"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{ConfigProvider, TenantId};
use tracing::debug;

use crate::errors::AppError;

/// Environment prefix for per-module enable flags.
pub const MODULE_ENV_PREFIX: &str = "MODULITH_MODULE_";

/// Global configuration sections.
#[derive(Default)]
pub struct ConfigRegistry {
    sections: RwLock<BTreeMap<String, Arc<dyn ConfigProvider>>>,
}

impl ConfigRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a section. Returns the provider it replaced.
    pub fn register_config_section(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn ConfigProvider>,
    ) -> Option<Arc<dyn ConfigProvider>> {
        let name = name.into();
        debug!(section = %name, type_name = provider.type_name(), "Config section registered");
        self.sections.write().insert(name, provider)
    }

    pub fn get_config_section(&self, name: &str) -> Result<Arc<dyn ConfigProvider>, AppError> {
        self.sections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::ConfigSectionNotFound {
                tenant: None,
                section: name.to_string(),
            })
    }

    /// Section names, sorted.
    #[must_use]
    pub fn config_sections(&self) -> Vec<String> {
        self.sections.read().keys().cloned().collect()
    }

    /// Validate every section in name order; the first failure is returned.
    pub fn validate_all(&self) -> Result<(), AppError> {
        let sections: Vec<(String, Arc<dyn ConfigProvider>)> = self
            .sections
            .read()
            .iter()
            .map(|(name, provider)| (name.clone(), Arc::clone(provider)))
            .collect();

        for (name, provider) in sections {
            validate_section(None, &name, provider.as_ref())?;
        }
        Ok(())
    }
}

/// Run a provider's validation, attributing failure to `section`.
pub(crate) fn validate_section(
    tenant: Option<&TenantId>,
    section: &str,
    provider: &dyn ConfigProvider,
) -> Result<(), AppError> {
    provider
        .validate()
        .map_err(|cause| AppError::ConfigValidationFailed {
            tenant: tenant.cloned(),
            section: section.to_string(),
            cause,
        })
}

/// Named configuration sections.
///
/// ```rust,ignore
/// let sections = ConfigSections::new()
///     .section("cache", StdConfigProvider::new(CacheConfig { ttl: 60 }));
/// ```
#[derive(Default, Clone)]
pub struct ConfigSections {
    sections: BTreeMap<String, Arc<dyn ConfigProvider>>,
}

impl ConfigSections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn section(mut self, name: impl Into<String>, provider: impl ConfigProvider + 'static) -> Self {
        self.sections.insert(name.into(), Arc::new(provider));
        self
    }

    #[must_use]
    pub fn shared_section(mut self, name: impl Into<String>, provider: Arc<dyn ConfigProvider>) -> Self {
        self.sections.insert(name.into(), provider);
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ConfigProvider>)> {
        self.sections.iter().map(|(name, provider)| (name.as_str(), provider))
    }
}

impl IntoIterator for ConfigSections {
    type Item = (String, Arc<dyn ConfigProvider>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Arc<dyn ConfigProvider>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sections.into_iter()
    }
}

/// Which modules take part in the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Normalized names of disabled modules.
    disabled: BTreeSet<String>,
}

impl RuntimeConfig {
    /// Load enable flags from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load enable flags from `(key, value)` pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let disabled = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let module = key.as_ref().strip_prefix(MODULE_ENV_PREFIX)?;
                (!is_enabled_flag(value.as_ref())).then(|| env_key(module))
            })
            .collect();

        Self { disabled }
    }

    #[must_use]
    pub fn is_enabled(&self, module: &str) -> bool {
        !self.disabled.contains(&env_key(module))
    }

    pub fn disable(&mut self, module: &str) {
        self.disabled.insert(env_key(module));
    }

    pub fn enable(&mut self, module: &str) {
        self.disabled.remove(&env_key(module));
    }
}

/// `auth-provider` and `auth.provider` both map to `AUTH_PROVIDER`.
fn env_key(module: &str) -> String {
    module
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn is_enabled_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}
