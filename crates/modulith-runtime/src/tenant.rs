//! # Tenant Configuration Overlay
//!
//! Each tenant may override any global configuration section. Lookups try
//! the tenant's own section first and fall back to the global one:
//!
//! ```text
//! global:  cache { ttl: 300 }
//! acme:    cache { ttl: 60 }
//!
//! get_tenant_config("acme",  "cache") -> ttl 60
//! get_tenant_config("other", "cache") -> ttl 300
//! get_tenant_config("acme",  "db")    -> ConfigSectionNotFound
//! ```
//!
//! [`TenantAware`] listeners are called after the overlay lock is released,
//! so a listener may read tenant configuration from its callback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{ConfigProvider, TenantId};

use crate::config::{validate_section, ConfigRegistry, ConfigSections};
use crate::errors::AppError;
use crate::module::TenantAware;
use modulith_telemetry::log_tenant_event;

/// Outcome of [`TenantService::register_tenant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantChange {
    /// The tenant did not exist before.
    Registered,
    /// The tenant existed; these sections were added or replaced.
    Updated { sections: Vec<String> },
}

type TenantSections = HashMap<String, Arc<dyn ConfigProvider>>;

/// Per-tenant configuration with fallback to the global sections.
pub struct TenantService {
    global: Arc<ConfigRegistry>,
    tenants: RwLock<BTreeMap<TenantId, TenantSections>>,
    listeners: RwLock<Vec<Arc<dyn TenantAware>>>,
}

impl TenantService {
    pub fn new(global: Arc<ConfigRegistry>) -> Self {
        Self {
            global,
            tenants: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a tenant, or merge `sections` into an existing one.
    ///
    /// Every section is validated before anything is stored.
    pub fn register_tenant(
        &self,
        tenant: TenantId,
        sections: ConfigSections,
    ) -> Result<TenantChange, AppError> {
        for (name, provider) in sections.iter() {
            validate_section(Some(&tenant), name, provider.as_ref())?;
        }

        // Listeners are snapshotted under the overlay lock so a listener
        // registering concurrently hears about this tenant exactly once.
        let (change, listeners) = {
            let mut tenants = self.tenants.write();
            let listeners = self.listeners();
            let change = match tenants.get_mut(&tenant) {
                Some(existing) => {
                    let names = sections.names();
                    existing.extend(sections);
                    TenantChange::Updated { sections: names }
                }
                None => {
                    tenants.insert(tenant.clone(), sections.into_iter().collect());
                    TenantChange::Registered
                }
            };
            (change, listeners)
        };

        match &change {
            TenantChange::Registered => {
                log_tenant_event!(info, tenant, "Tenant registered");
                for listener in &listeners {
                    listener.on_tenant_registered(&tenant);
                }
            }
            TenantChange::Updated { sections } => {
                log_tenant_event!(info, tenant, "Tenant re-registered, sections merged", sections = ?sections);
                for listener in &listeners {
                    for section in sections {
                        listener.on_tenant_config_updated(&tenant, section);
                    }
                }
            }
        }

        Ok(change)
    }

    /// Add or replace one section of a registered tenant.
    pub fn update_tenant_config(
        &self,
        tenant: &TenantId,
        section: &str,
        provider: Arc<dyn ConfigProvider>,
    ) -> Result<(), AppError> {
        validate_section(Some(tenant), section, provider.as_ref())?;

        {
            let mut tenants = self.tenants.write();
            let sections = tenants
                .get_mut(tenant)
                .ok_or_else(|| AppError::TenantNotFound {
                    tenant: tenant.clone(),
                })?;
            sections.insert(section.to_string(), provider);
        }

        log_tenant_event!(info, tenant, "Tenant config updated", section = %section);
        for listener in self.listeners() {
            listener.on_tenant_config_updated(tenant, section);
        }
        Ok(())
    }

    /// Forget a tenant. Its lookups fall back to global configuration.
    pub fn remove_tenant(&self, tenant: &TenantId) -> bool {
        let removed = self.tenants.write().remove(tenant).is_some();
        if removed {
            log_tenant_event!(info, tenant, "Tenant removed");
        }
        removed
    }

    /// Resolve `section` for `tenant`: tenant override, then global.
    pub fn get_tenant_config(
        &self,
        tenant: &TenantId,
        section: &str,
    ) -> Result<Arc<dyn ConfigProvider>, AppError> {
        let tenant_section = self
            .tenants
            .read()
            .get(tenant)
            .and_then(|sections| sections.get(section))
            .cloned();

        if let Some(provider) = tenant_section {
            return Ok(provider);
        }

        self.global
            .get_config_section(section)
            .map_err(|_| AppError::ConfigSectionNotFound {
                tenant: Some(tenant.clone()),
                section: section.to_string(),
            })
    }

    /// Registered tenants, sorted.
    #[must_use]
    pub fn get_tenants(&self) -> Vec<TenantId> {
        self.tenants.read().keys().cloned().collect()
    }

    /// Names of the sections a tenant overrides.
    #[must_use]
    pub fn tenant_sections(&self, tenant: &TenantId) -> Option<Vec<String>> {
        self.tenants.read().get(tenant).map(|sections| {
            let mut names: Vec<String> = sections.keys().cloned().collect();
            names.sort();
            names
        })
    }

    #[must_use]
    pub fn has_tenant(&self, tenant: &TenantId) -> bool {
        self.tenants.read().contains_key(tenant)
    }

    /// Subscribe to tenant changes. The listener is told about every tenant
    /// that is already registered.
    pub fn register_tenant_aware(&self, listener: Arc<dyn TenantAware>) {
        let existing: Vec<TenantId> = {
            let tenants = self.tenants.read();
            self.listeners.write().push(Arc::clone(&listener));
            tenants.keys().cloned().collect()
        };
        for tenant in existing {
            listener.on_tenant_registered(&tenant);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn TenantAware>> {
        self.listeners.read().clone()
    }
}
