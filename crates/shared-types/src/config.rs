//! # Configuration Providers
//!
//! Configuration sections reach the runtime as [`ConfigProvider`] values.
//! Where they come from (files, environment, remote stores) is the caller's
//! concern; the runtime only stores, validates and hands them back.

use std::any::{type_name, Any};
use std::fmt;

/// Self-validation hook for configuration structs.
pub trait ConfigValidator {
    fn validate(&self) -> anyhow::Result<()>;
}

/// A configuration section as seen by the runtime.
pub trait ConfigProvider: Send + Sync {
    /// The section value, to be downcast by its consumer.
    fn get_config(&self) -> &(dyn Any + Send + Sync);

    /// Type name of the section value, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Check the section before it is used. Defaults to accepting anything.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl dyn ConfigProvider {
    /// Downcast the section to its concrete type.
    #[must_use]
    pub fn typed<T: 'static>(&self) -> Option<&T> {
        self.get_config().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn ConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("type_name", &self.type_name())
            .finish()
    }
}

/// Provider holding a section value in memory.
pub struct StdConfigProvider<T> {
    value: T,
    validator: Option<fn(&T) -> anyhow::Result<()>>,
}

impl<T: Send + Sync + 'static> StdConfigProvider<T> {
    /// A provider that performs no validation.
    pub fn new(value: T) -> Self {
        Self {
            value,
            validator: None,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: ConfigValidator + Send + Sync + 'static> StdConfigProvider<T> {
    /// A provider that runs [`ConfigValidator::validate`] when asked to validate.
    pub fn validated(value: T) -> Self {
        Self {
            value,
            validator: Some(<T as ConfigValidator>::validate),
        }
    }
}

impl<T: Send + Sync + 'static> ConfigProvider for StdConfigProvider<T> {
    fn get_config(&self) -> &(dyn Any + Send + Sync) {
        &self.value
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.validator {
            Some(validate) => validate(&self.value),
            None => Ok(()),
        }
    }
}
