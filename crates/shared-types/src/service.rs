//! # Service Descriptors
//!
//! A [`ServiceInstance`] wraps a concrete service together with the trait
//! objects it has been published as. Interface discovery is therefore a
//! table lookup keyed by `TypeId`, not a runtime type inspection.
//!
//! ```rust,ignore
//! trait Cache: Send + Sync { fn get(&self, key: &str) -> Option<String>; }
//!
//! let instance = ServiceInstance::builder(Arc::new(MemoryCache::default()))
//!     .implements::<dyn Cache>(|cache| cache)
//!     .build();
//!
//! assert!(instance.implements::<dyn Cache>());
//! let cache: Arc<dyn Cache> = instance.get::<dyn Cache>().unwrap();
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of an interface (trait object or concrete type) a dependency
/// expects a service to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceSpec {
    type_id: TypeId,
    type_name: &'static str,
}

impl InterfaceSpec {
    #[must_use]
    pub fn of<I: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<I>(),
            type_name: type_name::<I>(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// One typed view of a service: an `Arc<I>` stored behind `dyn Any`.
struct View {
    type_name: &'static str,
    handle: Box<dyn Any + Send + Sync>,
}

/// A service value plus the interfaces it can be retrieved as.
pub struct ServiceInstance {
    type_name: &'static str,
    views: HashMap<TypeId, View>,
    /// Interfaces in the order they were declared.
    declared: Vec<InterfaceSpec>,
}

impl ServiceInstance {
    /// Wrap a value that is only retrievable as its concrete type.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::builder(Arc::new(value)).build()
    }

    /// Start describing a service that may also be published as trait objects.
    pub fn builder<T: Send + Sync + 'static>(value: Arc<T>) -> ServiceInstanceBuilder<T> {
        let mut instance = Self {
            type_name: type_name::<T>(),
            views: HashMap::new(),
            declared: Vec::new(),
        };
        instance.insert_view::<T>(Arc::clone(&value));
        ServiceInstanceBuilder { value, instance }
    }

    fn insert_view<I: ?Sized + Send + Sync + 'static>(&mut self, view: Arc<I>) {
        let previous = self.views.insert(
            TypeId::of::<I>(),
            View {
                type_name: type_name::<I>(),
                handle: Box::new(view),
            },
        );
        if previous.is_none() {
            self.declared.push(InterfaceSpec::of::<I>());
        }
    }

    /// Concrete type name of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Retrieve the service as `I`, if it was published under that type.
    #[must_use]
    pub fn get<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.views
            .get(&TypeId::of::<I>())?
            .handle
            .downcast_ref::<Arc<I>>()
            .cloned()
    }

    #[must_use]
    pub fn implements<I: ?Sized + 'static>(&self) -> bool {
        self.views.contains_key(&TypeId::of::<I>())
    }

    #[must_use]
    pub fn satisfies(&self, interface: &InterfaceSpec) -> bool {
        self.views.contains_key(&interface.type_id())
    }

    /// Names of every type the service is retrievable as, concrete type first.
    #[must_use]
    pub fn interfaces(&self) -> Vec<&'static str> {
        self.declared.iter().map(InterfaceSpec::type_name).collect()
    }

    /// Every type the service is retrievable as, concrete type first.
    #[must_use]
    pub fn interface_specs(&self) -> &[InterfaceSpec] {
        &self.declared
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut views: Vec<&str> = self.views.values().map(|v| v.type_name).collect();
        views.sort_unstable();
        f.debug_struct("ServiceInstance")
            .field("type_name", &self.type_name)
            .field("views", &views)
            .finish()
    }
}

/// Builder returned by [`ServiceInstance::builder`].
pub struct ServiceInstanceBuilder<T> {
    value: Arc<T>,
    instance: ServiceInstance,
}

impl<T: Send + Sync + 'static> ServiceInstanceBuilder<T> {
    /// Publish the service as interface `I`.
    ///
    /// `cast` is normally the identity closure `|s| s`; the unsizing
    /// coercion from `Arc<T>` to `Arc<dyn Trait>` happens at its return.
    #[must_use]
    pub fn implements<I>(mut self, cast: impl FnOnce(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let view = cast(Arc::clone(&self.value));
        self.instance.insert_view::<I>(view);
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceInstance {
        self.instance
    }
}

/// A service a module needs (or can make use of) before it initializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDependency {
    /// Registry name to look up.
    pub name: String,
    /// Interface the resolved service must satisfy.
    pub required_interface: Option<InterfaceSpec>,
    /// Missing optional services are not an error.
    pub optional: bool,
    /// When the name is absent, accept the first service implementing
    /// `required_interface`.
    pub match_by_interface: bool,
}

impl ServiceDependency {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_interface: None,
            optional: false,
            match_by_interface: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(name)
        }
    }

    /// Require the resolved service to be retrievable as `I`.
    #[must_use]
    pub fn with_interface<I: ?Sized + 'static>(mut self) -> Self {
        self.required_interface = Some(InterfaceSpec::of::<I>());
        self
    }

    /// Fall back to interface matching when the name is not registered.
    #[must_use]
    pub fn by_interface(mut self) -> Self {
        self.match_by_interface = true;
        self
    }
}

/// A service a module publishes once its Init has succeeded.
#[derive(Debug)]
pub struct ServiceProvided {
    pub name: String,
    pub instance: ServiceInstance,
}

impl ServiceProvided {
    pub fn new(name: impl Into<String>, instance: ServiceInstance) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }
}
