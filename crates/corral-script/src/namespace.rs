//! Host-provided names visible to a script.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use rhai::{Dynamic, Scope};

/// A host type that scripts can hold and call methods on.
///
/// The engine calls [`HostObject::register`] once per run for every type
/// present in the namespace, on a runtime that is discarded when the run
/// ends.
pub trait HostObject: Clone + 'static {
    /// Registers the type and its methods on `engine`.
    fn register(engine: &mut rhai::Engine);
}

type Installer = Rc<dyn Fn(&mut rhai::Engine)>;

/// Values and host functions bound into a script's global scope.
///
/// Every value is bound as a constant, so a script cannot rebind a host
/// name.
#[derive(Clone, Default)]
pub struct Namespace {
    values: BTreeMap<String, Dynamic>,
    types: BTreeMap<TypeId, fn(&mut rhai::Engine)>,
    functions: Vec<Installer>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .field("host_types", &self.types.len())
            .field("host_functions", &self.functions.len())
            .finish()
    }
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a plain value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Dynamic>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Binds a host object and arranges for its methods to be registered.
    pub fn insert_object<T: HostObject>(&mut self, name: impl Into<String>, object: T) -> &mut Self {
        self.types.insert(TypeId::of::<T>(), T::register);
        self.values.insert(name.into(), Dynamic::from(object));
        self
    }

    /// Adds host functions. `install` runs against each run's runtime and
    /// should gate every function it registers with
    /// [`admit`](crate::admit).
    pub fn register_functions<F>(&mut self, install: F) -> &mut Self
    where
        F: Fn(&mut rhai::Engine) + 'static,
    {
        self.functions.push(Rc::new(install));
        self
    }

    /// Number of bound names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no names are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` when `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub(crate) fn install(&self, engine: &mut rhai::Engine) {
        for register in self.types.values() {
            register(engine);
        }
        for install in &self.functions {
            install(engine);
        }
    }

    pub(crate) fn scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in &self.values {
            scope.push_constant_dynamic(name.clone(), value.clone());
        }
        scope
    }
}
