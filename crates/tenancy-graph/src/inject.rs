//! Typed dependency slots

use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{ServiceName, ServiceValue, StartError};

/// Slot receiving a dependency's value.
///
/// A service keeps a clone of the slot and reads it from `start`; the graph
/// fills it right before `start` runs and clears it after `stop` returns.
pub struct Injected<T> {
    slot: Arc<RwLock<Option<T>>>,
}

impl<T> Clone for Injected<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Injected<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }
}

impl<T> std::fmt::Debug for Injected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("Injected")
            .field("type", &type_name::<T>())
            .field("filled", &filled)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Injected<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, if injected.
    pub fn get(&self) -> Option<T> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current value, or a start error naming the missing type.
    pub fn require(&self) -> Result<T, StartError> {
        self.get()
            .ok_or_else(|| StartError::new(format!("{} was not injected", type_name::<T>())))
    }

    fn set(&self, value: T) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Moves a dependency's value into a slot.
pub(crate) trait Injector: Send + Sync {
    fn inject(&self, value: &ServiceValue) -> Result<(), StartError>;
    fn uninject(&self);
}

struct Converting<S, T, F> {
    slot: Injected<T>,
    convert: F,
    _source: PhantomData<fn(S)>,
}

impl<S, T, F> Injector for Converting<S, T, F>
where
    S: Any + Clone + Send + Sync,
    T: Clone + Send + Sync + 'static,
    F: Fn(S) -> T + Send + Sync,
{
    fn inject(&self, value: &ServiceValue) -> Result<(), StartError> {
        let source = value.downcast_ref::<S>().ok_or_else(|| {
            StartError::new(format!(
                "dependency value is not a {}",
                type_name::<S>()
            ))
        })?;
        self.slot.set((self.convert)(source.clone()));
        Ok(())
    }

    fn uninject(&self) {
        self.slot.clear();
    }
}

/// A declared dependency of a node.
pub(crate) struct Dependency {
    pub(crate) name: ServiceName,
    pub(crate) injector: Option<Box<dyn Injector>>,
}

impl Dependency {
    pub(crate) fn ordering(name: ServiceName) -> Self {
        Self {
            name,
            injector: None,
        }
    }

    pub(crate) fn converting<S, T, F>(name: ServiceName, slot: &Injected<T>, convert: F) -> Self
    where
        S: Any + Clone + Send + Sync,
        T: Clone + Send + Sync + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            name,
            injector: Some(Box::new(Converting {
                slot: slot.clone(),
                convert,
                _source: PhantomData,
            })),
        }
    }
}
