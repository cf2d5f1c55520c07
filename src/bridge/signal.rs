//! Plain, dependency-free reactive cell used as the target of `ToSignal`,
//! plus the `ItemSource` abstraction a signal's value can be pulled from —
//! an explicit enum rather than runtime reflection.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// A shared, observable value cell. `get` never blocks on a writer for long;
/// listeners are invoked after the value is already visible to `get`.
pub struct Signal<T: Clone + Send + Sync + 'static> {
    value: Arc<RwLock<T>>,
    listeners: Arc<Mutex<Vec<Arc<dyn Fn(&T) + Send + Sync>>>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("value", &self.get()).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().expect("poisoned").clone()
    }

    pub(crate) fn set(&self, value: T) {
        *self.value.write().expect("poisoned") = value.clone();
        for listener in self.listeners.lock().expect("poisoned").iter() {
            listener(&value);
        }
    }

    /// Register a callback invoked on every `set`. There is no unregister —
    /// callers that need that should dispose the owning `ToSignal` instead.
    pub fn on_change(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().expect("poisoned").push(Arc::new(f));
    }
}

/// Convenience alias for the common case of a boolean gate signal.
pub type BoolSignal = Signal<bool>;

/// Where a derived value comes from: a live signal this one tracks, or a
/// pull-based thunk evaluated on demand. Kept as an explicit enum rather
/// than dispatching on the runtime type of a boxed value.
pub(crate) enum ItemSource<T: Clone + Send + Sync + 'static> {
    Signal(Signal<T>),
    Thunk(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone + Send + Sync + 'static> ItemSource<T> {
    pub fn resolve(&self) -> T {
        match self {
            ItemSource::Signal(s) => s.get(),
            ItemSource::Thunk(f) => f(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reflects_latest_set() {
        let signal = Signal::new(0);
        signal.set(1);
        signal.set(2);
        assert_eq!(signal.get(), 2);
    }

    #[test]
    fn listeners_see_every_update() {
        let signal = Signal::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        signal.on_change(move |v| seen2.lock().unwrap().push(*v));
        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn item_source_thunk_is_pull_based() {
        let counter = Arc::new(Mutex::new(0));
        let c = counter.clone();
        let source: ItemSource<i32> = ItemSource::Thunk(Arc::new(move || {
            let mut n = c.lock().unwrap();
            *n += 1;
            *n
        }));
        assert_eq!(source.resolve(), 1);
        assert_eq!(source.resolve(), 2);
    }
}
