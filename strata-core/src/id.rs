//! # IDs
//! Nodes, subscriptions and snapshots all need identities that outlive arena indices.
//! [`UniqueID<T>`] hands out process-unique ids, namespaced by the marker type `T`.
//!
//! Use `UniqueID::<Marker>::default()` for a single id, or [`UniqueID::many`] to reserve a batch.

use std::sync::atomic::{AtomicU64, Ordering};

// One counter per namespace. Counters are created lazily on first use of a namespace.
static COUNTERS: parking_lot::RwLock<
    std::collections::BTreeMap<std::any::TypeId, &'static AtomicU64>,
> = parking_lot::const_rwlock(std::collections::BTreeMap::new());

fn counter_for<T: std::any::Any>() -> &'static AtomicU64 {
    let ty = std::any::TypeId::of::<T>();
    if let Some(counter) = COUNTERS.read().get(&ty) {
        return *counter;
    }
    // Leaked once per namespace, namespaces are a small closed set of marker types.
    *COUNTERS
        .write()
        .entry(ty)
        .or_insert_with(|| Box::leak(Box::new(AtomicU64::new(1))))
}

/// ID unique within this run of the program, for namespace `T`.
/// IDs of different namespaces may share a numeric value.
pub struct UniqueID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    _namespace: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> UniqueID<T> {
    /// The raw numeric value. Not stable between runs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
    /// Reserve `count` ids at once. Ids are reserved eagerly, dropping the iterator
    /// early does not return them.
    ///
    /// # Panics
    /// If the namespace is exhausted. At one id per nanosecond this takes five centuries.
    pub fn many(count: usize) -> impl ExactSizeIterator<Item = Self> {
        let count_u64 = count as u64;
        let start = counter_for::<T>().fetch_add(count_u64, Ordering::Relaxed);
        assert!(
            start.checked_add(count_u64).is_some(),
            "{} id space exhausted",
            std::any::type_name::<T>()
        );
        (0..count).map(move |offset| Self {
            // Counters start at one, so `start + offset` is never zero.
            id: std::num::NonZeroU64::new(start + offset as u64)
                .unwrap_or(std::num::NonZeroU64::MIN),
            _namespace: std::marker::PhantomData,
        })
    }
}
impl<T: std::any::Any> Default for UniqueID<T> {
    fn default() -> Self {
        let id = counter_for::<T>().fetch_add(1, Ordering::Relaxed);
        Self {
            // Counters start at one and only grow.
            id: std::num::NonZeroU64::new(id).unwrap_or(std::num::NonZeroU64::MIN),
            _namespace: std::marker::PhantomData,
        }
    }
}
impl<T: std::any::Any> Clone for UniqueID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for UniqueID<T> {}
impl<T: std::any::Any> PartialEq for UniqueID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for UniqueID<T> {}
impl<T: std::any::Any> PartialOrd for UniqueID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> Ord for UniqueID<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T: std::any::Any> std::hash::Hash for UniqueID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T: std::any::Any> std::fmt::Display for UniqueID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.id)
    }
}
impl<T: std::any::Any> std::fmt::Debug for UniqueID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
