use hashbrown::hash_map::{Entry, HashMap};
use rustc_hash::FxHasher;
use std::borrow::Borrow;
use std::hash::{BuildHasherDefault, Hash};

pub type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Fx-hashed map for the registry's small identity-keyed tables: class
/// tables, kind claims, dialect namespaces and per-class stats.
///
/// Tables are filled while the owner is mutably borrowed and only read
/// afterwards, so the wrapper exposes no removal.
#[derive(Debug, Clone)]
pub struct CompactHashMap<K, V>(HashMap<K, V, FxBuildHasher>);

impl<K: Eq + Hash, V> Default for CompactHashMap<K, V> {
    fn default() -> Self {
        Self(HashMap::with_hasher(FxBuildHasher::default()))
    }
}

impl<K: Eq + Hash, V> CompactHashMap<K, V> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.0.contains_key(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.0.insert(key, value)
    }

    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, FxBuildHasher> {
        self.0.entry(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }
}
