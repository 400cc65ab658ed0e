use hashbrown::HashTable;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::ptr::NonNull;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::config::UniquerConfig;
use crate::memory::{ClassStats, CompactHashMap, StatsSnapshot, StorageAllocator, StorageArena, StorageStats};
use crate::storage::{hash_with_kind, KeyOf, Storage, StorageClass, StorageOf};
use crate::{ClassId, Result, UniquerError};

/// A published record together with its full hash and kind.
#[derive(Clone, Copy)]
struct HashedStorage {
    hash: u64,
    kind: u32,
    storage: NonNull<u8>,
}

// SAFETY: the pointer targets an arena record of a `Send + Sync` storage type.
unsafe impl Send for HashedStorage {}
unsafe impl Sync for HashedStorage {}

impl HashedStorage {
    /// # Safety
    ///
    /// `S` must be the storage type this entry was published as, and `'a`
    /// must not outlive the uniquer owning the record.
    unsafe fn get<'a, S>(&self) -> &'a S {
        unsafe { self.storage.cast::<S>().as_ref() }
    }
}

#[derive(Clone, Copy)]
struct ErasedPtr(NonNull<u8>);

// SAFETY: same as `HashedStorage`.
unsafe impl Send for ErasedPtr {}
unsafe impl Sync for ErasedPtr {}

/// One bucket of a parametric class: lookup table plus the arena that owns
/// the records published into it.
struct Shard {
    instances: RwLock<HashTable<HashedStorage>>,
    arena: Mutex<StorageArena>,
}

/// Uniquer for all instances of one parametric storage class.
struct ParametricStorageUniquer {
    shards: Box<[Shard]>,
}

impl ParametricStorageUniquer {
    fn new(config: &UniquerConfig) -> Self {
        let shards = (0..config.effective_shard_count())
            .map(|_| Shard {
                instances: RwLock::new(HashTable::with_capacity(config.initial_capacity)),
                arena: Mutex::new(StorageArena::with_capacity(config.arena_chunk_bytes)),
            })
            .collect();
        Self { shards }
    }

    #[inline]
    fn shard(&self, hash: u64) -> &Shard {
        // High bits pick the shard; the table inside uses the low bits.
        &self.shards[((hash >> 40) as usize) % self.shards.len()]
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.instances.read().len()).sum()
    }

    fn arena_bytes(&self) -> usize {
        self.shards.iter().map(|s| s.arena.lock().allocated_bytes()).sum()
    }
}

/// Gets or creates unique instances of registered storage classes.
///
/// Parametric classes are uniqued by `(kind, key)`; singleton classes have
/// exactly one lazily built instance. Every record lives in an arena owned
/// by the uniquer and is returned as `&'a S` for the uniquer borrow `'a`.
/// Erasing a key only removes the lookup entry; the record stays valid until
/// the uniquer is dropped.
pub struct StorageUniquer {
    config: UniquerConfig,
    parametric: CompactHashMap<ClassId, ParametricStorageUniquer>,
    singletons: CompactHashMap<ClassId, OnceLock<ErasedPtr>>,
    singleton_arena: Mutex<StorageArena>,
    stats: StorageStats,
}

impl Default for StorageUniquer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageUniquer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageUniquer")
            .field("config", &self.config)
            .field("parametric_classes", &self.parametric.len())
            .field("singleton_classes", &self.singletons.len())
            .finish()
    }
}

impl StorageUniquer {
    pub fn new() -> Self {
        Self::with_config(UniquerConfig::default())
    }

    pub fn with_config(config: UniquerConfig) -> Self {
        Self {
            stats: StorageStats::new(config.track_stats),
            singleton_arena: Mutex::new(StorageArena::with_capacity(config.arena_chunk_bytes)),
            parametric: CompactHashMap::default(),
            singletons: CompactHashMap::default(),
            config,
        }
    }

    pub fn config(&self) -> &UniquerConfig {
        &self.config
    }

    pub fn register_parametric<C: StorageClass>(&mut self) -> Result<()> {
        let class = ClassId::of::<C>();
        self.ensure_unregistered(class)?;
        self.parametric
            .insert(class, ParametricStorageUniquer::new(&self.config));
        debug!(class = %class, shards = self.config.effective_shard_count(), "registered parametric storage class");
        Ok(())
    }

    pub fn register_singleton<C: StorageClass>(&mut self) -> Result<()> {
        let class = ClassId::of::<C>();
        self.ensure_unregistered(class)?;
        self.singletons.insert(class, OnceLock::new());
        debug!(class = %class, "registered singleton storage class");
        Ok(())
    }

    fn ensure_unregistered(&self, class: ClassId) -> Result<()> {
        if self.parametric.contains_key(&class) || self.singletons.contains_key(&class) {
            return Err(UniquerError::AlreadyRegistered(class));
        }
        Ok(())
    }

    pub fn is_registered<C: StorageClass>(&self) -> bool {
        let class = ClassId::of::<C>();
        self.parametric.contains_key(&class) || self.singletons.contains_key(&class)
    }

    /// Check that `C` may be used with `get`/`erase`.
    pub fn check_parametric<C: StorageClass>(&self) -> Result<()> {
        let class = ClassId::of::<C>();
        if self.parametric.contains_key(&class) {
            Ok(())
        } else if self.singletons.contains_key(&class) {
            Err(UniquerError::SingletonClass(class))
        } else {
            Err(UniquerError::NotRegistered(class))
        }
    }

    /// Check that `C` may be used with `get_singleton`.
    pub fn check_singleton<C: StorageClass>(&self) -> Result<()> {
        let class = ClassId::of::<C>();
        if self.singletons.contains_key(&class) {
            Ok(())
        } else if self.parametric.contains_key(&class) {
            Err(UniquerError::ParametricClass(class))
        } else {
            Err(UniquerError::NotRegistered(class))
        }
    }

    fn parametric_for(&self, class: ClassId) -> &ParametricStorageUniquer {
        match self.parametric.get(&class) {
            Some(uniquer) => uniquer,
            None => panic!("storage class {class} used before being registered as parametric"),
        }
    }

    fn entry_matches<'a, 'k, C>(entry: &HashedStorage, hash: u64, kind: u32, key: &KeyOf<'a, 'k, C>) -> bool
    where
        C: StorageClass,
        'a: 'k,
    {
        // SAFETY: every entry in a class's table was published as `StorageOf<C>`.
        entry.hash == hash
            && entry.kind == kind
            && unsafe { entry.get::<StorageOf<'a, C>>() }.matches(key)
    }

    /// Get the unique instance of `C` for `(kind, key)`, constructing it on
    /// first use.
    ///
    /// On a miss the instance is built by `Storage::construct`, handed to
    /// `init` for one-time initialization, and only then moved into the arena
    /// and published. A panic in either step publishes nothing.
    ///
    /// Panics if `C` is not registered as a parametric class.
    pub fn get<'a, 'k, C, F>(&'a self, kind: u32, key: KeyOf<'a, 'k, C>, init: F) -> &'a StorageOf<'a, C>
    where
        C: StorageClass,
        F: FnOnce(&mut StorageOf<'a, C>),
        'a: 'k,
    {
        let class = ClassId::of::<C>();
        let uniquer = self.parametric_for(class);
        let hash = hash_with_kind(kind, <StorageOf<'a, C> as Storage<'a>>::hash_key(&key));
        let shard = uniquer.shard(hash);

        if self.config.threading {
            let instances = shard.instances.read();
            if let Some(existing) =
                instances.find(hash, |e| Self::entry_matches::<C>(e, hash, kind, &key))
            {
                // SAFETY: published as `StorageOf<C>`; the arena outlives `'a`.
                return unsafe { existing.get() };
            }
        }

        let mut instances = shard.instances.write();
        if let Some(existing) = instances.find(hash, |e| Self::entry_matches::<C>(e, hash, kind, &key)) {
            // SAFETY: as above.
            return unsafe { existing.get() };
        }

        let mut arena = shard.arena.lock();
        // SAFETY: the arena lives inside `self` for at least `'a` and is never
        // reset; the allocator does not outlive this lock guard.
        let (mut allocator, mut placer) = unsafe { arena.split() };
        let mut storage = <StorageOf<'a, C> as Storage<'a>>::construct(&mut allocator, key);
        init(&mut storage);
        let ptr = placer.place(&mut allocator, storage);

        instances.insert_unique(
            hash,
            HashedStorage {
                hash,
                kind,
                storage: ptr.cast(),
            },
            |e| e.hash,
        );
        self.stats.record_created(class, allocator.bytes_requested());
        trace!(class = %class, kind, "published storage instance");

        // SAFETY: freshly placed in the arena, which outlives `'a`.
        unsafe { ptr.as_ref() }
    }

    /// Look up an existing instance without creating one.
    pub fn lookup<'a, 'k, C>(&'a self, kind: u32, key: KeyOf<'a, 'k, C>) -> Option<&'a StorageOf<'a, C>>
    where
        C: StorageClass,
        'a: 'k,
    {
        let class = ClassId::of::<C>();
        let uniquer = self.parametric_for(class);
        let hash = hash_with_kind(kind, <StorageOf<'a, C> as Storage<'a>>::hash_key(&key));
        let instances = uniquer.shard(hash).instances.read();
        instances
            .find(hash, |e| Self::entry_matches::<C>(e, hash, kind, &key))
            // SAFETY: published as `StorageOf<C>`; the arena outlives `'a`.
            .map(|e| unsafe { e.get() })
    }

    pub fn contains<'a, 'k, C>(&'a self, kind: u32, key: KeyOf<'a, 'k, C>) -> bool
    where
        C: StorageClass,
        'a: 'k,
    {
        self.lookup::<C>(kind, key).is_some()
    }

    /// Remove the lookup entry for `(kind, key)`. Returns whether an entry
    /// existed. The record itself stays allocated until the uniquer drops.
    ///
    /// Panics if `C` is not registered as a parametric class.
    pub fn erase<'a, 'k, C>(&'a self, kind: u32, key: KeyOf<'a, 'k, C>) -> bool
    where
        C: StorageClass,
        'a: 'k,
    {
        let class = ClassId::of::<C>();
        let uniquer = self.parametric_for(class);
        let hash = hash_with_kind(kind, <StorageOf<'a, C> as Storage<'a>>::hash_key(&key));
        let mut instances = uniquer.shard(hash).instances.write();
        match instances.find_entry(hash, |e| Self::entry_matches::<C>(e, hash, kind, &key)) {
            Ok(entry) => {
                entry.remove();
                self.stats.record_erased(class);
                debug!(class = %class, kind, "erased storage instance");
                true
            }
            Err(_) => false,
        }
    }

    /// Get the single instance of singleton class `C`, building it with
    /// `build` on first use. `build` runs under the singleton arena lock and
    /// must not request other singletons from this uniquer.
    ///
    /// Panics if `C` is not registered as a singleton class.
    pub fn get_singleton<'a, C, F>(&'a self, build: F) -> &'a StorageOf<'a, C>
    where
        C: StorageClass,
        F: FnOnce(&mut StorageAllocator<'a>) -> StorageOf<'a, C>,
    {
        let class = ClassId::of::<C>();
        let slot = match self.singletons.get(&class) {
            Some(slot) => slot,
            None => panic!("storage class {class} used before being registered as a singleton"),
        };
        let erased = slot.get_or_init(|| {
            let mut arena = self.singleton_arena.lock();
            // SAFETY: see `get`.
            let (mut allocator, mut placer) = unsafe { arena.split() };
            let storage = build(&mut allocator);
            let ptr = placer.place(&mut allocator, storage);
            self.stats.record_created(class, allocator.bytes_requested());
            trace!(class = %class, "published singleton instance");
            ErasedPtr(ptr.cast())
        });
        // SAFETY: the slot of `C` only ever holds a `StorageOf<C>`.
        unsafe { erased.0.cast::<StorageOf<'a, C>>().as_ref() }
    }

    /// Number of instances of `C` currently reachable through lookup.
    pub fn len<C: StorageClass>(&self) -> usize {
        let class = ClassId::of::<C>();
        if let Some(uniquer) = self.parametric.get(&class) {
            uniquer.len()
        } else if let Some(slot) = self.singletons.get(&class) {
            usize::from(slot.get().is_some())
        } else {
            0
        }
    }

    pub fn registered_classes(&self) -> Vec<ClassId> {
        self.parametric
            .iter()
            .map(|(class, _)| *class)
            .chain(self.singletons.iter().map(|(class, _)| *class))
            .collect()
    }

    /// Bytes of arena memory reserved across all classes.
    pub fn arena_bytes(&self) -> usize {
        self.parametric.values().map(|u| u.arena_bytes()).sum::<usize>()
            + self.singleton_arena.lock().allocated_bytes()
    }

    pub fn class_stats<C: StorageClass>(&self) -> ClassStats {
        self.stats.get(ClassId::of::<C>())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
