use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::memory::StorageAllocator;

/// A storage type whose instances are uniqued by a `StorageUniquer`.
///
/// `'a` is the lifetime of the owning uniquer: everything reachable from an
/// instance either lives in the uniquer's arena or is `Copy` data.
///
/// Implementations provide:
/// - `Key<'k>`: the lookup form of the construction arguments. It may borrow
///   (`&'k str`, `&'k [T]`) since it is only copied into the arena on a miss.
/// - `matches`: structural equality between an instance and a key.
/// - `construct`: builds a new instance, copying any out-of-line data through
///   the allocator.
/// - `hash_key`: optional; defaults to Fx over the key's `Hash` impl. It must
///   agree with `matches`.
///
/// Drop impls of storage types run when the owning arena is torn down and
/// must not read other records.
///
/// # Safety
///
/// Instances are read again under later borrows of the uniquer, long after
/// the key that built them is gone. Implementors guarantee that every
/// reference held by an instance lives at least as long as the uniquer:
/// borrowed key data (`&'k str`, `&'k [T]`) is copied through the
/// `StorageAllocator` in `construct`, never stored as is, and any handle
/// into another owner is only stored once that owner is known to outlive
/// the uniquer.
pub unsafe trait Storage<'a>: Sized + Send + Sync {
    type Key<'k>: Hash
    where
        'a: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'a: 'k;

    fn construct<'k>(allocator: &mut StorageAllocator<'a>, key: Self::Key<'k>) -> Self
    where
        'a: 'k;

    fn hash_key<'k>(key: &Self::Key<'k>) -> u64
    where
        'a: 'k,
    {
        fx_hash(key)
    }
}

/// A `'static` marker naming a family of storage types, one per uniquer
/// lifetime. The marker's `TypeId` is the class identity used to partition
/// the uniquer.
pub trait StorageClass: 'static {
    type Storage<'a>: Storage<'a>;
}

/// The lookup key type of class `C` at uniquer lifetime `'a`.
pub type KeyOf<'a, 'k, C> = <<C as StorageClass>::Storage<'a> as Storage<'a>>::Key<'k>;

/// The storage type of class `C` at uniquer lifetime `'a`.
pub type StorageOf<'a, C> = <C as StorageClass>::Storage<'a>;

#[inline]
pub fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Combine a kind discriminator with a key hash.
#[inline]
pub fn hash_with_kind(kind: u32, key_hash: u64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u32(kind);
    hasher.write_u64(key_hash);
    hasher.finish()
}
