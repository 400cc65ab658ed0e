//! Type records and handles.
//!
//! A type record is `Record<TypeStorage, P>` where `P` is the payload of the
//! concrete type class. Types carry no type of their own, so the header only
//! holds the identity stamped at publication (dialect, class, kind).

pub mod uniquer;

pub use uniquer::{TypeKey, TypeUniquer};

use irstore_core::{fx_hash, ClassId, Storage, StorageAllocator, StorageClass};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::record::{payload_of, Record};
use crate::{ContextId, Dialect, Result};

/// Header shared by every type record.
#[derive(Debug, Default)]
pub struct TypeStorage<'c> {
    dialect: Option<&'c Dialect>,
    class: Option<ClassId>,
    kind: u32,
}

impl<'c> TypeStorage<'c> {
    pub fn dialect(&self) -> &'c Dialect {
        match self.dialect {
            Some(dialect) => dialect,
            None => panic!("malformed type storage object: dialect was never initialized"),
        }
    }

    pub fn class_id(&self) -> ClassId {
        match self.class {
            Some(class) => class,
            None => panic!("malformed type storage object: class was never initialized"),
        }
    }

    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub(crate) fn initialize(&mut self, dialect: &'c Dialect, class: ClassId, kind: u32) {
        assert!(
            self.dialect.is_none(),
            "type storage dialect initialized twice"
        );
        self.dialect = Some(dialect);
        self.class = Some(class);
        self.kind = kind;
    }
}

/// Payload of a type class.
///
/// # Safety
///
/// Same contract as [`AttrStorage`](crate::AttrStorage): borrowed key data
/// is copied through the `StorageAllocator`, and every handle taken from the
/// key is checked against the context in `verify_key`.
pub unsafe trait TypeStorageImpl<'c>: Sized + Send + Sync {
    type Key<'k>: Hash
    where
        'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k;

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> Self
    where
        'c: 'k;

    fn hash_key<'k>(key: &Self::Key<'k>) -> u64
    where
        'c: 'k,
    {
        fx_hash(key)
    }

    /// Reject keys that must never be published, e.g. handles owned by
    /// another context.
    fn verify_key<'k>(_key: &Self::Key<'k>, _context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        Ok(())
    }
}

/// A `'static` marker naming a type class.
pub trait TypeDef: 'static {
    type Storage<'c>: TypeStorageImpl<'c>;
}

/// A type class with exactly one instance per context.
pub trait SingletonType: TypeDef {
    fn build<'c>(allocator: &mut StorageAllocator<'c>) -> Self::Storage<'c>;
}

/// Engine class of the type class `D`.
pub struct TypeClass<D>(PhantomData<fn() -> D>);

impl<D: TypeDef> StorageClass for TypeClass<D> {
    type Storage<'a> = Record<TypeStorage<'a>, D::Storage<'a>>;
}

// SAFETY: the payload upholds the same contract; the header only holds
// context-owned references stamped by the façade.
unsafe impl<'a, P: TypeStorageImpl<'a>> Storage<'a> for Record<TypeStorage<'a>, P> {
    type Key<'k> = P::Key<'k> where 'a: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'a: 'k,
    {
        self.payload.matches(key)
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'a>, key: Self::Key<'k>) -> Self
    where
        'a: 'k,
    {
        Record {
            header: TypeStorage::default(),
            payload: P::construct(allocator, key),
        }
    }

    fn hash_key<'k>(key: &Self::Key<'k>) -> u64
    where
        'a: 'k,
    {
        P::hash_key(key)
    }
}

/// Erased handle to a uniqued type. Compares and hashes by identity.
#[derive(Clone, Copy)]
pub struct Type<'c> {
    ptr: NonNull<TypeStorage<'c>>,
    _marker: PhantomData<&'c TypeStorage<'c>>,
}

// SAFETY: a `Type` is a shared reference to an immutable, `Sync` record.
unsafe impl Send for Type<'_> {}
unsafe impl Sync for Type<'_> {}

impl<'c> Type<'c> {
    pub(crate) fn from_record<P>(record: &'c Record<TypeStorage<'c>, P>) -> Self {
        Self {
            ptr: record.header_ptr(),
            _marker: PhantomData,
        }
    }

    pub fn storage(&self) -> &'c TypeStorage<'c> {
        // SAFETY: points at the header of a record owned by the context for `'c`.
        unsafe { self.ptr.as_ref() }
    }

    pub fn dialect(&self) -> &'c Dialect {
        self.storage().dialect()
    }

    pub fn kind(&self) -> u32 {
        self.storage().kind()
    }

    pub fn class_id(&self) -> ClassId {
        self.storage().class_id()
    }

    pub fn context_id(&self) -> ContextId {
        self.dialect().context_id()
    }

    pub fn isa<D: TypeDef>(&self) -> bool {
        self.class_id() == ClassId::of::<D>()
    }

    pub fn dyn_cast<D: TypeDef>(self) -> Option<ConcreteType<'c, D>> {
        self.isa::<D>().then_some(ConcreteType {
            ty: self,
            _marker: PhantomData,
        })
    }

    /// Panics when the type is not of class `D`.
    pub fn cast<D: TypeDef>(self) -> ConcreteType<'c, D> {
        match self.dyn_cast::<D>() {
            Some(ty) => ty,
            None => panic!(
                "invalid cast of type {} to {}",
                self.class_id(),
                ClassId::of::<D>()
            ),
        }
    }

    pub fn as_ptr(&self) -> *const () {
        self.ptr.as_ptr() as *const ()
    }
}

impl PartialEq for Type<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for Type<'_> {}

impl Hash for Type<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state)
    }
}

impl fmt::Debug for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}#{}",
            self.dialect(),
            self.class_id(),
            self.kind()
        )
    }
}

/// Handle to a type known to be of class `D`; derefs to its payload.
pub struct ConcreteType<'c, D> {
    ty: Type<'c>,
    _marker: PhantomData<fn() -> D>,
}

impl<'c, D: TypeDef> ConcreteType<'c, D> {
    pub(crate) fn from_record(record: &'c Record<TypeStorage<'c>, D::Storage<'c>>) -> Self {
        Self {
            ty: Type::from_record(record),
            _marker: PhantomData,
        }
    }

    pub fn as_type(&self) -> Type<'c> {
        self.ty
    }

    /// Payload with the full context lifetime.
    pub fn storage(&self) -> &'c D::Storage<'c> {
        // SAFETY: the class was checked when this handle was made.
        unsafe { payload_of::<TypeStorage<'c>, D::Storage<'c>>(self.ty.ptr) }
    }
}

impl<'c, D: TypeDef> Deref for ConcreteType<'c, D> {
    type Target = D::Storage<'c>;

    fn deref(&self) -> &Self::Target {
        self.storage()
    }
}

impl<D> Clone for ConcreteType<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for ConcreteType<'_, D> {}

impl<D> PartialEq for ConcreteType<'_, D> {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

impl<D> Eq for ConcreteType<'_, D> {}

impl<'c, D> PartialEq<Type<'c>> for ConcreteType<'c, D> {
    fn eq(&self, other: &Type<'c>) -> bool {
        self.ty == *other
    }
}

impl<D> Hash for ConcreteType<'_, D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state)
    }
}

impl<D> fmt::Debug for ConcreteType<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.ty, f)
    }
}

impl<'c, D> From<ConcreteType<'c, D>> for Type<'c> {
    fn from(ty: ConcreteType<'c, D>) -> Self {
        ty.ty
    }
}
