//! Attribute records and handles.
//!
//! Every attribute record starts with an [`AttributeStorage`] header:
//! - the attribute's type, defaulting to the context's `NoneType` unless the
//!   record was built in the deferred form
//! - the dialect that registered the attribute class, stamped exactly once
//!   when the record is first published
//! - whether the attribute is, or transitively contains, a native callback
//!
//! The header is followed by the payload of the concrete class. Payloads are
//! immutable once published; the only post-publication write is resolving
//! the type of a deferred record, which may happen once.

pub mod uniquer;

pub use uniquer::{AttrKey, AttributeUniquer};

use irstore_core::{fx_hash, ClassId, Storage, StorageAllocator, StorageClass};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::record::{payload_of, Record};
use crate::{ContextId, Dialect, IrError, Result, Type};

/// How the type of an attribute record is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePolicy {
    /// Use the type set at construction, or `NoneType` when none was set.
    DefaultNone,
    /// Leave the type unset at publication; it is resolved once afterwards
    /// unless construction already set it.
    Deferred,
}

/// Header shared by every attribute record.
#[derive(Debug)]
pub struct AttributeStorage<'c> {
    ty: OnceLock<Type<'c>>,
    policy: TypePolicy,
    dialect: Option<&'c Dialect>,
    contains_callback: bool,
    class: Option<ClassId>,
    kind: u32,
}

impl Default for AttributeStorage<'_> {
    fn default() -> Self {
        Self::with_callback_flag(false)
    }
}

impl<'c> AttributeStorage<'c> {
    pub fn new(ty: Type<'c>, is_or_contains_callback: bool) -> Self {
        Self {
            ty: OnceLock::from(ty),
            ..Self::with_callback_flag(is_or_contains_callback)
        }
    }

    /// Header whose type defaults to `NoneType` at publication.
    pub fn with_callback_flag(is_or_contains_callback: bool) -> Self {
        Self {
            ty: OnceLock::new(),
            policy: TypePolicy::DefaultNone,
            dialect: None,
            contains_callback: is_or_contains_callback,
            class: None,
            kind: 0,
        }
    }

    /// Header whose type is computed after publication.
    pub fn deferred() -> Self {
        Self {
            policy: TypePolicy::Deferred,
            ..Self::with_callback_flag(false)
        }
    }

    pub fn is_or_contains_callback(&self) -> bool {
        self.contains_callback
    }

    pub fn policy(&self) -> TypePolicy {
        self.policy
    }

    /// Panics when queried on a deferred record whose type was never resolved.
    pub fn get_type(&self) -> Type<'c> {
        match self.ty.get() {
            Some(ty) => *ty,
            None => panic!("attribute storage type queried before it was initialized"),
        }
    }

    pub fn try_get_type(&self) -> Option<Type<'c>> {
        self.ty.get().copied()
    }

    pub fn dialect(&self) -> &'c Dialect {
        match self.dialect {
            Some(dialect) => dialect,
            None => panic!("malformed attribute storage object: dialect was never initialized"),
        }
    }

    pub fn class_id(&self) -> ClassId {
        match self.class {
            Some(class) => class,
            None => panic!("malformed attribute storage object: class was never initialized"),
        }
    }

    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Only reachable before publication, while the record is owned by value
    /// or mutably borrowed.
    pub fn set_type(&mut self, ty: Type<'c>) {
        self.ty = OnceLock::from(ty);
    }

    pub(crate) fn initialize_dialect(&mut self, dialect: &'c Dialect) {
        assert!(
            self.dialect.is_none(),
            "attribute storage dialect initialized twice"
        );
        self.dialect = Some(dialect);
    }

    pub(crate) fn initialize(&mut self, dialect: &'c Dialect, class: ClassId, kind: u32, none_type: Type<'c>) {
        self.initialize_dialect(dialect);
        self.class = Some(class);
        self.kind = kind;
        if self.policy == TypePolicy::DefaultNone && self.ty.get().is_none() {
            self.ty = OnceLock::from(none_type);
        }
    }

    fn resolve_type(&self, ty: Type<'c>) -> Result<()> {
        if self.policy != TypePolicy::Deferred {
            return Err(IrError::NotDeferred(self.class_id().to_string()));
        }
        self.ty
            .set(ty)
            .map_err(|_| IrError::TypeAlreadyResolved(self.class_id().to_string()))
    }
}

/// Payload of an attribute class.
///
/// `construct` returns the header as well, choosing its construction form:
/// an explicit type, a callback flag with the `NoneType` default, or the
/// deferred form.
///
/// # Safety
///
/// Records outlive the keys that built them. Implementors guarantee that
/// every reference stored in the payload is owned by the context: borrowed
/// key data is copied through the `StorageAllocator` in `construct`, and
/// every `Attribute` or `Type` handle taken from the key is checked against
/// the context in `verify_key`.
pub unsafe trait AttrStorage<'c>: Sized + Send + Sync {
    type Key<'k>: Hash
    where
        'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k;

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k;

    fn hash_key<'k>(key: &Self::Key<'k>) -> u64
    where
        'c: 'k,
    {
        fx_hash(key)
    }

    /// Reject keys that must never be published, e.g. handles owned by
    /// another context or out-of-range parameters.
    fn verify_key<'k>(_key: &Self::Key<'k>, _context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        Ok(())
    }
}

/// A `'static` marker naming an attribute class.
pub trait AttributeDef: 'static {
    type Storage<'c>: AttrStorage<'c>;
}

/// An attribute class with exactly one instance per context.
pub trait SingletonAttr: AttributeDef {
    fn build<'c>(allocator: &mut StorageAllocator<'c>) -> (AttributeStorage<'c>, Self::Storage<'c>);
}

/// Engine class of the attribute class `D`.
pub struct AttrClass<D>(PhantomData<fn() -> D>);

impl<D: AttributeDef> StorageClass for AttrClass<D> {
    type Storage<'a> = Record<AttributeStorage<'a>, D::Storage<'a>>;
}

// SAFETY: the payload upholds the same contract; the header only holds
// context-owned references stamped by the façade.
unsafe impl<'a, P: AttrStorage<'a>> Storage<'a> for Record<AttributeStorage<'a>, P> {
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
        let (header, payload) = P::construct(allocator, key);
        Record { header, payload }
    }

    fn hash_key<'k>(key: &Self::Key<'k>) -> u64
    where
        'a: 'k,
    {
        P::hash_key(key)
    }
}

/// Erased handle to a uniqued attribute. Compares and hashes by identity.
#[derive(Clone, Copy)]
pub struct Attribute<'c> {
    ptr: NonNull<AttributeStorage<'c>>,
    _marker: PhantomData<&'c AttributeStorage<'c>>,
}

// SAFETY: an `Attribute` is a shared reference to a `Sync` record.
unsafe impl Send for Attribute<'_> {}
unsafe impl Sync for Attribute<'_> {}

impl<'c> Attribute<'c> {
    pub(crate) fn from_record<P>(record: &'c Record<AttributeStorage<'c>, P>) -> Self {
        Self {
            ptr: record.header_ptr(),
            _marker: PhantomData,
        }
    }

    pub fn storage(&self) -> &'c AttributeStorage<'c> {
        // SAFETY: points at the header of a record owned by the context for `'c`.
        unsafe { self.ptr.as_ref() }
    }

    pub fn get_type(&self) -> Type<'c> {
        self.storage().get_type()
    }

    pub fn try_get_type(&self) -> Option<Type<'c>> {
        self.storage().try_get_type()
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

    pub fn is_or_contains_callback(&self) -> bool {
        self.storage().is_or_contains_callback()
    }

    /// Resolve the type of a deferred attribute. Succeeds at most once.
    pub fn resolve_type(&self, ty: Type<'c>) -> Result<()> {
        if ty.context_id() != self.context_id() {
            return Err(IrError::ForeignContext {
                expected: self.context_id(),
                found: ty.context_id(),
            });
        }
        self.storage().resolve_type(ty)
    }

    pub fn isa<D: AttributeDef>(&self) -> bool {
        self.class_id() == ClassId::of::<D>()
    }

    pub fn dyn_cast<D: AttributeDef>(self) -> Option<ConcreteAttr<'c, D>> {
        self.isa::<D>().then_some(ConcreteAttr {
            attr: self,
            _marker: PhantomData,
        })
    }

    /// Panics when the attribute is not of class `D`.
    pub fn cast<D: AttributeDef>(self) -> ConcreteAttr<'c, D> {
        match self.dyn_cast::<D>() {
            Some(attr) => attr,
            None => panic!(
                "invalid cast of attribute {} to {}",
                self.class_id(),
                ClassId::of::<D>()
            ),
        }
    }

    pub fn as_ptr(&self) -> *const () {
        self.ptr.as_ptr() as *const ()
    }
}

impl PartialEq for Attribute<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for Attribute<'_> {}

impl Hash for Attribute<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state)
    }
}

impl fmt::Debug for Attribute<'_> {
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

/// Handle to an attribute known to be of class `D`; derefs to its payload.
pub struct ConcreteAttr<'c, D> {
    attr: Attribute<'c>,
    _marker: PhantomData<fn() -> D>,
}

impl<'c, D: AttributeDef> ConcreteAttr<'c, D> {
    pub(crate) fn from_record(record: &'c Record<AttributeStorage<'c>, D::Storage<'c>>) -> Self {
        Self {
            attr: Attribute::from_record(record),
            _marker: PhantomData,
        }
    }

    pub fn as_attribute(&self) -> Attribute<'c> {
        self.attr
    }

    pub fn get_type(&self) -> Type<'c> {
        self.attr.get_type()
    }

    /// Payload with the full context lifetime.
    pub fn storage(&self) -> &'c D::Storage<'c> {
        // SAFETY: the class was checked when this handle was made.
        unsafe { payload_of::<AttributeStorage<'c>, D::Storage<'c>>(self.attr.ptr) }
    }
}

impl<'c, D: AttributeDef> Deref for ConcreteAttr<'c, D> {
    type Target = D::Storage<'c>;

    fn deref(&self) -> &Self::Target {
        self.storage()
    }
}

impl<D> Clone for ConcreteAttr<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for ConcreteAttr<'_, D> {}

impl<D> PartialEq for ConcreteAttr<'_, D> {
    fn eq(&self, other: &Self) -> bool {
        self.attr == other.attr
    }
}

impl<D> Eq for ConcreteAttr<'_, D> {}

impl<'c, D> PartialEq<Attribute<'c>> for ConcreteAttr<'c, D> {
    fn eq(&self, other: &Attribute<'c>) -> bool {
        self.attr == *other
    }
}

impl<D> Hash for ConcreteAttr<'_, D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attr.hash(state)
    }
}

impl<D> fmt::Debug for ConcreteAttr<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.attr, f)
    }
}

impl<'c, D> From<ConcreteAttr<'c, D>> for Attribute<'c> {
    fn from(attr: ConcreteAttr<'c, D>) -> Self {
        attr.attr
    }
}
