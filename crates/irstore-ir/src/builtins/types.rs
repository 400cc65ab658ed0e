use irstore_core::StorageAllocator;

use super::ensure_context;
use super::kinds::types as kind;
use crate::types::{ConcreteType, SingletonType, Type, TypeDef, TypeStorageImpl, TypeUniquer};
use crate::{Context, ContextId, IrError, Result};

/// Payload of types without parameters.
#[derive(Debug)]
pub struct EmptyTypeStorage;

// SAFETY: no payload.
unsafe impl<'c> TypeStorageImpl<'c> for EmptyTypeStorage {
    type Key<'k> = () where 'c: 'k;

    fn matches<'k>(&self, _key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        true
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, _key: Self::Key<'k>) -> Self
    where
        'c: 'k,
    {
        EmptyTypeStorage
    }
}

/// The type of values that carry no type, and the default attribute type.
pub struct NoneType;

impl TypeDef for NoneType {
    type Storage<'c> = EmptyTypeStorage;
}

impl SingletonType for NoneType {
    fn build<'c>(_allocator: &mut StorageAllocator<'c>) -> EmptyTypeStorage {
        EmptyTypeStorage
    }
}

impl NoneType {
    pub fn get(ctx: &Context) -> Result<ConcreteType<'_, Self>> {
        TypeUniquer::get_singleton::<Self>(ctx)
    }
}

/// Target-sized integer used for indices and sizes.
pub struct IndexType;

impl TypeDef for IndexType {
    type Storage<'c> = EmptyTypeStorage;
}

impl SingletonType for IndexType {
    fn build<'c>(_allocator: &mut StorageAllocator<'c>) -> EmptyTypeStorage {
        EmptyTypeStorage
    }
}

impl IndexType {
    pub fn get(ctx: &Context) -> Result<ConcreteType<'_, Self>> {
        TypeUniquer::get_singleton::<Self>(ctx)
    }
}

pub const MAX_INTEGER_WIDTH: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signless,
    Signed,
    Unsigned,
}

#[derive(Debug)]
pub struct IntegerTypeStorage {
    width: u32,
    signedness: Signedness,
}

impl IntegerTypeStorage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn signedness(&self) -> Signedness {
        self.signedness
    }

    pub fn is_signless(&self) -> bool {
        self.signedness == Signedness::Signless
    }
}

// SAFETY: plain values only.
unsafe impl<'c> TypeStorageImpl<'c> for IntegerTypeStorage {
    type Key<'k> = (u32, Signedness) where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        (self.width, self.signedness) == *key
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> Self
    where
        'c: 'k,
    {
        IntegerTypeStorage {
            width: key.0,
            signedness: key.1,
        }
    }

    fn verify_key<'k>(key: &Self::Key<'k>, _context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        if key.0 == 0 || key.0 > MAX_INTEGER_WIDTH {
            return Err(IrError::InvalidType(format!(
                "integer width {} out of range 1..={}",
                key.0, MAX_INTEGER_WIDTH
            )));
        }
        Ok(())
    }
}

pub struct IntegerType;

impl TypeDef for IntegerType {
    type Storage<'c> = IntegerTypeStorage;
}

impl IntegerType {
    pub fn get(ctx: &Context, width: u32, signedness: Signedness) -> Result<ConcreteType<'_, Self>> {
        TypeUniquer::get::<Self>(ctx, kind::INTEGER, (width, signedness))
    }

    pub fn signless(ctx: &Context, width: u32) -> Result<ConcreteType<'_, Self>> {
        Self::get(ctx, width, Signedness::Signless)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F16,
    F32,
    F64,
}

impl FloatKind {
    pub fn kind(self) -> u32 {
        match self {
            FloatKind::F16 => kind::F16,
            FloatKind::F32 => kind::F32,
            FloatKind::F64 => kind::F64,
        }
    }

    pub fn from_kind(kind: u32) -> Option<Self> {
        match kind {
            kind::F16 => Some(FloatKind::F16),
            kind::F32 => Some(FloatKind::F32),
            kind::F64 => Some(FloatKind::F64),
            _ => None,
        }
    }

    /// Round `value` to the nearest value representable in this format.
    pub fn round(self, value: f64) -> f64 {
        match self {
            FloatKind::F16 => half::f16::from_f64(value).to_f64(),
            FloatKind::F32 => f64::from(value as f32),
            FloatKind::F64 => value,
        }
    }

    pub fn width(self) -> u32 {
        match self {
            FloatKind::F16 => 16,
            FloatKind::F32 => 32,
            FloatKind::F64 => 64,
        }
    }
}

/// IEEE float types; one class whose kind selects the format.
pub struct FloatType;

impl TypeDef for FloatType {
    type Storage<'c> = EmptyTypeStorage;
}

impl FloatType {
    pub fn get(ctx: &Context, kind: FloatKind) -> Result<ConcreteType<'_, Self>> {
        TypeUniquer::get::<Self>(ctx, kind.kind(), ())
    }

    pub fn f16(ctx: &Context) -> Result<ConcreteType<'_, Self>> {
        Self::get(ctx, FloatKind::F16)
    }

    pub fn f32(ctx: &Context) -> Result<ConcreteType<'_, Self>> {
        Self::get(ctx, FloatKind::F32)
    }

    pub fn f64(ctx: &Context) -> Result<ConcreteType<'_, Self>> {
        Self::get(ctx, FloatKind::F64)
    }
}

impl ConcreteType<'_, FloatType> {
    pub fn float_kind(&self) -> FloatKind {
        let kind = self.as_type().kind();
        match FloatKind::from_kind(kind) {
            Some(float_kind) => float_kind,
            None => panic!("float type published with foreign kind {kind}"),
        }
    }

    pub fn width(&self) -> u32 {
        self.float_kind().width()
    }
}

#[derive(Debug)]
pub struct FunctionTypeStorage<'c> {
    inputs: &'c [Type<'c>],
    results: &'c [Type<'c>],
}

impl<'c> FunctionTypeStorage<'c> {
    pub fn inputs(&self) -> &'c [Type<'c>] {
        self.inputs
    }

    pub fn results(&self) -> &'c [Type<'c>] {
        self.results
    }
}

// SAFETY: signature types are checked in `verify_key` and copied through
// the allocator.
unsafe impl<'c> TypeStorageImpl<'c> for FunctionTypeStorage<'c> {
    type Key<'k> = (&'k [Type<'c>], &'k [Type<'c>]) where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.inputs == key.0 && self.results == key.1
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> Self
    where
        'c: 'k,
    {
        FunctionTypeStorage {
            inputs: allocator.alloc_slice_copy(key.0),
            results: allocator.alloc_slice_copy(key.1),
        }
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        key.0
            .iter()
            .chain(key.1)
            .try_for_each(|ty| ensure_context(context, ty.context_id()))
    }
}

pub struct FunctionType;

impl TypeDef for FunctionType {
    type Storage<'c> = FunctionTypeStorage<'c>;
}

impl FunctionType {
    pub fn get<'c>(ctx: &'c Context, inputs: &[Type<'c>], results: &[Type<'c>]) -> Result<ConcreteType<'c, Self>> {
        TypeUniquer::get::<Self>(ctx, kind::FUNCTION, (inputs, results))
    }
}
