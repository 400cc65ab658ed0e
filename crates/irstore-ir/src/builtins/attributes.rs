use irstore_core::StorageAllocator;
use std::cmp::Ordering;

use super::ensure_context;
use super::kinds::attributes as kind;
use super::types::{FloatType, IndexType, IntegerType, Signedness};
use crate::attributes::{AttrStorage, Attribute, AttributeDef, AttributeStorage, AttributeUniquer, ConcreteAttr, SingletonAttr};
use crate::{Context, ContextId, IrError, Result, Type};

/// Payload of attributes without parameters.
#[derive(Debug)]
pub struct UnitAttrStorage;

// SAFETY: no payload.
unsafe impl<'c> AttrStorage<'c> for UnitAttrStorage {
    type Key<'k> = () where 'c: 'k;

    fn matches<'k>(&self, _key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        true
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, _key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        (AttributeStorage::default(), UnitAttrStorage)
    }
}

/// Presence marker; a single instance per context.
pub struct UnitAttr;

impl AttributeDef for UnitAttr {
    type Storage<'c> = UnitAttrStorage;
}

impl SingletonAttr for UnitAttr {
    fn build<'c>(_allocator: &mut StorageAllocator<'c>) -> (AttributeStorage<'c>, UnitAttrStorage) {
        (AttributeStorage::default(), UnitAttrStorage)
    }
}

impl UnitAttr {
    pub fn get(ctx: &Context) -> Result<ConcreteAttr<'_, Self>> {
        AttributeUniquer::get_singleton::<Self>(ctx)
    }
}

#[derive(Debug)]
pub struct IntegerAttrStorage<'c> {
    ty: Type<'c>,
    value: i64,
}

impl<'c> IntegerAttrStorage<'c> {
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn as_bool(&self) -> bool {
        self.value != 0
    }

    pub fn ty(&self) -> Type<'c> {
        self.ty
    }
}

// SAFETY: the type handle is checked in `verify_key`.
unsafe impl<'c> AttrStorage<'c> for IntegerAttrStorage<'c> {
    type Key<'k> = (Type<'c>, i64) where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.ty == key.0 && self.value == key.1
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let (ty, value) = key;
        (AttributeStorage::new(ty, false), IntegerAttrStorage { ty, value })
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        let (ty, value) = *key;
        ensure_context(context, ty.context_id())?;
        if !ty.isa::<IntegerType>() && !ty.isa::<IndexType>() {
            return Err(IrError::InvalidType(format!(
                "integer attribute requires an integer or index type, got {:?}",
                ty
            )));
        }
        if canonical_integer(ty, value)? != value {
            return Err(IrError::InvalidKey(format!(
                "{value} is not the canonical form of a {ty:?} value"
            )));
        }
        Ok(())
    }
}

/// Canonical payload of `value` under `ty`.
///
/// Signed and unsigned types keep the value and require it to fit. Signless
/// types accept either reading and store the zero-extended bits, so `-1` and
/// `255` are the same `i8` constant. Widths of 64 and above take any `i64`.
fn canonical_integer(ty: Type<'_>, value: i64) -> Result<i64> {
    let Some(int) = ty.dyn_cast::<IntegerType>() else {
        return Ok(value);
    };
    let width = int.width();
    if width >= 64 {
        return Ok(value);
    }
    let modulus = 1i64 << width;
    let bound = modulus >> 1;
    let fits = match int.signedness() {
        Signedness::Signed => (-bound..bound).contains(&value),
        Signedness::Unsigned => (0..modulus).contains(&value),
        Signedness::Signless => (-bound..modulus).contains(&value),
    };
    if !fits {
        return Err(IrError::InvalidKey(format!(
            "{value} does not fit in {ty:?}"
        )));
    }
    Ok(match int.signedness() {
        Signedness::Signless => value & (modulus - 1),
        _ => value,
    })
}

/// Integer constant typed by an integer or index type.
pub struct IntegerAttr;

impl AttributeDef for IntegerAttr {
    type Storage<'c> = IntegerAttrStorage<'c>;
}

impl IntegerAttr {
    /// Fails with `InvalidKey` when `value` does not fit the width of `ty`.
    pub fn get<'c>(ctx: &'c Context, ty: Type<'c>, value: i64) -> Result<ConcreteAttr<'c, Self>> {
        let value = canonical_integer(ty, value)?;
        AttributeUniquer::get::<Self>(ctx, kind::INTEGER, (ty, value))
    }

    pub fn index(ctx: &Context, value: i64) -> Result<ConcreteAttr<'_, Self>> {
        let index = IndexType::get(ctx)?.as_type();
        Self::get(ctx, index, value)
    }

    /// `i1` constant.
    pub fn bool(ctx: &Context, value: bool) -> Result<ConcreteAttr<'_, Self>> {
        let i1 = IntegerType::signless(ctx, 1)?.as_type();
        Self::get(ctx, i1, i64::from(value))
    }
}

/// Keyed by the bit pattern of the value rounded to the type's format, so
/// `-0.0` and `0.0` are distinct attributes and every NaN payload is its own
/// attribute.
#[derive(Debug)]
pub struct FloatAttrStorage<'c> {
    ty: Type<'c>,
    bits: u64,
}

impl FloatAttrStorage<'_> {
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits)
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }
}

// SAFETY: the type handle is checked in `verify_key`.
unsafe impl<'c> AttrStorage<'c> for FloatAttrStorage<'c> {
    type Key<'k> = (Type<'c>, u64) where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.ty == key.0 && self.bits == key.1
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let (ty, bits) = key;
        (AttributeStorage::new(ty, false), FloatAttrStorage { ty, bits })
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        let (ty, bits) = *key;
        ensure_context(context, ty.context_id())?;
        let Some(float) = ty.dyn_cast::<FloatType>() else {
            return Err(IrError::InvalidType(format!(
                "float attribute requires a float type, got {:?}",
                ty
            )));
        };
        if float.float_kind().round(f64::from_bits(bits)).to_bits() != bits {
            return Err(IrError::InvalidKey(format!(
                "{} is not representable in {:?}",
                f64::from_bits(bits),
                ty
            )));
        }
        Ok(())
    }
}

pub struct FloatAttr;

impl AttributeDef for FloatAttr {
    type Storage<'c> = FloatAttrStorage<'c>;
}

impl FloatAttr {
    /// `value` is rounded to the format of `ty` first.
    pub fn get<'c>(ctx: &'c Context, ty: Type<'c>, value: f64) -> Result<ConcreteAttr<'c, Self>> {
        let value = match ty.dyn_cast::<FloatType>() {
            Some(float) => float.float_kind().round(value),
            None => value,
        };
        AttributeUniquer::get::<Self>(ctx, kind::FLOAT, (ty, value.to_bits()))
    }

    pub fn f64(ctx: &Context, value: f64) -> Result<ConcreteAttr<'_, Self>> {
        let ty = FloatType::f64(ctx)?.as_type();
        Self::get(ctx, ty, value)
    }
}

#[derive(Debug)]
pub struct StringAttrStorage<'c> {
    value: &'c str,
}

impl<'c> StringAttrStorage<'c> {
    pub fn as_str(&self) -> &'c str {
        self.value
    }
}

// SAFETY: the string is copied through the allocator.
unsafe impl<'c> AttrStorage<'c> for StringAttrStorage<'c> {
    type Key<'k> = &'k str where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.value == *key
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        (
            AttributeStorage::default(),
            StringAttrStorage {
                value: allocator.alloc_str(key),
            },
        )
    }
}

pub struct StringAttr;

impl AttributeDef for StringAttr {
    type Storage<'c> = StringAttrStorage<'c>;
}

impl StringAttr {
    pub fn get<'c>(ctx: &'c Context, value: &str) -> Result<ConcreteAttr<'c, Self>> {
        AttributeUniquer::get::<Self>(ctx, kind::STRING, value)
    }
}

#[derive(Debug)]
pub struct ArrayAttrStorage<'c> {
    elements: &'c [Attribute<'c>],
}

impl<'c> ArrayAttrStorage<'c> {
    pub fn elements(&self) -> &'c [Attribute<'c>] {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Attribute<'c>> {
        self.elements.get(index).copied()
    }
}

// SAFETY: elements are checked in `verify_key` and copied through the
// allocator.
unsafe impl<'c> AttrStorage<'c> for ArrayAttrStorage<'c> {
    type Key<'k> = &'k [Attribute<'c>] where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.elements == *key
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let contains_callback = key.iter().any(Attribute::is_or_contains_callback);
        (
            AttributeStorage::with_callback_flag(contains_callback),
            ArrayAttrStorage {
                elements: allocator.alloc_slice_copy(key),
            },
        )
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        key.iter()
            .try_for_each(|attr| ensure_context(context, attr.context_id()))
    }
}

pub struct ArrayAttr;

impl AttributeDef for ArrayAttr {
    type Storage<'c> = ArrayAttrStorage<'c>;
}

impl ArrayAttr {
    pub fn get<'c>(ctx: &'c Context, elements: &[Attribute<'c>]) -> Result<ConcreteAttr<'c, Self>> {
        AttributeUniquer::get::<Self>(ctx, kind::ARRAY, elements)
    }
}

/// A `(name, value)` dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedAttribute<'c> {
    pub name: ConcreteAttr<'c, StringAttr>,
    pub value: Attribute<'c>,
}

impl<'c> NamedAttribute<'c> {
    pub fn new(name: ConcreteAttr<'c, StringAttr>, value: Attribute<'c>) -> Self {
        Self { name, value }
    }

    pub fn name(&self) -> &'c str {
        self.name.storage().as_str()
    }
}

/// Entries sorted by name with unique names.
#[derive(Debug)]
pub struct DictionaryAttrStorage<'c> {
    entries: &'c [NamedAttribute<'c>],
}

impl<'c> DictionaryAttrStorage<'c> {
    pub fn entries(&self) -> &'c [NamedAttribute<'c>] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Attribute<'c>> {
        self.entries
            .binary_search_by(|entry| entry.name().cmp(name))
            .ok()
            .map(|index| self.entries[index].value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

// SAFETY: entries are checked in `verify_key` and copied through the
// allocator.
unsafe impl<'c> AttrStorage<'c> for DictionaryAttrStorage<'c> {
    type Key<'k> = &'k [NamedAttribute<'c>] where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.entries == *key
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let contains_callback = key
            .iter()
            .any(|entry| entry.value.is_or_contains_callback());
        (
            AttributeStorage::with_callback_flag(contains_callback),
            DictionaryAttrStorage {
                entries: allocator.alloc_slice_copy(key),
            },
        )
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        for entry in key.iter() {
            ensure_context(context, entry.name.as_attribute().context_id())?;
            ensure_context(context, entry.value.context_id())?;
        }
        for pair in key.windows(2) {
            match pair[0].name().cmp(pair[1].name()) {
                Ordering::Less => {}
                Ordering::Equal => return Err(IrError::DuplicateEntry(pair[0].name().to_string())),
                Ordering::Greater => {
                    return Err(IrError::InvalidKey(
                        "dictionary entries must be sorted by name".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

pub struct DictionaryAttr;

impl AttributeDef for DictionaryAttr {
    type Storage<'c> = DictionaryAttrStorage<'c>;
}

impl DictionaryAttr {
    /// Sorts `entries` by name; duplicate names are rejected.
    pub fn get<'c>(ctx: &'c Context, entries: &[NamedAttribute<'c>]) -> Result<ConcreteAttr<'c, Self>> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        AttributeUniquer::get::<Self>(ctx, kind::DICTIONARY, &sorted)
    }

    pub fn from_pairs<'c>(ctx: &'c Context, pairs: &[(&str, Attribute<'c>)]) -> Result<ConcreteAttr<'c, Self>> {
        let entries = pairs
            .iter()
            .map(|&(name, value)| Ok(NamedAttribute::new(StringAttr::get(ctx, name)?, value)))
            .collect::<Result<Vec<_>>>()?;
        Self::get(ctx, &entries)
    }
}

/// Wraps a type as an attribute; the attribute's type is the wrapped type.
#[derive(Debug)]
pub struct TypeAttrStorage<'c> {
    value: Type<'c>,
}

impl<'c> TypeAttrStorage<'c> {
    pub fn value(&self) -> Type<'c> {
        self.value
    }
}

// SAFETY: the type handle is checked in `verify_key`.
unsafe impl<'c> AttrStorage<'c> for TypeAttrStorage<'c> {
    type Key<'k> = Type<'c> where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.value == *key
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let mut header = AttributeStorage::deferred();
        header.set_type(key);
        (header, TypeAttrStorage { value: key })
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        ensure_context(context, key.context_id())
    }
}

pub struct TypeAttr;

impl AttributeDef for TypeAttr {
    type Storage<'c> = TypeAttrStorage<'c>;
}

impl TypeAttr {
    pub fn get<'c>(ctx: &'c Context, value: Type<'c>) -> Result<ConcreteAttr<'c, Self>> {
        AttributeUniquer::get::<Self>(ctx, kind::TYPE, value)
    }
}

/// Reference to a symbol whose type is only known once the symbol is
/// defined; resolve it with [`Attribute::resolve_type`].
#[derive(Debug)]
pub struct SymbolRefAttrStorage<'c> {
    symbol: &'c str,
}

impl<'c> SymbolRefAttrStorage<'c> {
    pub fn symbol(&self) -> &'c str {
        self.symbol
    }
}

// SAFETY: the symbol is copied through the allocator.
unsafe impl<'c> AttrStorage<'c> for SymbolRefAttrStorage<'c> {
    type Key<'k> = &'k str where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.symbol == *key
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        (
            AttributeStorage::deferred(),
            SymbolRefAttrStorage {
                symbol: allocator.alloc_str(key),
            },
        )
    }

    fn verify_key<'k>(key: &Self::Key<'k>, _context: ContextId) -> Result<()>
    where
        'c: 'k,
    {
        if key.is_empty() {
            return Err(IrError::InvalidKey("symbol reference must not be empty".to_string()));
        }
        Ok(())
    }
}

pub struct SymbolRefAttr;

impl AttributeDef for SymbolRefAttr {
    type Storage<'c> = SymbolRefAttrStorage<'c>;
}

impl SymbolRefAttr {
    pub fn get<'c>(ctx: &'c Context, symbol: &str) -> Result<ConcreteAttr<'c, Self>> {
        AttributeUniquer::get::<Self>(ctx, kind::SYMBOL_REF, symbol)
    }
}

pub type NativeCallback = fn(i64) -> i64;

/// A native function pointer; always flags itself as a callback.
pub struct CallbackAttrStorage {
    callback: NativeCallback,
}

impl CallbackAttrStorage {
    pub fn callback(&self) -> NativeCallback {
        self.callback
    }

    pub fn invoke(&self, arg: i64) -> i64 {
        (self.callback)(arg)
    }
}

impl std::fmt::Debug for CallbackAttrStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackAttrStorage({:#x})", self.callback as usize)
    }
}

// SAFETY: function pointers are `'static`.
unsafe impl<'c> AttrStorage<'c> for CallbackAttrStorage {
    type Key<'k> = NativeCallback where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.callback as usize == *key as usize
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        (
            AttributeStorage::with_callback_flag(true),
            CallbackAttrStorage { callback: key },
        )
    }
}

pub struct CallbackAttr;

impl AttributeDef for CallbackAttr {
    type Storage<'c> = CallbackAttrStorage;
}

impl CallbackAttr {
    pub fn get(ctx: &Context, callback: NativeCallback) -> Result<ConcreteAttr<'_, Self>> {
        AttributeUniquer::get::<Self>(ctx, kind::CALLBACK, callback)
    }
}
