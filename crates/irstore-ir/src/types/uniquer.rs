use irstore_core::ClassId;

use super::{ConcreteType, SingletonType, TypeClass, TypeDef, TypeStorage, TypeStorageImpl};
use crate::record::Record;
use crate::{Context, Result};

/// Lookup key of the type class `D`.
pub type TypeKey<'c, 'k, D> = <<D as TypeDef>::Storage<'c> as TypeStorageImpl<'c>>::Key<'k>;

/// Typed entry point for getting and erasing uniqued types of a context.
pub struct TypeUniquer;

impl TypeUniquer {
    /// Get the unique type of class `D` for `(kind, key)`, creating it on
    /// first use.
    pub fn get<'c, 'k, D>(ctx: &'c Context, kind: u32, key: TypeKey<'c, 'k, D>) -> Result<ConcreteType<'c, D>>
    where
        D: TypeDef,
        'c: 'k,
    {
        let class = ClassId::of::<D>();
        let entry = ctx.type_classes().parametric(class, kind)?;
        let dialect = ctx.dialect(entry.dialect)?;
        <D::Storage<'c> as TypeStorageImpl<'c>>::verify_key(&key, ctx.id())?;

        let record = ctx
            .type_uniquer()
            .get::<TypeClass<D>, _>(kind, key, |record| {
                record.header.initialize(dialect, class, kind)
            });
        Ok(ConcreteType::from_record(record))
    }

    /// Remove the lookup entry of `(kind, key)`. Returns `Ok(false)` when no
    /// such type was published.
    pub fn erase<'c, 'k, D>(ctx: &'c Context, kind: u32, key: TypeKey<'c, 'k, D>) -> Result<bool>
    where
        D: TypeDef,
        'c: 'k,
    {
        ctx.type_classes().parametric(ClassId::of::<D>(), kind)?;
        Ok(ctx.type_uniquer().erase::<TypeClass<D>>(kind, key))
    }

    pub fn get_singleton<D: SingletonType>(ctx: &Context) -> Result<ConcreteType<'_, D>> {
        let class = ClassId::of::<D>();
        let (dialect, kind) = ctx.type_classes().singleton(class)?;
        let dialect = ctx.dialect(dialect)?;

        let record = ctx.type_uniquer().get_singleton::<TypeClass<D>, _>(|allocator| {
            let mut record: Record<TypeStorage<'_>, D::Storage<'_>> = Record {
                header: TypeStorage::default(),
                payload: D::build(allocator),
            };
            record.header.initialize(dialect, class, kind);
            record
        });
        Ok(ConcreteType::from_record(record))
    }
}
