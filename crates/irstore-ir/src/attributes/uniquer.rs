use irstore_core::ClassId;
use tracing::debug;

use super::{AttrClass, AttrStorage, AttributeDef, ConcreteAttr, SingletonAttr};
use crate::record::Record;
use crate::{Context, Result};

/// Lookup key of the attribute class `D`.
pub type AttrKey<'c, 'k, D> = <<D as AttributeDef>::Storage<'c> as AttrStorage<'c>>::Key<'k>;

/// Typed entry point for getting and erasing uniqued attributes of a context.
///
/// New records are initialized before publication: the class, kind and
/// owning dialect are stamped into the header, and the type falls back to
/// the context's `NoneType` unless the record set one or defers it.
pub struct AttributeUniquer;

impl AttributeUniquer {
    pub fn get<'c, 'k, D>(ctx: &'c Context, kind: u32, key: AttrKey<'c, 'k, D>) -> Result<ConcreteAttr<'c, D>>
    where
        D: AttributeDef,
        'c: 'k,
    {
        let class = ClassId::of::<D>();
        let entry = ctx.attribute_classes().parametric(class, kind)?;
        let dialect = ctx.dialect(entry.dialect)?;
        <D::Storage<'c> as AttrStorage<'c>>::verify_key(&key, ctx.id())?;
        let none_type = ctx.none_type();

        let record = ctx
            .attribute_uniquer()
            .get::<AttrClass<D>, _>(kind, key, |record| {
                record.header.initialize(dialect, class, kind, none_type)
            });
        Ok(ConcreteAttr::from_record(record))
    }

    /// Remove the lookup entry of `(kind, key)`. Handles to the old record
    /// stay valid; later `get` calls build a fresh record.
    pub fn erase<'c, 'k, D>(ctx: &'c Context, kind: u32, key: AttrKey<'c, 'k, D>) -> Result<bool>
    where
        D: AttributeDef,
        'c: 'k,
    {
        let class = ClassId::of::<D>();
        ctx.attribute_classes().parametric(class, kind)?;
        let erased = ctx.attribute_uniquer().erase::<AttrClass<D>>(kind, key);
        if !erased {
            debug!("Erase of missing {} attribute (kind {}) ignored", class, kind);
        }
        Ok(erased)
    }

    pub fn get_singleton<D: SingletonAttr>(ctx: &Context) -> Result<ConcreteAttr<'_, D>> {
        let class = ClassId::of::<D>();
        let (dialect, kind) = ctx.attribute_classes().singleton(class)?;
        let dialect = ctx.dialect(dialect)?;
        let none_type = ctx.none_type();

        let record = ctx
            .attribute_uniquer()
            .get_singleton::<AttrClass<D>, _>(|allocator| {
                let (header, payload) = D::build(allocator);
                let mut record = Record { header, payload };
                record.header.initialize(dialect, class, kind, none_type);
                record
            });
        Ok(ConcreteAttr::from_record(record))
    }
}
