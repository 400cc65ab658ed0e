//! The `builtin` dialect, registered by every context.

pub mod attributes;
pub mod kinds;
pub mod types;

pub use attributes::*;
pub use types::*;

use crate::{Context, ContextId, DialectId, IrError, Result};

pub const BUILTIN_NAMESPACE: &str = "builtin";

pub(crate) fn register(ctx: &mut Context) -> Result<DialectId> {
    use kinds::attributes as attr;
    use kinds::types as ty;

    let builtin = ctx.load_dialect(BUILTIN_NAMESPACE)?;

    ctx.register_singleton_type::<NoneType>(builtin, ty::NONE)?;
    ctx.register_singleton_type::<IndexType>(builtin, ty::INDEX)?;
    ctx.register_type::<IntegerType>(builtin, &[ty::INTEGER])?;
    ctx.register_type::<FloatType>(builtin, &[ty::F16, ty::F32, ty::F64])?;
    ctx.register_type::<FunctionType>(builtin, &[ty::FUNCTION])?;

    ctx.register_singleton_attribute::<UnitAttr>(builtin, attr::UNIT)?;
    ctx.register_attribute::<IntegerAttr>(builtin, &[attr::INTEGER])?;
    ctx.register_attribute::<FloatAttr>(builtin, &[attr::FLOAT])?;
    ctx.register_attribute::<StringAttr>(builtin, &[attr::STRING])?;
    ctx.register_attribute::<ArrayAttr>(builtin, &[attr::ARRAY])?;
    ctx.register_attribute::<DictionaryAttr>(builtin, &[attr::DICTIONARY])?;
    ctx.register_attribute::<TypeAttr>(builtin, &[attr::TYPE])?;
    ctx.register_attribute::<SymbolRefAttr>(builtin, &[attr::SYMBOL_REF])?;
    ctx.register_attribute::<CallbackAttr>(builtin, &[attr::CALLBACK])?;

    Ok(builtin)
}

pub(crate) fn ensure_context(expected: ContextId, found: ContextId) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(IrError::ForeignContext { expected, found })
    }
}
