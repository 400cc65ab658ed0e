//! Uniqued attribute and type storage for an IR context.
//!
//! A [`Context`] owns two storage uniquers, one for attributes and one for
//! types, plus the dialects that register attribute and type classes. Values
//! are requested through the typed façades [`AttributeUniquer`] and
//! [`TypeUniquer`]; equal requests return the identical record, so handles
//! compare by identity.
//!
//! ```
//! use irstore_ir::{Context, IntegerAttr, IntegerType};
//!
//! let ctx = Context::new();
//! let i32_ty = IntegerType::signless(&ctx, 32)?.as_type();
//! let a = IntegerAttr::get(&ctx, i32_ty, 7)?;
//! let b = IntegerAttr::get(&ctx, i32_ty, 7)?;
//! assert_eq!(a, b);
//! assert_eq!(a.value(), 7);
//! # Ok::<(), irstore_ir::IrError>(())
//! ```

pub mod attributes;
pub mod builtins;
pub mod config;
pub mod context;
pub mod dialect;
pub mod error;
pub mod record;
pub mod types;

pub use attributes::{
    AttrClass, AttrKey, AttrStorage, Attribute, AttributeDef, AttributeStorage, AttributeUniquer,
    ConcreteAttr, SingletonAttr, TypePolicy,
};
pub use builtins::*;
pub use config::*;
pub use context::{Context, ContextId, ContextStats};
pub use dialect::{is_valid_namespace, Dialect, DialectId};
pub use error::*;
pub use record::Record;
pub use types::{
    ConcreteType, SingletonType, Type, TypeClass, TypeDef, TypeKey, TypeStorage, TypeStorageImpl,
    TypeUniquer,
};

pub use irstore_core::{
    ClassId, StorageAllocator, UniquerConfig, UniquerError, ENV_SHARD_COUNT, ENV_THREADING,
};
