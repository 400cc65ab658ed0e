use irstore_core::{ClassId, CompactHashMap, StatsSnapshot, StorageUniquer, UniquerError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::attributes::{AttrClass, AttributeDef, SingletonAttr};
use crate::builtins::{self, NoneType};
use crate::dialect::DialectRegistry;
use crate::types::{SingletonType, Type, TypeClass, TypeDef, TypeUniquer};
use crate::{ContextConfig, Dialect, DialectId, IrError, Result};

/// Process-unique identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassCategory {
    Attribute,
    Type,
}

#[derive(Debug)]
pub(crate) struct ClassEntry {
    pub(crate) dialect: DialectId,
    kinds: Vec<u32>,
    singleton: bool,
}

/// Registered classes of one category and the `(dialect, kind)` pairs they
/// claim.
#[derive(Debug)]
pub(crate) struct ClassTable {
    category: ClassCategory,
    classes: CompactHashMap<ClassId, ClassEntry>,
    kinds: CompactHashMap<(DialectId, u32), ClassId>,
}

impl ClassTable {
    fn new(category: ClassCategory) -> Self {
        Self {
            category,
            classes: CompactHashMap::default(),
            kinds: CompactHashMap::default(),
        }
    }

    fn unregistered(&self, class: ClassId) -> IrError {
        match self.category {
            ClassCategory::Attribute => IrError::UnregisteredAttribute(class.to_string()),
            ClassCategory::Type => IrError::UnregisteredType(class.to_string()),
        }
    }

    /// Check that `class` may claim `kinds` of `dialect`; returns the kinds
    /// sorted and deduplicated.
    fn check_claim(&self, class: ClassId, dialect: &Dialect, kinds: &[u32]) -> Result<Vec<u32>> {
        if kinds.is_empty() {
            return Err(IrError::EmptyKindSet(class.to_string()));
        }
        if self.classes.contains_key(&class) {
            return Err(UniquerError::AlreadyRegistered(class).into());
        }

        let mut kinds = kinds.to_vec();
        kinds.sort_unstable();
        kinds.dedup();
        for &kind in &kinds {
            if let Some(existing) = self.kinds.get(&(dialect.id(), kind)) {
                return Err(IrError::KindConflict {
                    dialect: dialect.namespace().to_string(),
                    kind,
                    existing: existing.to_string(),
                });
            }
        }
        Ok(kinds)
    }

    fn insert(&mut self, class: ClassId, dialect: DialectId, kinds: Vec<u32>, singleton: bool) {
        for &kind in &kinds {
            self.kinds.insert((dialect, kind), class);
        }
        self.classes.insert(
            class,
            ClassEntry {
                dialect,
                kinds,
                singleton,
            },
        );
    }

    fn entry(&self, class: ClassId) -> Result<&ClassEntry> {
        self.classes
            .get(&class)
            .ok_or_else(|| self.unregistered(class))
    }

    /// Entry of a parametric class, provided it claimed `kind`.
    pub(crate) fn parametric(&self, class: ClassId, kind: u32) -> Result<&ClassEntry> {
        let entry = self.entry(class)?;
        if entry.singleton {
            return Err(UniquerError::SingletonClass(class).into());
        }
        if entry.kinds.binary_search(&kind).is_err() {
            return Err(IrError::KindMismatch {
                class: class.to_string(),
                kind,
            });
        }
        Ok(entry)
    }

    /// Dialect and kind of a singleton class.
    pub(crate) fn singleton(&self, class: ClassId) -> Result<(DialectId, u32)> {
        let entry = self.entry(class)?;
        if !entry.singleton {
            return Err(UniquerError::ParametricClass(class).into());
        }
        Ok((entry.dialect, entry.kinds[0]))
    }

    fn contains(&self, class: ClassId) -> bool {
        self.classes.contains_key(&class)
    }

    fn len(&self) -> usize {
        self.classes.len()
    }
}

/// Allocation statistics of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub context: ContextId,
    pub dialects: usize,
    pub attributes: StatsSnapshot,
    pub types: StatsSnapshot,
    pub arena_bytes: usize,
}

impl ContextStats {
    pub fn to_json(&self) -> anyhow::Result<String> {
        use anyhow::Context as _;
        serde_json::to_string_pretty(self).context("Failed to serialize context statistics")
    }
}

/// Owner of every uniqued attribute and type, the dialects they belong to,
/// and the class registrations that map `(class, kind)` to a dialect.
///
/// Records live until the context is dropped. Registration needs `&mut self`,
/// so no handle can observe a class table while it changes.
pub struct Context {
    id: ContextId,
    config: ContextConfig,
    dialects: DialectRegistry,
    attribute_classes: ClassTable,
    type_classes: ClassTable,
    attributes: StorageUniquer,
    types: StorageUniquer,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("dialects", &self.dialects.len())
            .field("attribute_classes", &self.attribute_classes.len())
            .field("type_classes", &self.type_classes.len())
            .finish()
    }
}

impl Context {
    /// Context with the default configuration and the builtin dialect.
    pub fn new() -> Self {
        match Self::with_config(ContextConfig::default()) {
            Ok(ctx) => ctx,
            Err(err) => panic!("failed to create default context: {err:#}"),
        }
    }

    pub fn with_config(config: ContextConfig) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        config.validate()?;
        let id = ContextId::next();
        let mut ctx = Self {
            id,
            dialects: DialectRegistry::new(id),
            attribute_classes: ClassTable::new(ClassCategory::Attribute),
            type_classes: ClassTable::new(ClassCategory::Type),
            attributes: StorageUniquer::with_config(config.uniquer.clone()),
            types: StorageUniquer::with_config(config.uniquer.clone()),
            config,
        };

        builtins::register(&mut ctx).context("Failed to register builtin dialect")?;
        for namespace in ctx.config.preload_dialects.clone() {
            ctx.load_dialect(&namespace)
                .with_context(|| format!("Failed to preload dialect '{}'", namespace))?;
        }

        info!(
            "Created context {} ({} dialects, {} shards per class)",
            id,
            ctx.dialects.len(),
            ctx.config.uniquer.effective_shard_count()
        );
        Ok(ctx)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Load a dialect, or return the id of the already loaded one.
    pub fn load_dialect(&mut self, namespace: &str) -> Result<DialectId> {
        self.dialects.load(namespace)
    }

    pub fn dialect(&self, id: DialectId) -> Result<&Dialect> {
        self.dialects.get(id)
    }

    pub fn lookup_dialect(&self, namespace: &str) -> Option<&Dialect> {
        self.dialects.lookup(namespace)
    }

    pub fn dialects(&self) -> impl Iterator<Item = &Dialect> {
        self.dialects.iter()
    }

    pub fn builtin_dialect(&self) -> &Dialect {
        match self.dialects.lookup(builtins::BUILTIN_NAMESPACE) {
            Some(dialect) => dialect,
            None => panic!("builtin dialect missing from context {}", self.id),
        }
    }

    pub fn register_attribute<D: AttributeDef>(&mut self, dialect: DialectId, kinds: &[u32]) -> Result<()> {
        let class = ClassId::of::<D>();
        let owner = self.dialects.get(dialect)?;
        let kinds = self.attribute_classes.check_claim(class, owner, kinds)?;
        self.attributes.register_parametric::<AttrClass<D>>()?;
        debug!("Registered attribute {} in dialect '{}' with kinds {:?}", class, owner, kinds);
        self.attribute_classes.insert(class, dialect, kinds, false);
        Ok(())
    }

    pub fn register_singleton_attribute<D: SingletonAttr>(&mut self, dialect: DialectId, kind: u32) -> Result<()> {
        let class = ClassId::of::<D>();
        let owner = self.dialects.get(dialect)?;
        let kinds = self.attribute_classes.check_claim(class, owner, &[kind])?;
        self.attributes.register_singleton::<AttrClass<D>>()?;
        debug!("Registered singleton attribute {} in dialect '{}' with kind {}", class, owner, kind);
        self.attribute_classes.insert(class, dialect, kinds, true);
        Ok(())
    }

    pub fn register_type<D: TypeDef>(&mut self, dialect: DialectId, kinds: &[u32]) -> Result<()> {
        let class = ClassId::of::<D>();
        let owner = self.dialects.get(dialect)?;
        let kinds = self.type_classes.check_claim(class, owner, kinds)?;
        self.types.register_parametric::<TypeClass<D>>()?;
        debug!("Registered type {} in dialect '{}' with kinds {:?}", class, owner, kinds);
        self.type_classes.insert(class, dialect, kinds, false);
        Ok(())
    }

    pub fn register_singleton_type<D: SingletonType>(&mut self, dialect: DialectId, kind: u32) -> Result<()> {
        let class = ClassId::of::<D>();
        let owner = self.dialects.get(dialect)?;
        let kinds = self.type_classes.check_claim(class, owner, &[kind])?;
        self.types.register_singleton::<TypeClass<D>>()?;
        debug!("Registered singleton type {} in dialect '{}' with kind {}", class, owner, kind);
        self.type_classes.insert(class, dialect, kinds, true);
        Ok(())
    }

    pub fn is_attribute_registered<D: AttributeDef>(&self) -> bool {
        self.attribute_classes.contains(ClassId::of::<D>())
    }

    pub fn is_type_registered<D: TypeDef>(&self) -> bool {
        self.type_classes.contains(ClassId::of::<D>())
    }

    /// The registry owning every attribute record of this context.
    pub fn attribute_uniquer(&self) -> &StorageUniquer {
        &self.attributes
    }

    /// The registry owning every type record of this context.
    pub fn type_uniquer(&self) -> &StorageUniquer {
        &self.types
    }

    pub(crate) fn attribute_classes(&self) -> &ClassTable {
        &self.attribute_classes
    }

    pub(crate) fn type_classes(&self) -> &ClassTable {
        &self.type_classes
    }

    /// The canonical `NoneType`, the default type of attributes.
    pub fn none_type(&self) -> Type<'_> {
        match TypeUniquer::get_singleton::<NoneType>(self) {
            Ok(ty) => ty.as_type(),
            Err(err) => panic!("builtin NoneType unavailable in context {}: {}", self.id, err),
        }
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            context: self.id,
            dialects: self.dialects.len(),
            attributes: self.attributes.stats(),
            types: self.types.stats(),
            arena_bytes: self.attributes.arena_bytes() + self.types.arena_bytes(),
        }
    }
}
