use irstore_core::CompactHashMap;
use std::fmt;
use tracing::debug;

use crate::{ContextId, IrError, Result};

/// Handle of a dialect loaded into a specific context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialectId {
    context: ContextId,
    index: u32,
}

impl DialectId {
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A namespace that owns attribute and type classes.
#[derive(Debug, PartialEq, Eq)]
pub struct Dialect {
    id: DialectId,
    namespace: String,
}

impl Dialect {
    pub fn id(&self) -> DialectId {
        self.id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context_id(&self) -> ContextId {
        self.id.context
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)
    }
}

/// Dialect namespaces are identifiers: a letter or `_`, then letters, digits
/// or `_`.
pub fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) struct DialectRegistry {
    context: ContextId,
    // Boxed so `&Dialect` stamped into records survives later loads.
    #[allow(clippy::vec_box)]
    dialects: Vec<Box<Dialect>>,
    by_namespace: CompactHashMap<String, DialectId>,
}

impl DialectRegistry {
    pub(crate) fn new(context: ContextId) -> Self {
        Self {
            context,
            dialects: Vec::new(),
            by_namespace: CompactHashMap::default(),
        }
    }

    /// Load `namespace`, returning the existing id when already loaded.
    pub(crate) fn load(&mut self, namespace: &str) -> Result<DialectId> {
        if let Some(id) = self.by_namespace.get(namespace) {
            return Ok(*id);
        }
        if !is_valid_namespace(namespace) {
            return Err(IrError::InvalidNamespace(namespace.to_string()));
        }

        let id = DialectId {
            context: self.context,
            index: self.dialects.len() as u32,
        };
        self.dialects.push(Box::new(Dialect {
            id,
            namespace: namespace.to_string(),
        }));
        self.by_namespace.insert(namespace.to_string(), id);
        debug!("Loaded dialect '{}' into context {}", namespace, self.context);
        Ok(id)
    }

    pub(crate) fn get(&self, id: DialectId) -> Result<&Dialect> {
        if id.context != self.context {
            return Err(IrError::ForeignContext {
                expected: self.context,
                found: id.context,
            });
        }
        self.dialects
            .get(id.index as usize)
            .map(|d| &**d)
            .ok_or(IrError::InvalidDialectId(id.index))
    }

    pub(crate) fn lookup(&self, namespace: &str) -> Option<&Dialect> {
        let id = self.by_namespace.get(namespace)?;
        self.dialects.get(id.index as usize).map(|d| &**d)
    }

    pub(crate) fn len(&self) -> usize {
        self.dialects.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Dialect> {
        self.dialects.iter().map(|d| &**d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_validation() {
        assert!(is_valid_namespace("builtin"));
        assert!(is_valid_namespace("_test2"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("2d"));
        assert!(!is_valid_namespace("llvm.ir"));
    }

    #[test]
    fn load_is_idempotent() {
        let mut registry = DialectRegistry::new(ContextId::next());
        let a = registry.load("arith").unwrap();
        let b = registry.load("arith").unwrap();
        let c = registry.load("scf").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(c).unwrap().namespace(), "scf");
        assert_eq!(registry.lookup("arith").map(Dialect::id), Some(a));
        assert_eq!(
            registry.load("bad name"),
            Err(IrError::InvalidNamespace("bad name".into()))
        );
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let mut first = DialectRegistry::new(ContextId::next());
        let second = DialectRegistry::new(ContextId::next());
        let id = first.load("arith").unwrap();
        assert!(matches!(
            second.get(id),
            Err(IrError::ForeignContext { .. })
        ));
    }
}
