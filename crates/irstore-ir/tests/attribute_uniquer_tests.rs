use irstore_ir::{
    AttrClass, AttrStorage, Attribute, AttributeDef, AttributeStorage, AttributeUniquer, ClassId,
    Context, ContextId, DialectId, FunctionType, IntegerType, IrError, NoneType, StorageAllocator,
    StringAttr, SymbolRefAttr, Type, TypePolicy, UniquerError,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Plain `int64` payload of the test dialect.
#[derive(Debug)]
struct IntAttrStorage {
    value: i64,
}

// SAFETY: the payload holds no references.
unsafe impl<'c> AttrStorage<'c> for IntAttrStorage {
    type Key<'k> = i64 where 'c: 'k;

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
        assert!(key != i64::MIN, "refusing to construct i64::MIN");
        (AttributeStorage::default(), IntAttrStorage { value: key })
    }
}

struct IntAttr;
impl AttributeDef for IntAttr {
    type Storage<'c> = IntAttrStorage;
}

/// Same payload as `IntAttr`, different class.
struct TagAttr;
impl AttributeDef for TagAttr {
    type Storage<'c> = IntAttrStorage;
}

static LABEL_DROPS: AtomicUsize = AtomicUsize::new(0);

/// Payload with drop glue.
struct LabelStorage {
    label: String,
}

impl Drop for LabelStorage {
    fn drop(&mut self) {
        LABEL_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

// SAFETY: the label is copied into an owned `String`.
unsafe impl<'c> AttrStorage<'c> for LabelStorage {
    type Key<'k> = &'k str where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.label == *key
    }

    fn construct<'k>(_allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        (
            AttributeStorage::default(),
            LabelStorage {
                label: key.to_string(),
            },
        )
    }
}

struct LabelAttr;
impl AttributeDef for LabelAttr {
    type Storage<'c> = LabelStorage;
}

/// Payload referencing context memory: a name copied into the arena and a
/// type handle.
#[derive(Debug)]
struct TypedLabelStorage<'c> {
    name: &'c str,
    ty: Type<'c>,
}

// SAFETY: the name is copied through the allocator and the type handle is
// checked against the context in `verify_key`.
unsafe impl<'c> AttrStorage<'c> for TypedLabelStorage<'c> {
    type Key<'k> = (&'k str, Type<'c>) where 'c: 'k;

    fn matches<'k>(&self, key: &Self::Key<'k>) -> bool
    where
        'c: 'k,
    {
        self.name == key.0 && self.ty == key.1
    }

    fn construct<'k>(allocator: &mut StorageAllocator<'c>, key: Self::Key<'k>) -> (AttributeStorage<'c>, Self)
    where
        'c: 'k,
    {
        let (name, ty) = key;
        (
            AttributeStorage::new(ty, false),
            TypedLabelStorage {
                name: allocator.alloc_str(name),
                ty,
            },
        )
    }

    fn verify_key<'k>(key: &Self::Key<'k>, context: ContextId) -> irstore_ir::Result<()>
    where
        'c: 'k,
    {
        let found = key.1.context_id();
        if found != context {
            return Err(IrError::ForeignContext {
                expected: context,
                found,
            });
        }
        Ok(())
    }
}

struct TypedLabelAttr;
impl AttributeDef for TypedLabelAttr {
    type Storage<'c> = TypedLabelStorage<'c>;
}

const INT_KIND: u32 = 1;
const TAG_KIND: u32 = 2;
const TYPED_KIND: u32 = 10;

fn test_context() -> (Context, DialectId) {
    let mut ctx = Context::new();
    let test = ctx.load_dialect("test").unwrap();
    ctx.register_attribute::<IntAttr>(test, &[INT_KIND]).unwrap();
    ctx.register_attribute::<TagAttr>(test, &[TAG_KIND, TAG_KIND + 1]).unwrap();
    (ctx, test)
}

#[test]
fn test_int_attr_scenario() {
    let (ctx, _) = test_context();

    let r1 = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 42).unwrap();
    let again = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 42).unwrap();
    assert_eq!(r1, again);
    assert_eq!(r1.value, 42);

    let r2 = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 7).unwrap();
    assert_ne!(r1, r2);

    assert!(AttributeUniquer::erase::<IntAttr>(&ctx, INT_KIND, 42).unwrap());
    let r3 = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 42).unwrap();

    // R3 satisfies the record invariants on its own; R1 stays readable.
    for attr in [r1, r3] {
        assert_eq!(attr.value, 42);
        assert_eq!(attr.as_attribute().dialect().namespace(), "test");
        assert_eq!(attr.as_attribute().kind(), INT_KIND);
        assert!(attr.get_type().isa::<NoneType>());
    }
    assert_eq!(AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 42).unwrap(), r3);
}

#[test]
fn test_discrimination_by_class_and_kind() {
    let (ctx, _) = test_context();
    let int = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 5).unwrap();
    let tag = AttributeUniquer::get::<TagAttr>(&ctx, TAG_KIND, 5).unwrap();
    let tag_alt = AttributeUniquer::get::<TagAttr>(&ctx, TAG_KIND + 1, 5).unwrap();

    assert_ne!(int.as_attribute(), tag.as_attribute());
    assert_ne!(tag, tag_alt);
    assert!(int.as_attribute().isa::<IntAttr>());
    assert!(!int.as_attribute().isa::<TagAttr>());
    assert_eq!(tag_alt.as_attribute().kind(), TAG_KIND + 1);
}

#[test]
fn test_checked_downcast() {
    let (ctx, _) = test_context();
    let erased: Attribute<'_> = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 9).unwrap().into();

    assert!(erased.dyn_cast::<TagAttr>().is_none());
    let back = erased.dyn_cast::<IntAttr>().unwrap();
    assert_eq!(back.value, 9);
    assert_eq!(erased.cast::<IntAttr>(), back);
    assert_eq!(erased.class_id(), ClassId::of::<IntAttr>());

    let result = catch_unwind(AssertUnwindSafe(|| erased.cast::<TagAttr>()));
    assert!(result.is_err());
}

#[test]
fn test_erase_is_idempotent() {
    let (ctx, _) = test_context();
    assert!(!AttributeUniquer::erase::<IntAttr>(&ctx, INT_KIND, 100).unwrap());

    AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, 100).unwrap();
    assert!(AttributeUniquer::erase::<IntAttr>(&ctx, INT_KIND, 100).unwrap());
    assert!(!AttributeUniquer::erase::<IntAttr>(&ctx, INT_KIND, 100).unwrap());

    let stats = ctx.attribute_uniquer().class_stats::<AttrClass<IntAttr>>();
    assert_eq!((stats.created, stats.erased), (1, 1));
}

#[test]
fn test_registration_errors() {
    let (mut ctx, test) = test_context();

    assert_eq!(
        ctx.register_attribute::<IntAttr>(test, &[99]),
        Err(IrError::Uniquer(UniquerError::AlreadyRegistered(ClassId::of::<IntAttr>())))
    );
    assert!(matches!(
        ctx.register_attribute::<LabelAttr>(test, &[INT_KIND]),
        Err(IrError::KindConflict { kind: INT_KIND, .. })
    ));
    assert_eq!(
        ctx.register_attribute::<LabelAttr>(test, &[]),
        Err(IrError::EmptyKindSet("LabelAttr".to_string()))
    );
    assert!(!ctx.is_attribute_registered::<LabelAttr>());

    // Kinds are scoped per dialect.
    let other = ctx.load_dialect("other").unwrap();
    ctx.register_attribute::<LabelAttr>(other, &[INT_KIND]).unwrap();
    assert!(ctx.is_attribute_registered::<LabelAttr>());
}

#[test]
fn test_get_errors() {
    let (ctx, _) = test_context();
    assert_eq!(
        AttributeUniquer::get::<LabelAttr>(&ctx, 0, "x").unwrap_err(),
        IrError::UnregisteredAttribute("LabelAttr".to_string())
    );
    assert_eq!(
        AttributeUniquer::get::<IntAttr>(&ctx, TAG_KIND, 1).unwrap_err(),
        IrError::KindMismatch {
            class: "IntAttr".to_string(),
            kind: TAG_KIND
        }
    );
    assert!(AttributeUniquer::erase::<IntAttr>(&ctx, TAG_KIND, 1).is_err());
}

#[test]
fn test_failed_construction_publishes_nothing() {
    let (ctx, _) = test_context();
    let before = ctx.attribute_uniquer().len::<AttrClass<IntAttr>>();

    let result = catch_unwind(AssertUnwindSafe(|| {
        AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, i64::MIN)
    }));
    assert!(result.is_err());
    assert_eq!(ctx.attribute_uniquer().len::<AttrClass<IntAttr>>(), before);

    let ok = AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, i64::MAX).unwrap();
    assert_eq!(ok.value, i64::MAX);
}

#[test]
fn test_foreign_context_handles_are_rejected() {
    let ctx = Context::new();
    let other = Context::new();
    let foreign = StringAttr::get(&other, "elsewhere").unwrap().as_attribute();

    assert!(matches!(
        irstore_ir::ArrayAttr::get(&ctx, &[foreign]),
        Err(IrError::ForeignContext { .. })
    ));

    let symbol = SymbolRefAttr::get(&ctx, "f").unwrap().as_attribute();
    let foreign_ty = other.none_type();
    assert!(matches!(
        symbol.resolve_type(foreign_ty),
        Err(IrError::ForeignContext { .. })
    ));
}

#[test]
fn test_borrowed_keys_outlive_the_caller() {
    const NAME: &str = "a-key-that-is-longer-than-sixteen-bytes";
    let (mut ctx, test) = test_context();
    ctx.register_attribute::<TypedLabelAttr>(test, &[TYPED_KIND]).unwrap();
    let none = ctx.none_type();

    let owned = String::from(NAME);
    let first = AttributeUniquer::get::<TypedLabelAttr>(&ctx, TYPED_KIND, (owned.as_str(), none)).unwrap();
    drop(owned);

    // Reuse the freed allocation so a dangling name would no longer match.
    let _filler = "x".repeat(NAME.len());
    let again = AttributeUniquer::get::<TypedLabelAttr>(&ctx, TYPED_KIND, (NAME, none)).unwrap();
    assert_eq!(first, again);
    assert_eq!(first.name, NAME);
    assert_eq!(first.get_type(), none);
    assert_eq!(ctx.attribute_uniquer().len::<AttrClass<TypedLabelAttr>>(), 1);
}

#[test]
fn test_user_class_rejects_foreign_handles() {
    let (mut ctx, test) = test_context();
    ctx.register_attribute::<TypedLabelAttr>(test, &[TYPED_KIND]).unwrap();
    let other = Context::new();

    let err = AttributeUniquer::get::<TypedLabelAttr>(&ctx, TYPED_KIND, ("x", other.none_type())).unwrap_err();
    assert_eq!(
        err,
        IrError::ForeignContext {
            expected: ctx.id(),
            found: other.id(),
        }
    );
    assert_eq!(ctx.attribute_uniquer().len::<AttrClass<TypedLabelAttr>>(), 0);

    let local = AttributeUniquer::get::<TypedLabelAttr>(&ctx, TYPED_KIND, ("x", ctx.none_type())).unwrap();
    assert_eq!(local.ty.context_id(), ctx.id());
}

#[test]
fn test_deferred_type_resolution() {
    let ctx = Context::new();
    let symbol = SymbolRefAttr::get(&ctx, "main").unwrap();
    let attr = symbol.as_attribute();
    assert_eq!(attr.storage().policy(), TypePolicy::Deferred);
    assert!(attr.try_get_type().is_none());

    let result = catch_unwind(AssertUnwindSafe(|| attr.get_type()));
    assert!(result.is_err());

    let int = IntegerType::signless(&ctx, 32).unwrap().as_type();
    let signature = FunctionType::get(&ctx, &[int], &[int]).unwrap().as_type();
    attr.resolve_type(signature).unwrap();
    assert_eq!(attr.get_type(), signature);

    // Every handle to the record observes the resolution.
    assert_eq!(SymbolRefAttr::get(&ctx, "main").unwrap().get_type(), signature);
    assert_eq!(
        attr.resolve_type(signature),
        Err(IrError::TypeAlreadyResolved("SymbolRefAttr".to_string()))
    );

    let string = StringAttr::get(&ctx, "main").unwrap().as_attribute();
    assert_eq!(
        string.resolve_type(signature),
        Err(IrError::NotDeferred("StringAttr".to_string()))
    );
    assert_eq!(symbol.symbol(), "main");
}

#[test]
fn test_context_drop_runs_payload_destructors() {
    let before = LABEL_DROPS.load(Ordering::SeqCst);
    {
        let (mut ctx, test) = test_context();
        ctx.register_attribute::<LabelAttr>(test, &[50]).unwrap();
        for label in ["a", "b", "c", "a"] {
            AttributeUniquer::get::<LabelAttr>(&ctx, 50, label).unwrap();
        }
        AttributeUniquer::erase::<LabelAttr>(&ctx, 50, "b").unwrap();
        let a = AttributeUniquer::get::<LabelAttr>(&ctx, 50, "a").unwrap();
        assert_eq!(a.label, "a");
        assert_eq!(LABEL_DROPS.load(Ordering::SeqCst), before);
    }
    assert_eq!(LABEL_DROPS.load(Ordering::SeqCst), before + 3);
}

#[test]
fn test_stats_report_per_class_counts() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (ctx, _) = test_context();
    for v in 0..10 {
        AttributeUniquer::get::<IntAttr>(&ctx, INT_KIND, v % 4).unwrap();
    }
    let stats = ctx.stats();
    assert_eq!(stats.context, ctx.id());
    assert_eq!(stats.attributes["AttrClass<IntAttr>"].created, 4);
    assert!(stats.types["TypeClass<NoneType>"].created >= 1);
    assert!(stats.to_json().unwrap().contains("AttrClass<IntAttr>"));
}
