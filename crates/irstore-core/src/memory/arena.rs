use bumpalo::Bump;
use std::alloc::Layout;
use std::mem;
use std::ptr::{self, NonNull};

/// Drop glue for one record living in the arena.
struct Destructor {
    ptr: NonNull<u8>,
    drop_fn: unsafe fn(NonNull<u8>),
}

// SAFETY: only records of `Send + Sync` storage types are registered, so
// their destructors may run on whichever thread drops the arena.
unsafe impl Send for Destructor {}

unsafe fn drop_erased<T>(ptr: NonNull<u8>) {
    // SAFETY: `ptr` was produced by `ArenaPlacer::place::<T>` and is dropped once.
    unsafe { ptr::drop_in_place(ptr.cast::<T>().as_ptr()) }
}

/// Bump arena owning every record of one uniquer shard.
///
/// Records are never freed individually. Dropping the arena runs the
/// destructors of records with drop glue, then releases all chunks at once.
#[derive(Debug)]
pub struct StorageArena {
    bump: Bump,
    destructors: Vec<Destructor>,
    records: usize,
}

impl std::fmt::Debug for Destructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destructor").field("ptr", &self.ptr).finish()
    }
}

impl Default for StorageArena {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageArena {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bump: Bump::with_capacity(bytes),
            destructors: Vec::new(),
            records: 0,
        }
    }

    /// Number of records placed in this arena, erased ones included.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Bytes of chunk memory reserved by the arena.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Lend the bump out as a `StorageAllocator` whose results live for `'a`,
    /// together with a placer for publishing the finished record.
    ///
    /// # Safety
    ///
    /// `'a` must not outlive the arena, the arena must not be reset while `'a`
    /// is live, and the allocator must be dropped before the arena is handed to
    /// another thread (the caller holds the shard's arena lock throughout).
    pub(crate) unsafe fn split<'a>(&mut self) -> (StorageAllocator<'a>, ArenaPlacer<'_>) {
        let StorageArena {
            bump,
            destructors,
            records,
        } = self;
        // SAFETY: chunk memory handed out by the bump is stable until the
        // bump is dropped; the caller guarantees that outlives `'a`.
        let bump: &'a Bump = unsafe { &*(bump as *const Bump) };
        (
            StorageAllocator { bump, bytes: 0 },
            ArenaPlacer {
                destructors,
                records,
            },
        )
    }
}

impl Drop for StorageArena {
    fn drop(&mut self) {
        for destructor in self.destructors.drain(..).rev() {
            // SAFETY: each record is registered exactly once and the bump
            // chunks are still alive here.
            unsafe { (destructor.drop_fn)(destructor.ptr) };
        }
    }
}

/// Allocator lent to storage constructors for out-of-line data.
///
/// Everything allocated here lives as long as the owning uniquer. The element
/// types of slice allocations are `Copy`, so nothing allocated here ever needs
/// dropping.
pub struct StorageAllocator<'a> {
    bump: &'a Bump,
    bytes: usize,
}

impl<'a> StorageAllocator<'a> {
    /// Raw memory with the given size and alignment.
    pub fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        self.bytes += layout.size();
        self.bump.alloc_layout(layout)
    }

    pub fn alloc_str(&mut self, s: &str) -> &'a str {
        self.bytes += s.len();
        self.bump.alloc_str(s)
    }

    pub fn alloc_slice_copy<T: Copy>(&mut self, src: &[T]) -> &'a [T] {
        self.bytes += mem::size_of_val(src);
        self.bump.alloc_slice_copy(src)
    }

    pub fn alloc_slice_fill_iter<T, I>(&mut self, iter: I) -> &'a [T]
    where
        T: Copy,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = iter.into_iter();
        self.bytes += mem::size_of::<T>() * iter.len();
        self.bump.alloc_slice_fill_iter(iter)
    }

    /// Bytes requested through this allocator so far.
    pub fn bytes_requested(&self) -> usize {
        self.bytes
    }
}

/// Moves a constructed record into the arena and tracks its drop glue.
pub(crate) struct ArenaPlacer<'g> {
    destructors: &'g mut Vec<Destructor>,
    records: &'g mut usize,
}

impl ArenaPlacer<'_> {
    pub(crate) fn place<'a, T>(&mut self, allocator: &mut StorageAllocator<'a>, value: T) -> NonNull<T> {
        allocator.bytes += mem::size_of::<T>();
        let ptr = NonNull::from(allocator.bump.alloc(value));
        if mem::needs_drop::<T>() {
            self.destructors.push(Destructor {
                ptr: ptr.cast(),
                drop_fn: drop_erased::<T>,
            });
        }
        *self.records += 1;
        ptr
    }
}
