// ============================================================================
// ARENA: bump allocation with LIFO checkpoint scopes
// ============================================================================
//
// All per-frame render memory comes from arenas.  Nothing is freed
// individually: a scope is either reset (rewound and zeroed) or popped.
// Running out of space is not a crash; it is reported as `ArenaError` so the
// render driver can grow the arena and retry the same unit of work.

use std::fmt;

/// Error returned when an arena (or the innermost scope) is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    OutOfMemory { requested: usize, available: usize },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::OutOfMemory { requested, available } => write!(
                f,
                "arena exhausted: requested {} elements, {} available",
                requested, available
            ),
        }
    }
}

impl std::error::Error for ArenaError {}

/// Handle to a run of elements inside an [`Arena`].
///
/// Handles stay valid until the scope that produced them is reset or popped;
/// after that they read zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSlice {
    offset: usize,
    len: usize,
}

impl ArenaSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Token returned by [`Arena::push`].  Must be handed back to
/// [`Arena::pop`] in reverse push order.
#[must_use = "a pushed arena scope must be popped"]
#[derive(Debug)]
pub struct ArenaCheckpoint {
    id: u64,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    id: u64,
    start: usize,
    end: usize,
    cursor: usize,
}

/// Typed bump arena over a fixed block of `T`.  Never grows.
#[derive(Debug)]
pub struct Arena<T: Copy + Default> {
    storage: Vec<T>,
    /// `scopes[0]` covers the whole block; later entries are pushed children.
    scopes: Vec<Scope>,
    next_scope_id: u64,
}

impl<T: Copy + Default> Arena<T> {
    /// Allocate a zeroed block of `size` elements and wrap it.
    pub fn new(size: usize) -> Self {
        Self::from_block(vec![T::default(); size])
    }

    /// Wrap a caller-provided block.  The block is cleared to `T::default()`.
    pub fn from_block(mut block: Vec<T>) -> Self {
        block.fill(T::default());
        let size = block.len();
        Self {
            storage: block,
            scopes: vec![Scope { id: 0, start: 0, end: size, cursor: 0 }],
            next_scope_id: 1,
        }
    }

    /// Total number of elements owned by this arena.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Elements allocated in the innermost scope.
    pub fn used(&self) -> usize {
        let top = self.top();
        top.cursor - top.start
    }

    /// Elements still available in the innermost scope.
    pub fn remaining(&self) -> usize {
        let top = self.top();
        top.end - top.cursor
    }

    /// Number of pushed scopes currently active.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    fn top(&self) -> &Scope {
        // scopes[0] is never popped
        &self.scopes[self.scopes.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Bump-allocate `n` zeroed elements from the innermost scope.
    pub fn alloc(&mut self, n: usize) -> Result<ArenaSlice, ArenaError> {
        let top = self.top_mut();
        let available = top.end - top.cursor;
        if n > available {
            return Err(ArenaError::OutOfMemory { requested: n, available });
        }
        let slice = ArenaSlice { offset: top.cursor, len: n };
        top.cursor += n;
        Ok(slice)
    }

    /// Allocate and fill from `values` in one step.
    pub fn alloc_copy(&mut self, values: &[T]) -> Result<ArenaSlice, ArenaError> {
        let slice = self.alloc(values.len())?;
        self.get_mut(slice).copy_from_slice(values);
        Ok(slice)
    }

    pub fn get(&self, slice: ArenaSlice) -> &[T] {
        &self.storage[slice.offset..slice.offset + slice.len]
    }

    pub fn get_mut(&mut self, slice: ArenaSlice) -> &mut [T] {
        &mut self.storage[slice.offset..slice.offset + slice.len]
    }

    /// Open a nested scope of `size` elements carved from the innermost one.
    /// Allocations go to the new scope until it is popped.
    pub fn push(&mut self, size: usize) -> Result<ArenaCheckpoint, ArenaError> {
        let id = self.next_scope_id;
        let top = self.top_mut();
        let available = top.end - top.cursor;
        if size > available {
            return Err(ArenaError::OutOfMemory { requested: size, available });
        }
        let start = top.cursor;
        top.cursor += size;
        self.scopes.push(Scope { id, start, end: start + size, cursor: start });
        self.next_scope_id += 1;
        Ok(ArenaCheckpoint { id })
    }

    /// Close the most recently pushed scope, zeroing everything it handed out
    /// and returning its space to the parent.
    ///
    /// Panics if `checkpoint` is not the most recent push.
    pub fn pop(&mut self, checkpoint: ArenaCheckpoint) {
        assert!(self.scopes.len() > 1, "arena pop without a matching push");
        let top = *self.top();
        assert_eq!(
            top.id, checkpoint.id,
            "arena scopes must be popped in reverse push order"
        );
        self.storage[top.start..top.cursor].fill(T::default());
        self.scopes.pop();
        self.top_mut().cursor = top.start;
    }

    /// Zero and rewind the innermost scope (the whole arena when no scope is
    /// pushed).
    pub fn reset(&mut self) {
        let top = *self.top();
        self.storage[top.start..top.cursor].fill(T::default());
        self.top_mut().cursor = top.start;
    }

    /// Carve a disjoint child arena of `size` elements off the tail of this
    /// arena's free space.  The parent permanently shrinks by `size`.
    pub fn spawn(&mut self, size: usize) -> Result<Arena<T>, ArenaError> {
        assert_eq!(self.depth(), 0, "cannot spawn from an arena with open scopes");
        let available = self.remaining();
        if size > available {
            return Err(ArenaError::OutOfMemory { requested: size, available });
        }
        let child = self.storage.split_off(self.storage.len() - size);
        self.scopes[0].end = self.storage.len();
        Ok(Arena::from_block(child))
    }
}
