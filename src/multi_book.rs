//! Multi-book pool - handle-based container for books of three window
//! sizes sharing one spill pool.
//!
//! Liquid symbols get a wide tape, quiet ones a narrow tape, and all of
//! them park their out-of-window depth in the same arena. Handles are
//! stable cookies: `{tier, index}` into one of three vectors.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::book::{Book, BookOps};
use crate::spill_pool::SpillPool;
use crate::types::{Price, Qty};

/// Which of the three book shapes a handle points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BookTier {
    /// Widest tape window.
    Large = 0,
    /// Middle tape window.
    Medium = 1,
    /// Narrowest tape window.
    Small = 2,
}

/// Stable cookie for a book inside a [`MultiBookPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BookHandle {
    /// Which tier vector the book lives in.
    pub tier: BookTier,
    /// Index inside that tier's vector.
    pub idx: u32,
}

/// Container for books of three window sizes backed by one shared
/// [`SpillPool`].
///
/// Every allocated book holds a clone of the pool handle, so blocks are
/// always released into a live pool no matter in which order things are
/// torn down.
pub struct MultiBookPool<
    P: Price,
    Q: Qty,
    const N_LARGE: usize,
    const N_MEDIUM: usize,
    const N_SMALL: usize,
> {
    spill_pool: Rc<RefCell<SpillPool<P, Q>>>,
    large: Vec<Book<P, Q, N_LARGE>>,
    medium: Vec<Book<P, Q, N_MEDIUM>>,
    small: Vec<Book<P, Q, N_SMALL>>,
    /// Optional symbol-id registry over the handles.
    symbols: FxHashMap<u32, BookHandle>,
}

impl<P: Price, Q: Qty, const N_LARGE: usize, const N_MEDIUM: usize, const N_SMALL: usize>
    MultiBookPool<P, Q, N_LARGE, N_MEDIUM, N_SMALL>
{
    /// Create an empty pool whose shared arena holds
    /// `spill_pool_levels` level cells.
    pub fn new(spill_pool_levels: u32) -> Self {
        Self {
            spill_pool: Rc::new(RefCell::new(SpillPool::new(spill_pool_levels))),
            large: Vec::new(),
            medium: Vec::new(),
            small: Vec::new(),
            symbols: FxHashMap::default(),
        }
    }

    /// Pre-size the large-tier vector.
    pub fn reserve_large(&mut self, n: usize) {
        self.large.reserve(n);
    }

    /// Pre-size the medium-tier vector.
    pub fn reserve_medium(&mut self, n: usize) {
        self.medium.reserve(n);
    }

    /// Pre-size the small-tier vector.
    pub fn reserve_small(&mut self, n: usize) {
        self.small.reserve(n);
    }

    /// Append a pool-backed book to `tier`, reset it at `anchor`, and
    /// return its handle.
    pub fn alloc(&mut self, tier: BookTier, anchor: P, max_spill_cap: u32) -> BookHandle {
        let pool = Some(Rc::clone(&self.spill_pool));
        match tier {
            BookTier::Large => {
                let idx = self.large.len() as u32;
                let mut book = Book::new(max_spill_cap, pool);
                book.reset(anchor);
                self.large.push(book);
                BookHandle { tier, idx }
            }
            BookTier::Medium => {
                let idx = self.medium.len() as u32;
                let mut book = Book::new(max_spill_cap, pool);
                book.reset(anchor);
                self.medium.push(book);
                BookHandle { tier, idx }
            }
            BookTier::Small => {
                let idx = self.small.len() as u32;
                let mut book = Book::new(max_spill_cap, pool);
                book.reset(anchor);
                self.small.push(book);
                BookHandle { tier, idx }
            }
        }
    }

    /// [`MultiBookPool::alloc`] plus a symbol-id registration, so the
    /// book can later be found with [`MultiBookPool::handle_for`].
    pub fn alloc_symbol(
        &mut self,
        symbol: u32,
        tier: BookTier,
        anchor: P,
        max_spill_cap: u32,
    ) -> BookHandle {
        let handle = self.alloc(tier, anchor, max_spill_cap);
        self.symbols.insert(symbol, handle);
        handle
    }

    /// Handle registered for `symbol`, if any.
    #[inline]
    pub fn handle_for(&self, symbol: u32) -> Option<BookHandle> {
        self.symbols.get(&symbol).copied()
    }

    /// Run `f` with a mutable view of the book behind `handle`.
    ///
    /// # Panics
    /// Panics if the handle's index is out of range for its tier.
    #[inline]
    pub fn with_book<R>(
        &mut self,
        handle: BookHandle,
        f: impl FnOnce(&mut dyn BookOps<P, Q>) -> R,
    ) -> R {
        match handle.tier {
            BookTier::Large => f(&mut self.large[handle.idx as usize]),
            BookTier::Medium => f(&mut self.medium[handle.idx as usize]),
            BookTier::Small => f(&mut self.small[handle.idx as usize]),
        }
    }

    /// Run `f` with a shared view of the book behind `handle`.
    #[inline]
    pub fn with_book_ref<R>(
        &self,
        handle: BookHandle,
        f: impl FnOnce(&dyn BookOps<P, Q>) -> R,
    ) -> R {
        match handle.tier {
            BookTier::Large => f(&self.large[handle.idx as usize]),
            BookTier::Medium => f(&self.medium[handle.idx as usize]),
            BookTier::Small => f(&self.small[handle.idx as usize]),
        }
    }

    /// Direct access to a large-tier book.
    #[inline]
    pub fn large(&mut self, idx: u32) -> &mut Book<P, Q, N_LARGE> {
        &mut self.large[idx as usize]
    }

    /// Direct access to a medium-tier book.
    #[inline]
    pub fn medium(&mut self, idx: u32) -> &mut Book<P, Q, N_MEDIUM> {
        &mut self.medium[idx as usize]
    }

    /// Direct access to a small-tier book.
    #[inline]
    pub fn small(&mut self, idx: u32) -> &mut Book<P, Q, N_SMALL> {
        &mut self.small[idx as usize]
    }

    /// Number of books allocated in `tier`.
    pub fn len(&self, tier: BookTier) -> usize {
        match tier {
            BookTier::Large => self.large.len(),
            BookTier::Medium => self.medium.len(),
            BookTier::Small => self.small.len(),
        }
    }

    /// True when no book has been allocated in any tier.
    pub fn is_empty(&self) -> bool {
        self.large.is_empty() && self.medium.is_empty() && self.small.is_empty()
    }

    /// Shared handle to the spill pool backing all books.
    pub fn spill_pool(&self) -> Rc<RefCell<SpillPool<P, Q>>> {
        Rc::clone(&self.spill_pool)
    }

    /// Arena cells handed out so far.
    pub fn spill_used_levels(&self) -> u32 {
        self.spill_pool.borrow().used_levels()
    }

    /// Total arena capacity in cells.
    pub fn spill_total_levels(&self) -> u32 {
        self.spill_pool.borrow().total_levels()
    }

    /// Spill allocations refused for lack of arena space.
    pub fn spill_alloc_fail_count(&self) -> u64 {
        self.spill_pool.borrow().alloc_fail_count()
    }
}

impl<P: Price, Q: Qty, const N_LARGE: usize, const N_MEDIUM: usize, const N_SMALL: usize>
    std::fmt::Debug for MultiBookPool<P, Q, N_LARGE, N_MEDIUM, N_SMALL>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBookPool")
            .field("large", &self.large.len())
            .field("medium", &self.medium.len())
            .field("small", &self.small.len())
            .field("spill_used_levels", &self.spill_used_levels())
            .finish()
    }
}
