//! Spill store - sorted per-side overflow for prices outside the tape
//! window.
//!
//! Each side is a price-ascending array of levels with a hard capacity
//! ceiling. Storage is either a side-owned heap allocation or a block
//! granted by a shared [`SpillPool`]; the two paths differ only at
//! allocate/release, the algorithms run on a plain slice either way.

use std::cell::RefCell;
use std::rc::Rc;

use crate::spill_pool::{BlockOffset, SpillPool, MIN_BLOCK};
use crate::types::{Level, Price, Qty};

/// Receiver for levels displaced from a tape.
///
/// The tape pushes out-of-window levels here and forwards threshold
/// erases so the overflow store stays in sync. [`SpillBuffer`] is the
/// real implementation; [`NullSink`] swallows everything and is used
/// for tape writes that are guaranteed in-window (the post-recenter
/// drain and retry).
pub trait Sink<P: Price, Q: Qty> {
    /// Record `(px, q)` for the given side. `q == 0` cancels.
    fn push(&mut self, is_bid: bool, px: P, q: Q);

    /// Drop recorded levels better than or equal to `threshold`.
    fn erase_better(&mut self, is_bid: bool, threshold: P);

    /// Visit recorded levels best-first until `f` returns false.
    fn iterate_pending<F: FnMut(P, Q) -> bool>(&self, is_bid: bool, f: F) {
        let _ = (is_bid, f);
    }
}

/// A sink that drops everything. Compiles to nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl<P: Price, Q: Qty> Sink<P, Q> for NullSink {
    #[inline]
    fn push(&mut self, _is_bid: bool, _px: P, _q: Q) {}

    #[inline]
    fn erase_better(&mut self, _is_bid: bool, _threshold: P) {}
}

/// Backing storage for one spill side.
enum Storage<P, Q> {
    /// Nothing allocated yet (or released).
    Empty,
    /// Side-owned allocation, used when no pool is attached.
    Heap(Box<[Level<P, Q>]>),
    /// Block inside a shared pool's arena.
    Pooled(BlockOffset),
}

/// First index whose price is not below `px`.
#[inline]
fn lower_bound<P: Price, Q>(cells: &[Level<P, Q>], px: P) -> usize {
    cells.partition_point(|lv| lv.px < px)
}

/// One side of the spill store: a sorted-ascending level array that
/// grows by doubling up to `max_cap`, then evicts its worst level.
pub(crate) struct SpillSide<P, Q> {
    storage: Storage<P, Q>,
    len: u32,
    cap: u32,
    max_cap: u32,
}

impl<P: Price, Q: Qty> SpillSide<P, Q> {
    fn new(max_cap: u32) -> Self {
        Self {
            storage: Storage::Empty,
            len: 0,
            cap: 0,
            max_cap,
        }
    }

    fn cells<'a>(
        storage: &'a Storage<P, Q>,
        cap: u32,
        pool: Option<&'a SpillPool<P, Q>>,
    ) -> &'a [Level<P, Q>] {
        match storage {
            Storage::Empty => &[],
            Storage::Heap(cells) => cells,
            Storage::Pooled(off) => pool
                .expect("pool-backed spill side outlived its pool")
                .block(*off, cap),
        }
    }

    fn cells_mut<'a>(
        storage: &'a mut Storage<P, Q>,
        cap: u32,
        pool: Option<&'a mut SpillPool<P, Q>>,
    ) -> &'a mut [Level<P, Q>] {
        match storage {
            Storage::Empty => &mut [],
            Storage::Heap(cells) => cells,
            Storage::Pooled(off) => pool
                .expect("pool-backed spill side outlived its pool")
                .block_mut(*off, cap),
        }
    }

    /// Double capacity (first grant is `MIN_BLOCK`), clamped to
    /// `max_cap`. On pool exhaustion the side keeps its current block;
    /// the caller's insert degrades to eviction or a silent drop.
    fn grow(&mut self, pool: Option<&mut SpillPool<P, Q>>) {
        let mut new_cap = if self.cap == 0 { MIN_BLOCK } else { self.cap * 2 };
        if new_cap > self.max_cap {
            new_cap = self.max_cap;
        }
        if new_cap <= self.cap {
            return;
        }
        match pool {
            Some(pool) => {
                let old = match self.storage {
                    Storage::Pooled(off) => Some(off),
                    _ => None,
                };
                if let Some(off) = pool.reallocate(old, self.cap, new_cap, self.len) {
                    self.storage = Storage::Pooled(off);
                    self.cap = new_cap;
                }
            }
            None => {
                let zero = Level {
                    px: P::from_i64(0),
                    qty: Q::ZERO,
                };
                let mut next = vec![zero; new_cap as usize].into_boxed_slice();
                if let Storage::Heap(old) = &self.storage {
                    let used = self.len as usize;
                    next[..used].copy_from_slice(&old[..used]);
                }
                self.storage = Storage::Heap(next);
                self.cap = new_cap;
            }
        }
    }

    fn push(&mut self, is_bid: bool, px: P, q: Q, mut pool: Option<&mut SpillPool<P, Q>>) {
        if self.len == self.cap && self.cap < self.max_cap {
            self.grow(pool.as_deref_mut());
        }
        let cap = self.cap;
        let cells = Self::cells_mut(&mut self.storage, cap, pool);

        let n = self.len as usize;
        let i = lower_bound(&cells[..n], px);
        if i < n && cells[i].px == px {
            if q.is_zero() {
                cells.copy_within(i + 1..n, i);
                self.len -= 1;
            } else {
                cells[i].qty = q;
            }
            return;
        }
        if q.is_zero() {
            return;
        }

        let mut n = n;
        if n == cap as usize {
            if n == 0 {
                // No storage could be granted at all; drop the update.
                return;
            }
            // Saturated: evict the worst level, or drop the incoming
            // update when it is not strictly better than the victim.
            if is_bid {
                if px <= cells[0].px {
                    return;
                }
                cells.copy_within(1..n, 0);
                n -= 1;
            } else {
                if px >= cells[n - 1].px {
                    return;
                }
                n -= 1;
            }
        }

        let j = lower_bound(&cells[..n], px);
        cells.copy_within(j..n, j + 1);
        cells[j] = Level { px, qty: q };
        self.len = (n + 1) as u32;
    }

    /// Visit non-zero levels with `px` in `[lo, hi]` and remove the
    /// whole range in one shift.
    fn drain_range(
        &mut self,
        lo: P,
        hi: P,
        pool: Option<&mut SpillPool<P, Q>>,
        f: &mut impl FnMut(P, Q),
    ) {
        if self.len == 0 {
            return;
        }
        let cap = self.cap;
        let cells = Self::cells_mut(&mut self.storage, cap, pool);
        let n = self.len as usize;
        let l = lower_bound(&cells[..n], lo);
        let mut r = l;
        while r < n && cells[r].px <= hi {
            if !cells[r].qty.is_zero() {
                f(cells[r].px, cells[r].qty);
            }
            r += 1;
        }
        if l < r {
            cells.copy_within(r..n, l);
            self.len = (l + n - r) as u32;
        }
    }

    fn erase_better(
        &mut self,
        is_bid: bool,
        threshold: P,
        pool: Option<&mut SpillPool<P, Q>>,
    ) {
        if self.len == 0 {
            return;
        }
        let cap = self.cap;
        let cells = Self::cells_mut(&mut self.storage, cap, pool);
        let n = self.len as usize;
        let mut w = 0;
        for i in 0..n {
            let keep = if is_bid {
                cells[i].px < threshold
            } else {
                cells[i].px > threshold
            };
            if keep {
                if w != i {
                    cells[w] = cells[i];
                }
                w += 1;
            }
        }
        self.len = w as u32;
    }

    fn iterate(
        &self,
        is_bid: bool,
        worst_px: P,
        pool: Option<&SpillPool<P, Q>>,
        f: &mut impl FnMut(P, Q) -> bool,
    ) {
        let cells = Self::cells(&self.storage, self.cap, pool);
        let n = self.len as usize;
        if is_bid {
            for lv in cells[..n].iter().rev() {
                if lv.px < worst_px {
                    break;
                }
                if !f(lv.px, lv.qty) {
                    return;
                }
            }
        } else {
            for lv in &cells[..n] {
                if lv.px > worst_px {
                    break;
                }
                if !f(lv.px, lv.qty) {
                    return;
                }
            }
        }
    }

    fn best_px(&self, is_bid: bool, pool: Option<&SpillPool<P, Q>>) -> P {
        if self.len == 0 {
            return if is_bid { P::MIN_PX } else { P::MAX_PX };
        }
        let cells = Self::cells(&self.storage, self.cap, pool);
        if is_bid {
            cells[self.len as usize - 1].px
        } else {
            cells[0].px
        }
    }

    fn best_qty(&self, is_bid: bool, pool: Option<&SpillPool<P, Q>>) -> Q {
        if self.len == 0 {
            return Q::ZERO;
        }
        let cells = Self::cells(&self.storage, self.cap, pool);
        if is_bid {
            cells[self.len as usize - 1].qty
        } else {
            cells[0].qty
        }
    }

    fn is_sorted_unique(&self, pool: Option<&SpillPool<P, Q>>) -> bool {
        let cells = Self::cells(&self.storage, self.cap, pool);
        cells[..self.len as usize]
            .windows(2)
            .all(|w| w[0].px < w[1].px)
    }

    /// Return the block (to the pool or the heap) and reset to empty.
    fn release(&mut self, pool: Option<&mut SpillPool<P, Q>>) {
        if let Storage::Pooled(off) = self.storage {
            pool.expect("pool-backed spill side outlived its pool")
                .deallocate(off, self.cap);
        }
        self.storage = Storage::Empty;
        self.len = 0;
        self.cap = 0;
    }
}

/// Two-sided spill store: bid side + ask side + optional shared pool.
///
/// Implements [`Sink`], so a tape can hand displaced levels straight to
/// it. Books never copy spill buffers; moving one transfers its blocks.
pub struct SpillBuffer<P: Price, Q: Qty> {
    bid: SpillSide<P, Q>,
    ask: SpillSide<P, Q>,
    pool: Option<Rc<RefCell<SpillPool<P, Q>>>>,
}

impl<P: Price, Q: Qty> SpillBuffer<P, Q> {
    /// Create a spill buffer with a per-side level ceiling.
    ///
    /// # Panics
    /// Panics unless `max_cap` is a power of two >= 1.
    pub fn new(max_cap: u32, pool: Option<Rc<RefCell<SpillPool<P, Q>>>>) -> Self {
        assert!(
            max_cap >= 1 && max_cap.is_power_of_two(),
            "max_cap must be a power of 2"
        );
        Self {
            bid: SpillSide::new(max_cap),
            ask: SpillSide::new(max_cap),
            pool,
        }
    }

    fn side(&self, is_bid: bool) -> &SpillSide<P, Q> {
        if is_bid {
            &self.bid
        } else {
            &self.ask
        }
    }

    /// Record `(px, q)` on one side; `q == 0` removes. At `max_cap`
    /// the worst level is evicted, or the incoming update dropped when
    /// it is not strictly better than the victim.
    pub fn push(&mut self, is_bid: bool, px: P, q: Q) {
        let side = if is_bid { &mut self.bid } else { &mut self.ask };
        match self.pool.as_ref() {
            Some(rc) => {
                let mut pool = rc.borrow_mut();
                side.push(is_bid, px, q, Some(&mut *pool));
            }
            None => side.push(is_bid, px, q, None),
        }
    }

    /// Visit and remove all levels with `px` in `[lo, hi]` on one side.
    /// Zero-quantity entries are removed without a visit.
    pub fn drain(&mut self, is_bid: bool, lo: P, hi: P, mut f: impl FnMut(P, Q)) {
        let side = if is_bid { &mut self.bid } else { &mut self.ask };
        match self.pool.as_ref() {
            Some(rc) => {
                let mut pool = rc.borrow_mut();
                side.drain_range(lo, hi, Some(&mut *pool), &mut f);
            }
            None => side.drain_range(lo, hi, None, &mut f),
        }
    }

    /// Drop levels better than or equal to `threshold` on one side.
    pub fn erase_better(&mut self, is_bid: bool, threshold: P) {
        let side = if is_bid { &mut self.bid } else { &mut self.ask };
        match self.pool.as_ref() {
            Some(rc) => {
                let mut pool = rc.borrow_mut();
                side.erase_better(is_bid, threshold, Some(&mut *pool));
            }
            None => side.erase_better(is_bid, threshold, None),
        }
    }

    /// Best-first walk of one side, stopping at the first level worse
    /// than `worst_px` or when `f` returns false.
    pub fn iterate(&self, is_bid: bool, worst_px: P, mut f: impl FnMut(P, Q) -> bool) {
        let side = self.side(is_bid);
        match self.pool.as_ref() {
            Some(rc) => {
                let pool = rc.borrow();
                side.iterate(is_bid, worst_px, Some(&*pool), &mut f);
            }
            None => side.iterate(is_bid, worst_px, None, &mut f),
        }
    }

    /// Best spilled price on one side, or the side's absent sentinel.
    pub fn best_px(&self, is_bid: bool) -> P {
        let side = self.side(is_bid);
        match self.pool.as_ref() {
            Some(rc) => side.best_px(is_bid, Some(&*rc.borrow())),
            None => side.best_px(is_bid, None),
        }
    }

    /// Quantity at the best spilled price, zero when the side is empty.
    pub fn best_qty(&self, is_bid: bool) -> Q {
        let side = self.side(is_bid);
        match self.pool.as_ref() {
            Some(rc) => side.best_qty(is_bid, Some(&*rc.borrow())),
            None => side.best_qty(is_bid, None),
        }
    }

    /// Number of spilled levels on one side.
    pub fn len(&self, is_bid: bool) -> usize {
        self.side(is_bid).len as usize
    }

    /// True when neither side holds a level.
    pub fn is_empty(&self) -> bool {
        self.bid.len == 0 && self.ask.len == 0
    }

    /// Forget all levels. Blocks are kept for reuse.
    pub fn clear(&mut self) {
        self.bid.len = 0;
        self.ask.len = 0;
    }

    /// Both sides sorted strictly ascending (no duplicate prices).
    pub fn verify_invariants(&self) -> bool {
        match self.pool.as_ref() {
            Some(rc) => {
                let pool = rc.borrow();
                self.bid.is_sorted_unique(Some(&*pool)) && self.ask.is_sorted_unique(Some(&*pool))
            }
            None => self.bid.is_sorted_unique(None) && self.ask.is_sorted_unique(None),
        }
    }
}

impl<P: Price, Q: Qty> Sink<P, Q> for SpillBuffer<P, Q> {
    #[inline]
    fn push(&mut self, is_bid: bool, px: P, q: Q) {
        SpillBuffer::push(self, is_bid, px, q);
    }

    #[inline]
    fn erase_better(&mut self, is_bid: bool, threshold: P) {
        SpillBuffer::erase_better(self, is_bid, threshold);
    }

    fn iterate_pending<F: FnMut(P, Q) -> bool>(&self, is_bid: bool, f: F) {
        let worst = if is_bid { P::MIN_PX } else { P::MAX_PX };
        let mut f = f;
        self.iterate(is_bid, worst, &mut f);
    }
}

impl<P: Price, Q: Qty> Drop for SpillBuffer<P, Q> {
    fn drop(&mut self) {
        if let Some(rc) = self.pool.take() {
            let mut pool = rc.borrow_mut();
            self.bid.release(Some(&mut *pool));
            self.ask.release(Some(&mut *pool));
        }
    }
}

impl<P: Price, Q: Qty> std::fmt::Debug for SpillBuffer<P, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("bid_levels", &self.bid.len)
            .field("ask_levels", &self.ask.len)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}
