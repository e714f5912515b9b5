//! Book - two anchored tapes plus one spill store.
//!
//! Owns the control flow that keeps the best price correct no matter
//! where an update lands: in-window updates hit the tape directly,
//! out-of-window updates go to the spill, and a strictly-better
//! out-of-window price triggers re-center / drain / retry so the level
//! ends up in the tape.

use crate::spill::{NullSink, SpillBuffer};
use crate::spill_pool::SpillPool;
use crate::tape::Tape;
use crate::types::{Price, Qty, Side, UpdateResult};

use std::cell::RefCell;
use std::rc::Rc;

/// `px - offset`, clamped so the resulting anchor stays valid.
fn compute_anchor<P: Price, const N: usize>(px: P, offset: i64) -> P {
    let min_px = P::MIN_PX.to_i64();
    let max_anchor = P::MAX_PX.to_i64() - (N as i64 - 1);
    if px.to_i64() < min_px + offset {
        return P::from_i64(min_px + (N as i64 - 1));
    }
    let a = px.to_i64() - offset;
    if a > max_anchor {
        P::from_i64(max_anchor)
    } else {
        P::from_i64(a)
    }
}

/// The promote path: re-anchor `tape` so `px` sits near mid-window,
/// drain newly covered spill levels back in, then retry the update.
fn set_on<P: Price, Q: Qty, const N: usize, const IS_BID: bool>(
    tape: &mut Tape<P, Q, N, IS_BID>,
    spill: &mut SpillBuffer<P, Q>,
    px: P,
    q: Q,
) -> UpdateResult {
    let rc = tape.set_qty(px, q, spill);
    if rc != UpdateResult::Promote {
        return rc;
    }

    let mut anchor = compute_anchor::<P, N>(px, (N / 2) as i64);
    let floor = compute_anchor::<P, N>(px, N as i64 - 1);
    if anchor < floor {
        anchor = floor;
    }
    if anchor > px {
        anchor = px;
    }
    let min_a = Tape::<P, Q, N, IS_BID>::min_valid_anchor();
    let max_a = Tape::<P, Q, N, IS_BID>::max_valid_anchor();
    if anchor < min_a {
        anchor = min_a;
    }
    if anchor > max_a {
        anchor = max_a;
    }

    tape.recenter_to_anchor(anchor, spill);

    let lo = tape.anchor();
    let hi = P::from_i64(lo.to_i64() + (N as i64 - 1));
    spill.drain(IS_BID, lo, hi, |p, dq| {
        let _ = tape.set_qty(p, dq, &mut NullSink);
    });

    let rc = tape.set_qty(px, q, &mut NullSink);
    if rc == UpdateResult::Promote {
        // Inside the N-1 guard band at the representable edge no valid
        // anchor can cover px; the level lives in the spill instead.
        spill.push(IS_BID, px, q);
        return UpdateResult::Spill;
    }
    rc
}

/// Two-sided price-level book over a dense tape window of `N` prices
/// per side.
///
/// Move-only: there is no `Clone`. Books sharing a [`SpillPool`] return
/// their blocks on drop while the pool is still alive (the `Rc` keeps
/// it so).
pub struct Book<P: Price, Q: Qty, const N: usize> {
    bids: Tape<P, Q, N, true>,
    asks: Tape<P, Q, N, false>,
    spill: SpillBuffer<P, Q>,
}

impl<P: Price, Q: Qty, const N: usize> Book<P, Q, N> {
    /// Create a book anchored at price 0 with the given per-side spill
    /// ceiling, optionally backed by a shared pool. Call
    /// [`Book::reset`] to place the window before use.
    ///
    /// # Panics
    /// Panics if `N` violates the tape contract, `max_spill_cap` is not
    /// a power of two >= 1, or 0 is not a valid anchor for `P`/`N`.
    pub fn new(max_spill_cap: u32, pool: Option<Rc<RefCell<SpillPool<P, Q>>>>) -> Self {
        let anchor = P::from_i64(0);
        Self {
            bids: Tape::new(anchor),
            asks: Tape::new(anchor),
            spill: SpillBuffer::new(max_spill_cap, pool),
        }
    }

    /// Width of each side's window, in price ticks.
    #[inline]
    pub const fn window_size() -> usize {
        N
    }

    /// Clear everything and anchor both tapes at `anchor`.
    pub fn reset(&mut self, anchor: P) {
        self.bids.reset(anchor);
        self.asks.reset(anchor);
        self.spill.clear();
    }

    /// Re-anchor one side so `mid` sits near the middle of its window.
    /// The side is cleared; the spill is left alone.
    pub fn reset_at_mid(&mut self, side: Side, mid: P) {
        let anchor = compute_anchor::<P, N>(mid, (N / 2) as i64);
        match side {
            Side::Bid => self.bids.reset(anchor),
            Side::Ask => self.asks.reset(anchor),
        }
    }

    /// `px - offset` clamped into the valid anchor range for this
    /// book's window size.
    #[inline]
    pub fn compute_anchor(px: P, offset: i64) -> P {
        compute_anchor::<P, N>(px, offset)
    }

    /// Apply `(side, px, q)`; `q == 0` removes the level.
    ///
    /// Never returns [`UpdateResult::Promote`]: promotion is resolved
    /// internally by re-centering and retrying.
    #[inline]
    pub fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult {
        match side {
            Side::Bid => self.set_bid(px, q),
            Side::Ask => self.set_ask(px, q),
        }
    }

    /// [`Book::set`] for the bid side.
    #[inline]
    pub fn set_bid(&mut self, px: P, q: Q) -> UpdateResult {
        set_on(&mut self.bids, &mut self.spill, px, q)
    }

    /// [`Book::set`] for the ask side.
    #[inline]
    pub fn set_ask(&mut self, px: P, q: Q) -> UpdateResult {
        set_on(&mut self.asks, &mut self.spill, px, q)
    }

    /// Drop all bid levels at or above `px`, tape and spill.
    pub fn erase_better_bid(&mut self, px: P) {
        self.bids.erase_better(px, &mut self.spill);
    }

    /// Drop all ask levels at or below `px`, tape and spill.
    pub fn erase_better_ask(&mut self, px: P) {
        self.asks.erase_better(px, &mut self.spill);
    }

    /// Move the bid window to `new_anchor`, then pull newly covered
    /// spill levels back into the tape.
    pub fn recenter_bid(&mut self, new_anchor: P) {
        self.bids.recenter_to_anchor(new_anchor, &mut self.spill);
        let lo = self.bids.anchor();
        let hi = P::from_i64(lo.to_i64() + (N as i64 - 1));
        let bids = &mut self.bids;
        self.spill.drain(true, lo, hi, |px, q| {
            let _ = bids.set_qty(px, q, &mut NullSink);
        });
    }

    /// Move the ask window to `new_anchor`, then pull newly covered
    /// spill levels back into the tape.
    pub fn recenter_ask(&mut self, new_anchor: P) {
        self.asks.recenter_to_anchor(new_anchor, &mut self.spill);
        let lo = self.asks.anchor();
        let hi = P::from_i64(lo.to_i64() + (N as i64 - 1));
        let asks = &mut self.asks;
        self.spill.drain(false, lo, hi, |px, q| {
            let _ = asks.set_qty(px, q, &mut NullSink);
        });
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Best bid across tape and spill, or `P::MIN_PX` when absent.
    #[inline]
    pub fn best_bid_px(&self) -> P {
        self.bids.best_px().max(self.spill.best_px(true))
    }

    /// Best ask across tape and spill, or `P::MAX_PX` when absent.
    #[inline]
    pub fn best_ask_px(&self) -> P {
        self.asks.best_px().min(self.spill.best_px(false))
    }

    /// Quantity at the best bid. The tape wins a price tie: after any
    /// completed `set`, in-window prices live only in the tape.
    #[inline]
    pub fn best_bid_qty(&self) -> Q {
        if self.bids.best_px() >= self.spill.best_px(true) {
            self.bids.best_qty()
        } else {
            self.spill.best_qty(true)
        }
    }

    /// Quantity at the best ask; tape wins a price tie.
    #[inline]
    pub fn best_ask_qty(&self) -> Q {
        if self.asks.best_px() <= self.spill.best_px(false) {
            self.asks.best_qty()
        } else {
            self.spill.best_qty(false)
        }
    }

    /// Current bid window anchor.
    #[inline]
    pub fn bid_anchor(&self) -> P {
        self.bids.anchor()
    }

    /// Current ask window anchor.
    #[inline]
    pub fn ask_anchor(&self) -> P {
        self.asks.anchor()
    }

    /// Free bid cells below the best before the window edge.
    #[inline]
    pub fn bid_headroom(&self, guard: usize) -> usize {
        self.bids.headroom_dn(guard)
    }

    /// Free ask cells above the best before the window edge.
    #[inline]
    pub fn ask_headroom(&self, guard: usize) -> usize {
        self.asks.headroom_up(guard)
    }

    /// Best bid meets or crosses best ask, considering tapes only.
    #[inline]
    pub fn crossed_on_tape(&self) -> bool {
        let b = self.bids.best_px();
        let a = self.asks.best_px();
        b != P::MIN_PX && a != P::MAX_PX && b >= a
    }

    /// Best bid meets or crosses best ask over the whole book.
    #[inline]
    pub fn crossed(&self) -> bool {
        let b = self.best_bid_px();
        let a = self.best_ask_px();
        b != P::MIN_PX && a != P::MAX_PX && b >= a
    }

    /// Visit bid levels best-first within the tape, then the spilled
    /// bid levels. Not globally sorted when spill prices interleave
    /// with in-window gaps.
    pub fn for_each_bid(&self, f: impl FnMut(P, Q) -> bool) {
        self.bids.iterate_from_best(f, &self.spill);
    }

    /// Ask-side counterpart of [`Book::for_each_bid`].
    pub fn for_each_ask(&self, f: impl FnMut(P, Q) -> bool) {
        self.asks.iterate_from_best(f, &self.spill);
    }

    /// Structural invariants of both tapes and the spill. Debug/fuzz
    /// aid, not for the hot path.
    pub fn verify_invariants(&self) -> bool {
        self.bids.verify_invariants()
            && self.asks.verify_invariants()
            && self.spill.verify_invariants()
    }
}

impl<P: Price, Q: Qty, const N: usize> std::fmt::Debug for Book<P, Q, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("window", &N)
            .field("bid_anchor", &self.bids.anchor())
            .field("ask_anchor", &self.asks.anchor())
            .field("best_bid_px", &self.best_bid_px())
            .field("best_ask_px", &self.best_ask_px())
            .finish()
    }
}

/// Object-safe view of a book, independent of its window size.
///
/// The multi-book pool dispatches through this so one call site can
/// address books of all three tiers.
pub trait BookOps<P: Price, Q: Qty> {
    /// See [`Book::reset`].
    fn reset(&mut self, anchor: P);
    /// See [`Book::reset_at_mid`].
    fn reset_at_mid(&mut self, side: Side, mid: P);
    /// See [`Book::set`].
    fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult;
    /// See [`Book::erase_better_bid`].
    fn erase_better_bid(&mut self, px: P);
    /// See [`Book::erase_better_ask`].
    fn erase_better_ask(&mut self, px: P);
    /// See [`Book::recenter_bid`].
    fn recenter_bid(&mut self, anchor: P);
    /// See [`Book::recenter_ask`].
    fn recenter_ask(&mut self, anchor: P);
    /// See [`Book::best_bid_px`].
    fn best_bid_px(&self) -> P;
    /// See [`Book::best_ask_px`].
    fn best_ask_px(&self) -> P;
    /// See [`Book::best_bid_qty`].
    fn best_bid_qty(&self) -> Q;
    /// See [`Book::best_ask_qty`].
    fn best_ask_qty(&self) -> Q;
    /// See [`Book::crossed`].
    fn crossed(&self) -> bool;
    /// See [`Book::crossed_on_tape`].
    fn crossed_on_tape(&self) -> bool;
    /// See [`Book::window_size`].
    fn window_size(&self) -> usize;
    /// See [`Book::verify_invariants`].
    fn verify_invariants(&self) -> bool;
}

impl<P: Price, Q: Qty, const N: usize> BookOps<P, Q> for Book<P, Q, N> {
    fn reset(&mut self, anchor: P) {
        Book::reset(self, anchor);
    }
    fn reset_at_mid(&mut self, side: Side, mid: P) {
        Book::reset_at_mid(self, side, mid);
    }
    fn set(&mut self, side: Side, px: P, q: Q) -> UpdateResult {
        Book::set(self, side, px, q)
    }
    fn erase_better_bid(&mut self, px: P) {
        Book::erase_better_bid(self, px);
    }
    fn erase_better_ask(&mut self, px: P) {
        Book::erase_better_ask(self, px);
    }
    fn recenter_bid(&mut self, anchor: P) {
        Book::recenter_bid(self, anchor);
    }
    fn recenter_ask(&mut self, anchor: P) {
        Book::recenter_ask(self, anchor);
    }
    fn best_bid_px(&self) -> P {
        Book::best_bid_px(self)
    }
    fn best_ask_px(&self) -> P {
        Book::best_ask_px(self)
    }
    fn best_bid_qty(&self) -> Q {
        Book::best_bid_qty(self)
    }
    fn best_ask_qty(&self) -> Q {
        Book::best_ask_qty(self)
    }
    fn crossed(&self) -> bool {
        Book::crossed(self)
    }
    fn crossed_on_tape(&self) -> bool {
        Book::crossed_on_tape(self)
    }
    fn window_size(&self) -> usize {
        N
    }
    fn verify_invariants(&self) -> bool {
        Book::verify_invariants(self)
    }
}
