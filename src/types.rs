//! Shared types: sides, update outcomes, levels, and the integer
//! price/quantity traits the whole crate is generic over.

use std::fmt::Debug;

/// Order book side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids). Larger prices are better.
    Bid = 0,
    /// Sell side (asks). Smaller prices are better.
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// True for [`Side::Bid`].
    #[inline]
    pub const fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }
}

/// Outcome of a single `set(price, qty)` applied to a tape or a book.
///
/// The numeric encoding is stable (`Spill = -2` .. `Promote = +2`) but
/// consumers should switch on the variant. `Promote` is internal to the
/// tape/book handshake: a book never returns it — it re-centers the tape
/// and retries, surfacing the terminal result instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i8)]
pub enum UpdateResult {
    /// The level was routed to the spill store (or dropped at capacity).
    Spill = -2,
    /// A level was removed (or a cancel hit an already-empty cell).
    Erase = -1,
    /// An existing level's quantity was overwritten.
    Update = 0,
    /// A new level appeared.
    Insert = 1,
    /// The price cannot be represented at the current anchor; the
    /// caller must re-center the tape and retry.
    Promote = 2,
}

/// A single price level. Quantity zero encodes absence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Level<P, Q> {
    /// Level price.
    pub px: P,
    /// Resting quantity at `px`.
    pub qty: Q,
}

/// Fixed-width signed integer price.
///
/// `MIN_PX` doubles as the "no bid" sentinel and `MAX_PX` as "no ask",
/// chosen so that `max` over bid candidates and `min` over ask
/// candidates naturally discard an absent side.
///
/// Index and anchor arithmetic widens through `to_i64`, so implementors
/// must be at most 32 bits wide.
pub trait Price: Copy + Ord + Eq + Debug {
    /// Smallest representable price; the "no bid" sentinel.
    const MIN_PX: Self;
    /// Largest representable price; the "no ask" sentinel.
    const MAX_PX: Self;

    /// Lossless widening for index arithmetic.
    fn to_i64(self) -> i64;

    /// Inverse of [`Price::to_i64`]. Callers guarantee `v` is in range.
    fn from_i64(v: i64) -> Self;
}

/// Fixed-width unsigned quantity. Zero encodes "no level".
pub trait Qty: Copy + Eq + Debug {
    /// The absent-level quantity.
    const ZERO: Self;

    /// True iff this quantity encodes absence.
    #[inline]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

macro_rules! impl_price {
    ($($t:ty),*) => {$(
        impl Price for $t {
            const MIN_PX: Self = <$t>::MIN;
            const MAX_PX: Self = <$t>::MAX;

            #[inline]
            fn to_i64(self) -> i64 {
                i64::from(self)
            }

            #[inline]
            fn from_i64(v: i64) -> Self {
                debug_assert!(
                    v >= i64::from(<$t>::MIN) && v <= i64::from(<$t>::MAX),
                    "price out of range"
                );
                v as $t
            }
        }
    )*};
}

macro_rules! impl_qty {
    ($($t:ty),*) => {$(
        impl Qty for $t {
            const ZERO: Self = 0;
        }
    )*};
}

impl_price!(i16, i32);
impl_qty!(u16, u32, u64);
