//! # Flash-Tape
//!
//! A two-sided price-level order book built around a bounded dense
//! price tape, for market-making and signal-generation hot paths.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns each book exclusively (no locks)
//! - **O(1) Near-Anchor Updates**: level writes near the top of book are
//!   an array store plus a bitmap bit
//! - **Bounded Everything**: fixed window per side, capped spill depth,
//!   arena-backed overflow - no heap churn on the fast path
//! - **Thousands of Books**: books share one spill arena, so a whole
//!   symbol universe fits in one process
//!
//! ## Architecture
//!
//! ```text
//! set(side, px, qty)
//!        |
//!        v
//!   [Tape (dense window + bitmap)] --in-window--> Insert/Update/Erase
//!        |                 ^
//!        | out-of-window   | recenter + drain
//!        v                 |
//!   [SpillBuffer (sorted)] / <--- blocks ---- [SpillPool (arena)]
//! ```
//!
//! A price outside the tape window lands in the spill store; a price
//! *better* than the current best re-centers the window around it and
//! pulls newly covered spill levels back in. Best-price queries combine
//! the tape's cached best with the spill's edge element.

pub mod book;
pub mod multi_book;
pub mod spill;
pub mod spill_pool;
pub mod tape;
pub mod types;

// Re-exports for convenience
pub use book::{Book, BookOps};
pub use multi_book::{BookHandle, BookTier, MultiBookPool};
pub use spill::{NullSink, Sink, SpillBuffer};
pub use spill_pool::{SpillPool, MIN_BLOCK, NUM_CLASSES};
pub use tape::Tape;
pub use types::{Level, Price, Qty, Side, UpdateResult};
