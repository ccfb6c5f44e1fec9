//! Matching Engine
//!
//! In-memory order matching under strict price/time priority: per-symbol
//! books partitioned behind their own locks, heap-backed best-price access,
//! and a totally-ordered lifecycle event stream emitted through the
//! publisher.
//!
//! **Key invariants:**
//! - Price priority strictly dominates time priority
//! - A level's volume equals the sum of its resting quantities
//! - A submit either completes fully under the book lock or rejects before
//!   touching the book

pub mod book;
pub mod engine;

pub use engine::{MatchingEngine, SubmitOutcome, TopOfBook};
