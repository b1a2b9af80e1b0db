//! # hyperminhash
//!
//! A [`Sketch`] is a fixed-size probabilistic data structure that
//! estimates both the cardinality of a multiset and its Jaccard
//! similarity/intersection against another sketch of the same shape, by
//! fusing a HyperLogLog register array with a b-bit k-partition MinHash
//! over the same buckets.
//!
//! ```
//! use hyperminhash::{CollisionMode, Sketch};
//!
//! let mut a = Sketch::new(8, 6, 8, CollisionMode::Approx).unwrap();
//! a.update_all(0..10_000);
//!
//! let bytes = a.serialize();
//! let restored = Sketch::deserialize(&bytes).unwrap();
//! assert_eq!(a, restored);
//! ```
//!
//! See [`Sketch`] for the full operation set, and [`CollisionMode`] for the
//! three collision-correction strategies `jaccard`/`intersection` can use.

mod codec;
mod collision;
mod common;
mod sketch;

pub use collision::CollisionMode;
pub use common::{Result, SketchError};
pub use sketch::Sketch;
