//! Hash map and set aliases for node, handle and key tables.
//!
//! Tables here are keyed by small integer ids or by scope keys whose hash is
//! cheap, so the Fx hasher is used unless the `std-hash` feature asks for
//! SipHash.

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}
