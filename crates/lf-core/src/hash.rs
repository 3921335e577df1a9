//! Fast hash map and hash set type aliases.
//!
//! Limiters key their bookkeeping by absolute path and the registry keys
//! watches by directory. Neither map is exposed to untrusted input in a way
//! that makes hash flooding a concern, so the Fx hash from `rustc-hash` is
//! used instead of SipHash.

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;
