//! The adaptive radix trie index over 16-byte `(source, destination)` keys
//!, and the key type it is keyed on.

/// 16-byte `(source, destination)` key, ordered lexicographically.
pub mod key;

/// Adaptive Radix Trie: N4/N16/N48/N256 node kinds, insert/remove/
/// find_exact/find_less_or_equal.
pub mod art;

pub use art::{ArtIndex, IndexEntry};
pub use key::Key;
