//! Cross-cutting helpers.

pub mod pool;

pub use pool::{ListPool, MapPool, ObjectPool, Poolable, Pooled};
