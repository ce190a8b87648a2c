//! Identity-stable wrappers for host-owned objects.
//!
//! The host creates and destroys its objects on its own schedule. Extensions see them through
//! [`Proxy`] values handed out by a [`ProxyCache`], which guarantees one wrapper per live host
//! object so that wrapper identity can be used as a key.
//!
//! - [`cache`] - [`HostObject`], [`ProxyKind`], [`Proxy`] and [`ProxyCache`]
//! - [`item`] - The inventory item variant set, [`ItemKind`]
//!
//! # Examples
//!
//! ```rust
//! use hookscope::proxy::{HostCategory, HostHandle, HostObject, ItemCache, ItemKind};
//! use std::sync::Arc;
//!
//! struct Radio;
//!
//! impl HostObject for Radio {
//!     fn category(&self) -> HostCategory {
//!         HostCategory::new("InventorySystem.Items.Radio.RadioItem")
//!     }
//! }
//!
//! let cache = ItemCache::new();
//! let handle: HostHandle = Arc::new(Radio);
//!
//! let proxy = cache.get_or_create(&handle);
//! assert_eq!(*proxy.kind(), ItemKind::Radio);
//! assert!(Arc::ptr_eq(&proxy, &cache.get_or_create(&handle)));
//! ```

pub mod cache;
pub mod item;

pub use cache::{HostCategory, HostHandle, HostObject, Proxy, ProxyCache, ProxyKind};
pub use item::{ItemCache, ItemKind, ItemProxy, ProjectileKind, ITEM_TABLE};
