//! # Application Cache (C2) and Server-Listener Cache (C3)
//!
//! Two independent concurrent caches that `xds::SnapshotCache` (C6)
//! consults before every rebuild. Locking follows the fixed acquisition
//! order from §5: `ApplicationCache` → delegate, `ServerListenerCache` →
//! delegate — callers must never acquire the delegate's lock before
//! either of these.

mod application;
mod server_listener;

pub use application::ApplicationCache;
pub use server_listener::ServerListenerCache;
