//! Boundary with the host accessory framework.
//!
//! The host owns accessory persistence, identity generation and the
//! process lifecycle. This module defines the calls the bridge makes into
//! the host ([`AccessoryHost`]) and the callbacks the host makes into the
//! bridge ([`PlatformPlugin`]), plus [`LocalHost`], an in-process host with
//! a JSON accessory cache used by the binaries and tests.

pub mod cache;
pub mod local;

pub use cache::{AccessoryCache, CacheEntry};
pub use local::LocalHost;

use crate::accessory::AccessoryHandle;
use crate::error::Result;
use crate::identity::IdentityToken;

/// Calls from the bridge into the host framework.
pub trait AccessoryHost: Send + Sync + 'static {
    /// Stable identity for a device key. Same key, same token, every run.
    fn generate_identity(&self, key: &str) -> IdentityToken {
        IdentityToken::generate(key)
    }

    /// Create a new, unregistered accessory.
    fn create_accessory(&self, display_name: &str, identity: IdentityToken) -> AccessoryHandle;

    /// Register new accessories. Registering an identity the host already
    /// knows is fatal and reported as [`crate::BridgeError::DuplicateIdentity`].
    fn register_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<AccessoryHandle>,
    ) -> Result<()>;

    /// Remove accessories from the host and its cache.
    fn unregister_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<AccessoryHandle>,
    ) -> Result<()>;
}

/// Callbacks from the host framework into the bridge.
///
/// The host first replays every cached accessory through
/// [`configure_accessory`](Self::configure_accessory), then signals
/// [`did_finish_launching`](Self::did_finish_launching) exactly once.
pub trait PlatformPlugin: Send + Sync {
    fn configure_accessory(&self, accessory: AccessoryHandle);

    fn did_finish_launching(&self) -> Result<()>;
}
