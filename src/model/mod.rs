//! Core data model.
//!
//! A [`Key`] names a watched object; a [`Pod`] is the object itself.
//! Anything the cache can hold implements [`Resource`].

pub mod key;
pub mod pod;

pub use key::Key;
pub use pod::{ContainerState, ContainerStateWaiting, ContainerStatus, ObjectMeta, Pod, PodStatus};

use crate::error::Result;

/// An object that can live in the watch cache.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Canonical identity. Fails for objects without a usable name.
    fn key(&self) -> Result<Key>;

    /// Opaque version assigned by the API server, used to resume watches.
    fn resource_version(&self) -> Option<&str>;
}
