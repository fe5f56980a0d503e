//! linkbeam-core: shared types, configuration, identity and the discovery wire format.
//! All other LinkBeam crates depend on this one.

pub mod config;
pub mod identity;
pub mod peer;
pub mod wire;

pub use identity::LocalDevice;
pub use peer::Peer;
pub use wire::{AnnounceError, Announcement, AnnouncementKind};
