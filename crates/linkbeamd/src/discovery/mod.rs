//! LAN discovery: UDP broadcast announcements in, Presence Store updates out.
//!
//! Three independent tasks share one `PresenceStore`: the broadcaster
//! announces this node every interval, the listener upserts whatever it
//! hears, and the expiry sweep forgets peers that went quiet.

pub mod broadcast;
pub mod listener;
