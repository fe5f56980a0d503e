//! linkbeam-services: runtime state of a node. Presence, event fan-out,
//! the received-file catalog and both directions of file transfer.

pub mod catalog;
pub mod notifier;
pub mod presence;
pub mod receiver;
pub mod sender;

pub use catalog::{sanitize_filename, CatalogError, FileCatalog, StoredFile};
pub use notifier::{ClientMessage, EventFeed, ServerEvent};
pub use presence::{DiscoveryStats, PresenceEvent, PresenceStore, UpsertOutcome};
pub use receiver::{FileReceiver, IncomingFile, ReceiveError, UploadReceipt};
pub use sender::{
    AbortOutcome, TransferError, TransferManager, TransferSession, TransferState, TransferStatus,
};
