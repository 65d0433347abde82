pub mod cache;
pub mod context;
pub mod export;
pub mod filter;
pub mod transfer;

pub use cache::{DirectorySelection, ListingCache, Snapshot};
pub use context::SessionContext;
pub use export::{export_rows, write_rows};
pub use filter::filter;
pub use transfer::{
    CancelHandle, DestinationResolver, FolderResolver, ItemOutcome, ItemReport, LocalFile,
    TransferCoordinator, TransferKind, TransferProgress, TransferReport,
};
