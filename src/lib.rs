pub mod error;
pub mod formats;
pub mod fs_tree;
pub mod identify;
pub mod materialize;
pub mod notifier;
pub mod pack;
pub mod process;
pub mod resource;
pub mod signature;
pub mod tool;
pub mod transcoder;
pub mod unpack;

// Re-exports for easy access
pub use error::{Error, Result};
pub use fs_tree::{EntryKind, FsEntry, FsTree, SpecialFile};
pub use identify::{Identifier, ListingIdentifier};
pub use materialize::{FlushReport, SpecialEntryPolicy};
pub use notifier::Notifier;
pub use pack::{PackConfig, Packer};
pub use resource::{Authority, ContainerResource, ResourceTag};
pub use signature::SignatureRegistry;
pub use tool::{ExternalTool, ToolAvailability};
pub use transcoder::Transcoder;
pub use unpack::Unpacker;
