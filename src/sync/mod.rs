//! Library to document store synchronization.
//!
//! The collection listing is rebuilt into a tree, a session with the document
//! store is established, and the tree is walked concurrently. Each leaf
//! collection's attachments are packaged and uploaded into a destination path
//! mirroring the collection hierarchy.

mod report;
mod session;
mod traversal;
mod tree;
mod types;

pub use report::*;
pub use session::establish_session;
pub use traversal::{RetryPolicy, SyncConfig, SyncLimits, SyncTraversal};
pub use tree::CollectionTree;
pub use types::*;
