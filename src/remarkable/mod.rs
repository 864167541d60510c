//! reMarkable cloud integration.
//!
//! Covers the credential lifecycle (device registration, single-use token
//! rotation, storage host discovery), packaging of files into the document
//! store's container format, and the three-phase upload protocol. All network
//! traffic goes through the `CloudTransport` seam.

/// Document container construction
mod package;
/// Bearer token acquisition, rotation and host discovery
mod token;
/// HTTP transport abstraction and its reqwest implementation
mod transport;
/// Wire types and error definitions
mod types;
/// Slot request, blob upload and metadata commit
mod upload;

pub use package::{DocumentPackager, PackagedDocument};
pub use token::{CloudEndpoints, TokenLifecycle, TokenState};
pub use transport::ReqwestTransport;
#[cfg(test)]
pub use transport::{CloudRequest, CloudResponse, CloudTransport};
pub use types::*;
pub use upload::UploadProtocol;
