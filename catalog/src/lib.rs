//! Client side of the remote bibliographic catalog.
//!
//! The rest of the service only sees [`CatalogGateway`]: fetch an edition,
//! write it back. [`OpenLibraryClient`] is the production implementation,
//! layered over an [`HttpTransport`] so tests can swap the network out.

mod edition;
mod error;
mod gateway;
mod open_library;
mod transport;

pub use edition::EditionRecord;
pub use edition::archive_annotation;
pub use error::CatalogError;
pub use error::TransportError;
pub use gateway::CatalogGateway;
pub use open_library::Credentials;
pub use open_library::DEFAULT_EDIT_COMMENT;
pub use open_library::OpenLibraryClient;
pub use transport::HttpTransport;
pub use transport::ReqwestTransport;
pub use transport::Request;
pub use transport::Response;
