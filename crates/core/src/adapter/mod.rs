//! Group adapters: the uniform contract behind which each governance domain sits.
//!
//! Every domain (connectivity, compliance, classification, rule sets, catalog,
//! scanning, access control) implements [`GroupAdapter`]. The coordinator only
//! ever talks to groups through this trait and looks them up in an
//! [`AdapterRegistry`] keyed by group id.

mod error;
mod http;
mod registry;
mod stub;
mod traits;
mod types;

pub use error::{AdapterError, RegistryError};
pub use http::HttpGroupAdapter;
pub use registry::{AdapterRegistry, BUILTIN_GROUPS};
pub use stub::StubAdapter;
pub use traits::GroupAdapter;
pub use types::{
    ExecuteRequest, ExecutionContext, GroupDescriptor, UndoOutcome, UndoRequest, UndoResponse,
};
