mod error;
mod request;
mod requester;
mod shutdown;

pub mod prelude {
    pub use crate::error::{DiscoveryFailure, PatternAnalysisFailure, RequestFailure};
    pub use crate::request::{RequestDescriptor, Transport};
    pub use crate::requester::{Requester, Response};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
