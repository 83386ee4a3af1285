//! Client side of the link to the backend service.

pub mod channel;
pub mod frames;
pub mod router;
pub mod transport;

pub use frames::{ClientFrame, ReplyFrame, RequestFrame, ServiceFrame};
pub use router::{sweep_task, PendingReply, RequestRouter};
pub use transport::{ConnectionState, TransportBinding};
