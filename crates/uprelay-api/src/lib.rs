// uprelay-api: Socket.IO client for an uptime monitoring backend.

pub mod backoff;
pub mod codec;
pub mod command;
pub mod error;
pub mod event;
pub mod session;
pub mod upstream;

pub use backoff::ReconnectPolicy;
pub use codec::{DecodedEvent, Frame};
pub use command::UpstreamCommand;
pub use error::Error;
pub use event::{EntityId, MonitorId, UpstreamEvent};
pub use session::{ConnectionState, Credentials, Session, SessionAction};
pub use upstream::{LinkStatus, UpstreamConfig, UpstreamHandle, UpstreamHandler};
