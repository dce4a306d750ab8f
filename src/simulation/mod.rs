pub mod activity;
pub mod interaction;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use activity::Activity;
pub use interaction::{resolve, Resolution, Spawner};
pub use session::Session;
pub use snapshot::{Envelope, SessionInfo};
pub use transport::{ChannelTransport, LogTransport, Transport};
