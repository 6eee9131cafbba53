//! Room registry for four-seat Dehla Pakad tables.
//!
//! [`SessionRegistry`] owns every live room and serializes transitions per
//! room; committed changes fan out to transports through the [`EventBus`].

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod registry;

pub use config::{ConfigError, RegistryConfig};
pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription, RoomEvent};
pub use logging::{init_logging, RoomLogCapture, RoomLogLine};
pub use registry::{
    PlayResult, PlayerInfo, Room, RoomId, RoomSnapshot, SessionError, SessionRegistry,
};
