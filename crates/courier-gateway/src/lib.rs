/// Courier relay gateway: accepts TCP clients and relays JSON envelopes
/// between them.
///
/// - Supervisor: accept loop, per-connection read loop, shutdown drain
/// - Registry: client id -> connection, scoped to the registering connection
/// - Router: direct delivery and broadcast fan-out, sender excluded
/// - Connection: bounded outbound queue drained by one writer task

pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod router;
pub mod supervisor;

pub use config::{GatewayConfig, OUTBOUND_QUEUE_CAPACITY, SEND_TIMEOUT};
pub use connection::ConnectionHandle;
pub use error::{DeliveryError, GatewayError, RegistryError, RouteError};
pub use registry::{RegisteredClient, Registry};
pub use router::{Delivery, Router};
pub use supervisor::Supervisor;
