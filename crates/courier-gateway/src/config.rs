use std::time::Duration;

use courier_types::codec::DEFAULT_MAX_FRAME_SIZE;

/// Capacity of each connection's outbound queue, in frames.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// How long a router waits for room in a full outbound queue before giving up
/// on that destination.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for the relay gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub outbound_capacity: usize,
    pub send_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
            send_timeout: SEND_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
