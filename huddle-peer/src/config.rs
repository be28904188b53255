use crate::media::MediaConstraints;
use crate::transport::TransportConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub transport: TransportConfig,
    pub media: MediaConstraints,
    /// How long a peer may go without inbound signaling progress before it
    /// reaches `Connected`. Exceeding it fails that peer.
    pub negotiation_timeout: Duration,
    /// Upper bound for closing peer links during leave.
    pub close_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            media: MediaConstraints::default(),
            negotiation_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}
