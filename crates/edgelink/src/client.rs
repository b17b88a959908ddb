use std::sync::Arc;

use edgelink_conn::{ConnConfig, ConnectionManager, RingReceiver, Signal};
use edgelink_transport::{endpoint, Endpoint};
use edgelink_wire::{MessageRecord, Receipt, PROTOCOL_VERSION};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::rest::{MessageQuery, RestClient, TimeFrameMessages};

/// Environment variable naming this workload (its publisher identity).
pub const ENV_IDENTITY: &str = "SELFNAME";
/// Environment variable selecting TLS for the REST surface.
pub const ENV_SSL: &str = "SSL";
/// Environment variable overriding the gateway host.
pub const ENV_HOST: &str = "GATEWAY_HOST";

/// Client facade over the gateway's socket channels and REST surface.
///
/// One client owns one [`ConnectionManager`]; opening a channel starts its
/// reconnect loop, and every record sent — over socket or HTTP — is
/// stamped with this client's identity as publisher.
pub struct GatewayClient {
    id: String,
    endpoint: Endpoint,
    rest: RestClient,
    conn: Arc<ConnectionManager>,
}

impl GatewayClient {
    /// Create a client for an explicit identity and endpoint.
    pub fn new(id: impl Into<String>, endpoint: Endpoint) -> Result<Self> {
        Self::with_config(id, endpoint, ConnConfig::default())
    }

    /// Create a client with explicit channel tuning.
    pub fn with_config(
        id: impl Into<String>,
        endpoint: Endpoint,
        config: ConnConfig,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ClientError::MissingIdentity("id must not be empty"));
        }
        let rest = RestClient::new(&id, &endpoint)?;
        let conn = ConnectionManager::new(endpoint.clone(), id.clone(), config);
        Ok(Self {
            id,
            endpoint,
            rest,
            conn,
        })
    }

    /// Bootstrap a client from the deployment environment.
    ///
    /// Reads the identity from `SELFNAME`, the TLS flag from `SSL`
    /// (empty or malformed means plain HTTP, with a warning), and an
    /// optional host override from `GATEWAY_HOST`; defaults to the local
    /// gateway at the standard port.
    pub fn from_env() -> Result<Self> {
        let id = std::env::var(ENV_IDENTITY).unwrap_or_default();
        if id.is_empty() {
            return Err(ClientError::MissingIdentity(
                "SELFNAME environment variable is not set",
            ));
        }

        let secure = match std::env::var(ENV_SSL) {
            Ok(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
                warn!(value = %raw, "malformed SSL environment variable; assuming plain http");
                false
            }),
            Err(_) => false,
        };

        let host = std::env::var(ENV_HOST)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| endpoint::DEFAULT_HOST.to_string());

        Self::new(id, Endpoint::new(host, endpoint::DEFAULT_PORT, secure))
    }

    /// This workload's identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The gateway endpoint this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start the control channel; yields one token per gateway signal.
    pub fn open_control_channel(&self) -> Result<RingReceiver<Signal>> {
        Ok(self.conn.open_control_channel()?)
    }

    /// Start the data channel; yields inbound records and delivery receipts.
    pub fn open_data_channel(
        &self,
    ) -> Result<(RingReceiver<MessageRecord>, RingReceiver<Receipt>)> {
        Ok(self.conn.open_data_channel()?)
    }

    /// Submit a record on the data channel socket.
    pub fn send_message(&self, record: MessageRecord) -> Result<()> {
        Ok(self.conn.send(record)?)
    }

    /// Fetch this workload's configuration as a raw JSON value.
    pub fn config_value(&self) -> Result<serde_json::Value> {
        self.rest.config_value()
    }

    /// Fetch this workload's configuration into a typed shape.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.config_value()?)?)
    }

    /// Pull the next batch of messages addressed to this workload.
    pub fn next_messages(&self) -> Result<Vec<MessageRecord>> {
        self.rest.next_messages()
    }

    /// Submit a record over HTTP and return the gateway's receipt.
    pub fn post_message(&self, record: MessageRecord) -> Result<Receipt> {
        let mut record = record;
        record.publisher = self.id.clone();
        if record.version == 0 {
            record.version = PROTOCOL_VERSION;
        }
        self.rest.post_message(&record)
    }

    /// Query messages from specific publishers within a time frame.
    pub fn query_messages(&self, query: MessageQuery) -> Result<TimeFrameMessages> {
        let mut query = query;
        query.id = self.id.clone();
        self.rest.query_messages(&query)
    }

    /// Count of inbound frames dropped for carrying an unknown type byte.
    pub fn unknown_frames(&self) -> u64 {
        self.conn.unknown_frames()
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_is_rejected() {
        let result = GatewayClient::new("", Endpoint::localhost());
        assert!(matches!(result, Err(ClientError::MissingIdentity(_))));
    }

    #[test]
    fn client_exposes_identity_and_endpoint() {
        let client = GatewayClient::new("agentA", Endpoint::localhost()).unwrap();
        assert_eq!(client.id(), "agentA");
        assert_eq!(client.endpoint().port, endpoint::DEFAULT_PORT);
    }

    // All environment scenarios live in one test: the variables are
    // process-global and tests run in parallel.
    #[test]
    fn from_env_bootstrap() {
        std::env::remove_var(ENV_IDENTITY);
        std::env::remove_var(ENV_SSL);
        std::env::remove_var(ENV_HOST);
        assert!(matches!(
            GatewayClient::from_env(),
            Err(ClientError::MissingIdentity(_))
        ));

        std::env::set_var(ENV_IDENTITY, "agentA");
        let client = GatewayClient::from_env().unwrap();
        assert_eq!(client.id(), "agentA");
        assert_eq!(client.endpoint().host, endpoint::DEFAULT_HOST);
        assert!(!client.endpoint().secure);

        std::env::set_var(ENV_SSL, "true");
        std::env::set_var(ENV_HOST, "gateway.internal");
        let client = GatewayClient::from_env().unwrap();
        assert!(client.endpoint().secure);
        assert_eq!(client.endpoint().host, "gateway.internal");

        // Malformed SSL falls back to plain http.
        std::env::set_var(ENV_SSL, "maybe");
        let client = GatewayClient::from_env().unwrap();
        assert!(!client.endpoint().secure);

        std::env::remove_var(ENV_IDENTITY);
        std::env::remove_var(ENV_SSL);
        std::env::remove_var(ENV_HOST);
    }
}
