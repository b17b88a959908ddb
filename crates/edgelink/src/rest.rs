//! REST surface of the gateway: configuration fetch, bulk message pulls,
//! message submission, and publisher/time-frame queries.
//!
//! Every call is a plain POST with a JSON body. The gateway answers
//! rejections with a non-success status and a human-readable body, which
//! surfaces as [`ClientError::Rejected`].

use edgelink_transport::Endpoint;
use edgelink_wire::{MessageRecord, Receipt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};

pub const URL_GET_CONFIG: &str = "/v2/config/get";
pub const URL_GET_NEXT_MESSAGES: &str = "/v2/messages/next";
pub const URL_GET_PUBLISHERS_MESSAGES: &str = "/v2/messages/query";
pub const URL_POST_MESSAGE: &str = "/v2/messages/new";

/// Selects messages from a set of publishers within a time frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageQuery {
    /// Caller identity; stamped by the client before dispatch.
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "timeframestart")]
    pub time_frame_start: u64,
    #[serde(rename = "timeframeend")]
    pub time_frame_end: u64,
    pub publishers: Vec<String>,
}

/// A page of messages bounded by the gateway's actual time frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeFrameMessages {
    #[serde(rename = "timeframestart", default)]
    pub time_frame_start: u64,
    #[serde(rename = "timeframeend", default)]
    pub time_frame_end: u64,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

#[derive(Deserialize)]
struct ConfigResponse {
    config: String,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    timestamp: u64,
}

/// Blocking HTTP client with the gateway URL table precomputed.
pub(crate) struct RestClient {
    http: reqwest::blocking::Client,
    url_get_config: String,
    url_get_next_messages: String,
    url_query_messages: String,
    url_post_message: String,
    id_body: serde_json::Value,
}

impl RestClient {
    pub(crate) fn new(id: &str, endpoint: &Endpoint) -> Result<Self> {
        let base = endpoint.rest_base_url();
        Ok(Self {
            http: reqwest::blocking::Client::builder().build()?,
            url_get_config: format!("{base}{URL_GET_CONFIG}"),
            url_get_next_messages: format!("{base}{URL_GET_NEXT_MESSAGES}"),
            url_query_messages: format!("{base}{URL_GET_PUBLISHERS_MESSAGES}"),
            url_post_message: format!("{base}{URL_POST_MESSAGE}"),
            id_body: serde_json::json!({ "id": id }),
        })
    }

    /// Fetch this workload's configuration object.
    pub(crate) fn config_value(&self) -> Result<serde_json::Value> {
        let response: ConfigResponse = self.post(&self.url_get_config, &self.id_body)?;
        decode_config(&response.config)
    }

    /// Pull the next batch of messages addressed to this workload.
    pub(crate) fn next_messages(&self) -> Result<Vec<MessageRecord>> {
        let page: TimeFrameMessages = self.post(&self.url_get_next_messages, &self.id_body)?;
        Ok(page.messages)
    }

    /// Submit a record over HTTP and return the gateway's receipt.
    pub(crate) fn post_message(&self, record: &MessageRecord) -> Result<Receipt> {
        let response: ReceiptResponse = self.post(&self.url_post_message, record)?;
        Ok(Receipt {
            id: response.id,
            timestamp: response.timestamp,
        })
    }

    /// Query messages from specific publishers within a time frame.
    pub(crate) fn query_messages(&self, query: &MessageQuery) -> Result<TimeFrameMessages> {
        self.post(&self.url_query_messages, query)
    }

    fn post<T: DeserializeOwned>(&self, url: &str, body: &impl Serialize) -> Result<T> {
        debug!(url, "gateway REST request");
        let response = self.http.post(url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json()?)
    }
}

/// The gateway wraps the configuration object in a JSON string; unwrap it
/// into a real value.
fn decode_config(config: &str) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_serializes_with_gateway_keys() {
        let query = MessageQuery {
            id: "agentA".to_string(),
            time_frame_start: 100,
            time_frame_end: 200,
            publishers: vec!["p1".to_string(), "p2".to_string()],
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "agentA",
                "timeframestart": 100,
                "timeframeend": 200,
                "publishers": ["p1", "p2"],
            })
        );
    }

    #[test]
    fn time_frame_page_deserializes() {
        let page: TimeFrameMessages = serde_json::from_str(
            r#"{
                "timeframestart": 10,
                "timeframeend": 20,
                "messages": [{"publisher": "p1", "contentdata": "AQID"}]
            }"#,
        )
        .unwrap();
        assert_eq!(page.time_frame_start, 10);
        assert_eq!(page.time_frame_end, 20);
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].publisher, "p1");
        assert_eq!(page.messages[0].content_data, vec![1, 2, 3]);
    }

    #[test]
    fn receipt_response_tolerates_missing_fields() {
        let response: ReceiptResponse = serde_json::from_str(r#"{"id": "m-1"}"#).unwrap();
        assert_eq!(response.id, "m-1");
        assert_eq!(response.timestamp, 0);
    }

    #[test]
    fn config_is_double_parsed() {
        let response: ConfigResponse =
            serde_json::from_str(r#"{"config": "{\"rate\": 5, \"name\": \"edge\"}"}"#).unwrap();
        let value = decode_config(&response.config).unwrap();
        assert_eq!(value["rate"], 5);
        assert_eq!(value["name"], "edge");
    }

    #[test]
    fn post_message_roundtrip_against_local_server() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || -> String {
            let (mut stream, _) = listener.accept().unwrap();

            // Read headers, then exactly Content-Length body bytes.
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
            let content_length: usize = headers
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse().ok())?
                })
                .unwrap();
            while raw.len() < header_end + content_length {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
            }
            let body = String::from_utf8_lossy(&raw[header_end..]).to_string();

            let reply = r#"{"id": "posted-1", "timestamp": 1700000000000}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            stream.write_all(response.as_bytes()).unwrap();
            body
        });

        let endpoint = Endpoint::new("127.0.0.1", port, false);
        let rest = RestClient::new("agentA", &endpoint).unwrap();

        let mut record = MessageRecord::new();
        record.publisher = "agentA".to_string();
        record.content_data = vec![1, 2, 3];
        let receipt = rest.post_message(&record).unwrap();

        assert_eq!(receipt.id, "posted-1");
        assert_eq!(receipt.timestamp, 1_700_000_000_000);

        let body = server.join().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(sent["publisher"], "agentA");
        assert_eq!(sent["contentdata"], "AQID");
    }
}
