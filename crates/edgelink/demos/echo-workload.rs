//! Minimal workload — submits one record and prints everything received.
//!
//! Run against a live gateway:
//!   SELFNAME=echo-workload cargo run --example echo-workload

use std::time::Duration;

use edgelink::conn::ConnError;
use edgelink::{ClientError, Endpoint, GatewayClient, MessageRecord};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let client = match GatewayClient::from_env() {
        Ok(client) => client,
        Err(ClientError::MissingIdentity(_)) => {
            GatewayClient::new("echo-workload", Endpoint::localhost())?
        }
        Err(err) => return Err(err.into()),
    };
    eprintln!("connecting to gateway at {}", client.endpoint());

    let (messages, receipts) = client.open_data_channel()?;

    std::thread::spawn(move || {
        while let Some(receipt) = receipts.recv() {
            eprintln!("receipt: id={} timestamp={}", receipt.id, receipt.timestamp);
        }
    });

    let mut record = MessageRecord::new();
    record.info_type = "greeting".to_string();
    record.info_format = "utf-8".to_string();
    record.content_data = b"hello from edgelink".to_vec();

    // The channel connects in the background; retry until it is up.
    loop {
        match client.send_message(record.clone()) {
            Ok(()) => break,
            Err(ClientError::Conn(ConnError::NotConnected)) => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err.into()),
        }
    }
    eprintln!("record submitted; waiting for traffic");

    while let Some(incoming) = messages.recv() {
        eprintln!(
            "message from {}: {} content bytes (type {:?})",
            incoming.publisher,
            incoming.content_data.len(),
            incoming.info_type
        );
    }

    Ok(())
}
