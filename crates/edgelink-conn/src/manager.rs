use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use edgelink_transport::{Endpoint, GatewayStream, TransportError};
use edgelink_wire::{
    Frame, FrameReader, FrameWriter, MessageRecord, Receipt, WireError, PROTOCOL_VERSION,
};
use tracing::{debug, info, trace, warn};

use crate::config::ConnConfig;
use crate::error::{ConnError, Result};
use crate::queue::{self, RingReceiver, RingSender};

/// Capacity of the control channel's outbound ACK queue. Acknowledgements
/// are rare and latency-insensitive, so plain blocking backpressure is fine.
const CONTROL_ACK_BUFFER: usize = 4;

/// One out-of-band signal from the gateway. The frame itself is the
/// payload; receiving a `Signal` means new configuration is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal;

/// Owns the two gateway sockets and keeps them alive forever.
///
/// Each opened channel runs on its own thread: an explicit
/// connect/serve/reconnect loop that spawns a fresh read task and write
/// task per connection and tears both down on the first I/O failure.
/// Consumers interact only with the queues; the sockets never escape.
pub struct ConnectionManager {
    endpoint: Endpoint,
    identity: String,
    config: ConnConfig,
    control_started: AtomicBool,
    data_started: AtomicBool,
    /// Outbound frame ring of the currently connected data channel.
    /// `None` while disconnected; doubles as the per-channel writer lock
    /// serializing concurrent producers.
    data_outbound: Mutex<Option<RingSender<Frame>>>,
    unknown_frames: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager for the given gateway endpoint and caller identity.
    pub fn new(endpoint: Endpoint, identity: impl Into<String>, config: ConnConfig) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            identity: identity.into(),
            config,
            control_started: AtomicBool::new(false),
            data_started: AtomicBool::new(false),
            data_outbound: Mutex::new(None),
            unknown_frames: AtomicU64::new(0),
        })
    }

    /// Start the control channel and return its signal queue.
    ///
    /// The reconnect loop runs until the returned receiver is dropped.
    pub fn open_control_channel(self: &Arc<Self>) -> Result<RingReceiver<Signal>> {
        if self.control_started.swap(true, Ordering::SeqCst) {
            return Err(ConnError::AlreadyOpen);
        }
        let (tx, rx) = queue::ring(self.config.signal_buffer);
        let mgr = Arc::clone(self);
        let _ = spawn_named("edgelink-control", move || mgr.run_control(tx))
            .inspect_err(|_| self.control_started.store(false, Ordering::SeqCst))?;
        Ok(rx)
    }

    /// Start the data channel and return its message and receipt queues.
    ///
    /// The reconnect loop runs until both returned receivers are dropped.
    pub fn open_data_channel(
        self: &Arc<Self>,
    ) -> Result<(RingReceiver<MessageRecord>, RingReceiver<Receipt>)> {
        if self.data_started.swap(true, Ordering::SeqCst) {
            return Err(ConnError::AlreadyOpen);
        }
        let (msg_tx, msg_rx) = queue::ring(self.config.message_buffer);
        let (rcpt_tx, rcpt_rx) = queue::ring(self.config.receipt_buffer);
        let mgr = Arc::clone(self);
        let _ = spawn_named("edgelink-data", move || mgr.run_data(msg_tx, rcpt_tx))
            .inspect_err(|_| self.data_started.store(false, Ordering::SeqCst))?;
        Ok((msg_rx, rcpt_rx))
    }

    /// Submit a record on the data channel.
    ///
    /// Clears any caller-supplied id/timestamp (the gateway assigns both),
    /// stamps the protocol version and this client's publisher identity,
    /// encodes, and enqueues the frame on the outbound ring — never
    /// blocking the caller. Under sustained overload the ring sheds its
    /// oldest pending frame.
    pub fn send(&self, record: MessageRecord) -> Result<()> {
        let mut record = record;
        let guard = self.data_outbound_lock();
        let Some(outbound) = guard.as_ref() else {
            return Err(ConnError::NotConnected);
        };

        record.id.clear();
        record.timestamp = 0;
        if record.version == 0 {
            record.version = PROTOCOL_VERSION;
        }
        record.publisher = self.identity.clone();

        let payload = record.encode()?;
        if outbound.push(Frame::Message(payload)).is_some() {
            warn!("data outbound ring full; dropped oldest frame");
        }
        Ok(())
    }

    /// The caller identity stamped onto outgoing records.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Count of inbound frames dropped for carrying an unknown type byte.
    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames.load(Ordering::Relaxed)
    }

    fn data_outbound_lock(&self) -> MutexGuard<'_, Option<RingSender<Frame>>> {
        self.data_outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn run_control(self: Arc<Self>, signals: RingSender<Signal>) {
        let mut attempt: u32 = 0;
        loop {
            if signals.is_closed() {
                debug!("control consumer gone; stopping channel");
                self.control_started.store(false, Ordering::SeqCst);
                return;
            }
            match self.connect(ChannelKind::Control) {
                Ok(stream) => {
                    attempt = 0;
                    self.serve_control(&stream, &signals);
                    warn!("reconnecting after control channel failure");
                }
                Err(err) => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(%err, ?delay, "control channel connect failed; retrying");
                    if attempt < self.config.attempt_limit {
                        attempt += 1;
                    }
                    thread::sleep(delay);
                }
            }
        }
    }

    fn run_data(self: Arc<Self>, messages: RingSender<MessageRecord>, receipts: RingSender<Receipt>) {
        let mut attempt: u32 = 0;
        loop {
            if messages.is_closed() && receipts.is_closed() {
                debug!("data consumers gone; stopping channel");
                self.data_started.store(false, Ordering::SeqCst);
                return;
            }
            match self.connect(ChannelKind::Data) {
                Ok(stream) => {
                    attempt = 0;
                    self.serve_data(&stream, &messages, &receipts);
                    warn!("reconnecting after data channel failure");
                }
                Err(err) => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(%err, ?delay, "data channel connect failed; retrying");
                    if attempt < self.config.attempt_limit {
                        attempt += 1;
                    }
                    thread::sleep(delay);
                }
            }
        }
    }

    fn connect(&self, kind: ChannelKind) -> std::result::Result<GatewayStream, TransportError> {
        let addr = match kind {
            ChannelKind::Control => self.endpoint.control_addr()?,
            ChannelKind::Data => self.endpoint.data_addr()?,
        };
        let stream = GatewayStream::connect(addr, self.config.connect_timeout)?;
        info!(%addr, channel = kind.name(), "channel connected");
        Ok(stream)
    }

    /// Serve one control-channel connection until it fails.
    fn serve_control(self: &Arc<Self>, stream: &GatewayStream, signals: &RingSender<Signal>) {
        let (reader_stream, writer_stream) = match split(stream) {
            Ok(halves) => halves,
            Err(err) => {
                warn!(%err, "failed to split control stream");
                return;
            }
        };

        let (failed_tx, failed_rx) = mpsc::channel::<()>();
        let (ack_tx, ack_rx) = mpsc::sync_channel::<Frame>(CONTROL_ACK_BUFFER);

        let read = {
            let mgr = Arc::clone(self);
            let signals = signals.clone();
            let failed = failed_tx.clone();
            thread::spawn(move || mgr.control_read_task(reader_stream, signals, ack_tx, failed))
        };
        let write = thread::spawn(move || control_write_task(writer_stream, ack_rx, failed_tx));

        // Park until either task reports failure, then tear down: the
        // shutdown unblocks whichever task is still inside a socket call.
        let _ = failed_rx.recv();
        let _ = stream.shutdown();
        let _ = read.join();
        let _ = write.join();
    }

    /// Serve one data-channel connection until it fails.
    fn serve_data(
        self: &Arc<Self>,
        stream: &GatewayStream,
        messages: &RingSender<MessageRecord>,
        receipts: &RingSender<Receipt>,
    ) {
        let (reader_stream, writer_stream) = match split(stream) {
            Ok(halves) => halves,
            Err(err) => {
                warn!(%err, "failed to split data stream");
                return;
            }
        };

        let (out_tx, out_rx) = queue::ring::<Frame>(self.config.write_buffer);
        *self.data_outbound_lock() = Some(out_tx.clone());

        let (failed_tx, failed_rx) = mpsc::channel::<()>();

        let read = {
            let mgr = Arc::clone(self);
            let messages = messages.clone();
            let receipts = receipts.clone();
            let out = out_tx.clone();
            let failed = failed_tx.clone();
            thread::spawn(move || mgr.data_read_task(reader_stream, messages, receipts, out, failed))
        };
        let write = thread::spawn(move || data_write_task(writer_stream, out_rx, failed_tx));

        let _ = failed_rx.recv();
        // Sends fail NotConnected from here until the next connection.
        *self.data_outbound_lock() = None;
        let _ = stream.shutdown();
        drop(out_tx);
        let _ = read.join();
        let _ = write.join();
    }

    fn control_read_task(
        &self,
        stream: GatewayStream,
        signals: RingSender<Signal>,
        acks: mpsc::SyncSender<Frame>,
        failed: mpsc::Sender<()>,
    ) {
        let mut reader = FrameReader::new(stream);
        loop {
            match reader.read_frame() {
                Ok(Frame::ControlSignal) => {
                    if signals.push(Signal).is_some() {
                        warn!("signal queue full; dropped oldest signal");
                    }
                    if acks.send(Frame::Ack).is_err() {
                        // Writer is gone; the manager is already tearing down.
                        return;
                    }
                }
                Ok(frame) => {
                    trace!(code = frame.type_code(), "ignoring frame on control channel");
                }
                Err(WireError::UnknownFrameType(code)) => self.note_unknown_frame(code),
                Err(err) => {
                    debug!(%err, "control channel read failed");
                    let _ = failed.send(());
                    return;
                }
            }
        }
    }

    fn data_read_task(
        &self,
        stream: GatewayStream,
        messages: RingSender<MessageRecord>,
        receipts: RingSender<Receipt>,
        out: RingSender<Frame>,
        failed: mpsc::Sender<()>,
    ) {
        let mut reader = FrameReader::new(stream);
        loop {
            match reader.read_frame() {
                Ok(Frame::Message(payload)) => match MessageRecord::decode(&payload) {
                    Ok(record) => {
                        if messages.push(record).is_some() {
                            warn!("message queue full; dropped oldest record");
                        }
                        ack(&out);
                    }
                    // No negative acknowledgement exists; the frame is
                    // dropped and deliberately left unacknowledged.
                    Err(err) => warn!(%err, "dropping undecodable message frame"),
                },
                Ok(Frame::Receipt(receipt)) => {
                    if receipts.push(receipt).is_some() {
                        warn!("receipt queue full; dropped oldest receipt");
                    }
                    ack(&out);
                }
                Ok(frame) => {
                    trace!(code = frame.type_code(), "ignoring frame on data channel");
                }
                Err(WireError::UnknownFrameType(code)) => self.note_unknown_frame(code),
                Err(err) => {
                    debug!(%err, "data channel read failed");
                    let _ = failed.send(());
                    return;
                }
            }
        }
    }

    fn note_unknown_frame(&self, code: u8) {
        self.unknown_frames.fetch_add(1, Ordering::Relaxed);
        debug!(code, "ignoring unknown frame type");
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("control_started", &self.control_started.load(Ordering::SeqCst))
            .field("data_started", &self.data_started.load(Ordering::SeqCst))
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum ChannelKind {
    Control,
    Data,
}

impl ChannelKind {
    fn name(self) -> &'static str {
        match self {
            ChannelKind::Control => "control",
            ChannelKind::Data => "data",
        }
    }
}

fn split(stream: &GatewayStream) -> std::result::Result<(GatewayStream, GatewayStream), TransportError> {
    Ok((stream.try_clone()?, stream.try_clone()?))
}

fn ack(out: &RingSender<Frame>) {
    if out.push(Frame::Ack).is_some() {
        warn!("outbound ring full; dropped oldest frame for ACK");
    }
}

fn control_write_task(
    stream: GatewayStream,
    acks: mpsc::Receiver<Frame>,
    failed: mpsc::Sender<()>,
) {
    let mut writer = FrameWriter::new(stream);
    while let Ok(frame) = acks.recv() {
        if let Err(err) = writer.write_frame(&frame) {
            debug!(%err, "control channel write failed");
            let _ = failed.send(());
            return;
        }
    }
}

fn data_write_task(stream: GatewayStream, out: RingReceiver<Frame>, failed: mpsc::Sender<()>) {
    let mut writer = FrameWriter::new(stream);
    while let Some(frame) = out.recv() {
        if let Err(err) = writer.write_frame(&frame) {
            debug!(%err, "data channel write failed");
            let _ = failed.send(());
            return;
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| ConnError::Transport(TransportError::Io(e)))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use super::*;

    fn test_config() -> ConnConfig {
        ConnConfig {
            connect_timeout: Duration::from_secs(1),
            base_backoff: Duration::from_millis(10),
            ..ConnConfig::default()
        }
    }

    /// Endpoint whose data channel resolves to `port`.
    fn data_endpoint(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port - 1, false)
    }

    fn send_when_connected(mgr: &ConnectionManager, record: MessageRecord) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match mgr.send(record.clone()) {
                Ok(()) => return,
                Err(ConnError::NotConnected) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) => panic!("send failed: {err}"),
            }
        }
    }

    #[test]
    fn send_without_connection_is_not_connected() {
        // Bind then drop, so nothing listens on the data port.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let err = mgr.send(MessageRecord::new()).unwrap_err();
        assert!(matches!(err, ConnError::NotConnected));
    }

    #[test]
    fn reopening_a_channel_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let _queues = mgr.open_data_channel().unwrap();
        assert!(matches!(
            mgr.open_data_channel(),
            Err(ConnError::AlreadyOpen)
        ));
    }

    #[test]
    fn data_channel_end_to_end_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);

            let sent = match reader.read_frame().unwrap() {
                Frame::Message(payload) => MessageRecord::decode(&payload).unwrap(),
                other => panic!("expected MESSAGE frame, got {other:?}"),
            };

            // Echo a structurally different record.
            let mut echo = MessageRecord::new();
            echo.id = "echo-1".to_string();
            echo.publisher = "gateway".to_string();
            echo.content_data = vec![4, 5, 6];
            writer
                .write_frame(&Frame::Message(echo.encode().unwrap()))
                .unwrap();

            // Exactly one ACK comes back for the echoed message.
            assert_eq!(reader.read_frame().unwrap(), Frame::Ack);
            sent
        });

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let (messages, _receipts) = mgr.open_data_channel().unwrap();

        let mut outgoing = MessageRecord::new();
        outgoing.id = "caller-set".to_string();
        outgoing.timestamp = 777;
        outgoing.content_data = vec![1, 2, 3];
        send_when_connected(&mgr, outgoing);

        let received = messages
            .recv_timeout(Duration::from_secs(5))
            .expect("echoed record");
        assert_eq!(received.id, "echo-1");
        assert_eq!(received.publisher, "gateway");
        assert_eq!(received.content_data, vec![4, 5, 6]);
        assert!(messages.is_empty());

        let sent = server.join().unwrap();
        // Caller-supplied id/timestamp cleared, identity stamped.
        assert!(sent.id.is_empty());
        assert_eq!(sent.timestamp, 0);
        assert_eq!(sent.publisher, "agentA");
        assert_eq!(sent.version, PROTOCOL_VERSION);
        assert_eq!(sent.content_data, vec![1, 2, 3]);
    }

    #[test]
    fn receipts_are_dispatched_and_acked() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);

            writer
                .write_frame(&Frame::Receipt(Receipt {
                    id: "msg-42".to_string(),
                    timestamp: 1_700_000_000_000,
                }))
                .unwrap();

            assert_eq!(reader.read_frame().unwrap(), Frame::Ack);
        });

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let (_messages, receipts) = mgr.open_data_channel().unwrap();

        let receipt = receipts
            .recv_timeout(Duration::from_secs(5))
            .expect("receipt");
        assert_eq!(receipt.id, "msg-42");
        assert_eq!(receipt.timestamp, 1_700_000_000_000);

        server.join().unwrap();
    }

    #[test]
    fn unknown_frame_types_are_counted_not_acked() {
        use std::io::Write;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // An unknown type byte, then a valid receipt.
            stream.write_all(&[0x99]).unwrap();
            let mut writer = FrameWriter::new(stream.try_clone().unwrap());
            writer
                .write_frame(&Frame::Receipt(Receipt::default()))
                .unwrap();

            // Only the receipt is acknowledged.
            let mut reader = FrameReader::new(stream);
            assert_eq!(reader.read_frame().unwrap(), Frame::Ack);
        });

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let (_messages, receipts) = mgr.open_data_channel().unwrap();

        assert!(receipts.recv_timeout(Duration::from_secs(5)).is_some());
        assert_eq!(mgr.unknown_frames(), 1);

        server.join().unwrap();
    }

    #[test]
    fn control_channel_delivers_signals_and_acks() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        // Control channel dials the base port directly.
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);

            for _ in 0..2 {
                writer.write_frame(&Frame::ControlSignal).unwrap();
                assert_eq!(reader.read_frame().unwrap(), Frame::Ack);
            }
        });

        let endpoint = Endpoint::new("127.0.0.1", port, false);
        let mgr = ConnectionManager::new(endpoint, "agentA", test_config());
        let signals = mgr.open_control_channel().unwrap();

        assert_eq!(signals.recv_timeout(Duration::from_secs(5)), Some(Signal));
        assert_eq!(signals.recv_timeout(Duration::from_secs(5)), Some(Signal));

        server.join().unwrap();
    }

    #[test]
    fn reconnects_after_gateway_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || -> MessageRecord {
            // First connection dies immediately.
            let (first, _) = listener.accept().unwrap();
            drop(first);

            // Second connection serves.
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream);
            loop {
                if let Frame::Message(payload) = reader.read_frame().unwrap() {
                    return MessageRecord::decode(&payload).unwrap();
                }
            }
        });

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let (_messages, _receipts) = mgr.open_data_channel().unwrap();

        // Keep sending until a send lands on the re-established connection.
        let mut record = MessageRecord::new();
        record.info_type = "probe".to_string();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !server.is_finished() {
            assert!(Instant::now() < deadline, "gateway never saw the message");
            let _ = mgr.send(record.clone());
            thread::sleep(Duration::from_millis(20));
        }

        let received = server.join().unwrap();
        assert_eq!(received.info_type, "probe");
        assert_eq!(received.publisher, "agentA");
    }

    #[test]
    fn drops_undecodable_message_without_ack() {
        use std::io::Read;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = FrameWriter::new(stream.try_clone().unwrap());

            // A MESSAGE frame whose payload fails the version gate.
            writer
                .write_frame(&Frame::Message(bytes::Bytes::from_static(&[0x00, 0x09])))
                .unwrap();
            // Then a valid receipt, which must be the only frame ACKed.
            writer
                .write_frame(&Frame::Receipt(Receipt {
                    id: "ok".to_string(),
                    timestamp: 0,
                }))
                .unwrap();

            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            assert_eq!(reader.read_frame().unwrap(), Frame::Ack);

            // No second ACK: the socket goes quiet until the client is done.
            stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
            let mut probe = [0u8; 1];
            let mut raw = stream;
            match raw.read(&mut probe) {
                Ok(0) => {}
                Ok(n) => panic!("unexpected extra bytes: {n}"),
                Err(err) => assert!(
                    matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ),
                    "unexpected error: {err}"
                ),
            }
        });

        let mgr = ConnectionManager::new(data_endpoint(port), "agentA", test_config());
        let (messages, receipts) = mgr.open_data_channel().unwrap();

        assert_eq!(
            receipts.recv_timeout(Duration::from_secs(5)).map(|r| r.id),
            Some("ok".to_string())
        );
        assert!(messages.is_empty());

        server.join().unwrap();
    }
}
