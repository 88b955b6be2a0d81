//! Native WebSocket transport.
//!
//! A background thread owns the socket; the session talks to it over
//! channels, so nothing on the caller's thread blocks.

use super::transport::{Transport, TransportError, TransportEvent};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket client for native platforms.
pub struct NativeWebSocket {
    connected: bool,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    pub fn new() -> Self {
        Self {
            connected: false,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Check that `url` is a ws:// or wss:// URL.
fn validate_url(url: &str) -> Result<(), TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(TransportError::InvalidUrl(format!("unsupported scheme {}", other))),
    }
}

fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);
    let (mut socket, response) = match connect(url.as_str()) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(TransportEvent::Error(format!("connection failed: {}", e)));
            let _ = event_tx.send(TransportEvent::Disconnected);
            return;
        }
    };
    log::info!("WebSocket connected, status: {}", response.status());
    let _ = event_tx.send(TransportEvent::Connected);

    // Short read timeout so the loop can service outgoing commands.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(format!("send failed: {}", e)));
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => {
                log::debug!("WebSocket received {} bytes", txt.len());
                let _ = event_tx.send(TransportEvent::Message(txt));
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                let _ = event_tx.send(TransportEvent::Error(format!("read failed: {}", e)));
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(TransportEvent::Disconnected);
}

impl Transport for NativeWebSocket {
    fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        validate_url(url)?;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();
        let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.connected = false;
    }

    fn send(&mut self, message: &str) -> Result<(), TransportError> {
        match (&self.cmd_tx, self.connected) {
            (Some(tx), true) => tx
                .send(WsCommand::Send(message.to_string()))
                .map_err(|e| TransportError::Send(e.to_string())),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let Some(rx) = self.event_rx.as_ref() else {
            return Vec::new();
        };
        let events: Vec<TransportEvent> = rx.try_iter().collect();
        for event in &events {
            match event {
                TransportEvent::Connected => self.connected = true,
                TransportEvent::Disconnected => self.connected = false,
                _ => {}
            }
        }
        if events.contains(&TransportEvent::Disconnected) {
            // The socket thread has exited; allow a fresh connect.
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
        }
        events
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
