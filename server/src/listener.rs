//! WebSocket acceptor and per-connection threads.
//!
//! Each connection thread alternates a short blocking read with a flush of
//! its outbound queue. Decoded frames go to the server as [`NetEvent`]s in
//! arrival order.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use frame::Limits;
use tracing::{debug, info, trace, warn};
use tungstenite::{Message, WebSocket};

use crate::config::ServerConfig;
use crate::event::{decode_message, ConnectionId, DisconnectReason, NetEvent, SocketHandle};

/// Accepts TCP connections and upgrades them to WebSockets.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    limits: Limits,
    read_timeout: Duration,
    write_timeout: Duration,
    next_conn: u64,
}

impl Listener {
    pub fn bind(config: &ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr())?;
        Ok(Self {
            listener,
            limits: config.frame_limits,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            next_conn: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts the acceptor thread.
    pub fn spawn(self, events: Sender<NetEvent>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("rigsync-accept".to_string())
            .spawn(move || self.accept_loop(&events))
    }

    fn accept_loop(mut self, events: &Sender<NetEvent>) {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let conn = ConnectionId::new(self.next_conn);
            self.next_conn += 1;
            let connection = Connection {
                conn,
                limits: self.limits,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                events: events.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("rigsync-conn-{}", conn.raw()))
                .spawn(move || connection.serve(stream));
            if let Err(err) = spawned {
                warn!(%conn, error = %err, "could not spawn connection thread");
            }
        }
    }
}

struct Connection {
    conn: ConnectionId,
    limits: Limits,
    read_timeout: Duration,
    write_timeout: Duration,
    events: Sender<NetEvent>,
}

impl Connection {
    fn serve(self, stream: TcpStream) {
        let address = match stream.peer_addr() {
            Ok(address) => address,
            Err(err) => {
                warn!(conn = %self.conn, error = %err, "peer address unavailable");
                return;
            }
        };
        let mut socket = match tungstenite::accept(stream) {
            Ok(socket) => socket,
            Err(err) => {
                warn!(%address, error = %err, "websocket handshake failed");
                return;
            }
        };
        let stream = socket.get_ref();
        let timeouts = stream
            .set_read_timeout(Some(self.read_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.write_timeout)));
        if let Err(err) = timeouts {
            warn!(%address, error = %err, "could not set socket timeouts");
            return;
        }
        debug!(%address, conn = %self.conn, "connection accepted");

        let (handle, outbox) = SocketHandle::channel(self.conn);
        let connected = NetEvent::Connected {
            address,
            socket: handle,
        };
        if self.events.send(connected).is_err() {
            return;
        }
        let reason = self.pump(&mut socket, &outbox);
        info!(%address, conn = %self.conn, %reason, "connection ended");
        // The server may already be gone; nothing left to tell.
        let _ = self.events.send(NetEvent::Disconnected {
            conn: self.conn,
            reason,
        });
    }

    fn pump(
        &self,
        socket: &mut WebSocket<TcpStream>,
        outbox: &Receiver<Vec<u8>>,
    ) -> DisconnectReason {
        loop {
            match socket.read() {
                Ok(Message::Binary(bytes)) => {
                    if !self.forward(&bytes) {
                        return DisconnectReason::ServerClosed;
                    }
                }
                Ok(Message::Text(text)) => {
                    if !self.forward(text.as_bytes()) {
                        return DisconnectReason::ServerClosed;
                    }
                }
                Ok(Message::Close(_)) => return DisconnectReason::Closed,
                Ok(_) => {}
                Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return DisconnectReason::Closed;
                }
                Err(err) => return DisconnectReason::Error(err.to_string()),
            }

            loop {
                match outbox.try_recv() {
                    Ok(bytes) => {
                        match socket.send(Message::Binary(bytes)) {
                            Ok(()) => {}
                            Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {
                                return DisconnectReason::WriteTimeout;
                            }
                            Err(err) => return DisconnectReason::Error(err.to_string()),
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        let _ = socket.close(None);
                        return DisconnectReason::ServerClosed;
                    }
                }
            }
        }
    }

    /// Decodes and forwards one frame. Returns `false` once the server has
    /// stopped listening.
    fn forward(&self, bytes: &[u8]) -> bool {
        match decode_message(bytes, &self.limits) {
            Ok(Some(message)) => self
                .events
                .send(NetEvent::Message {
                    conn: self.conn,
                    message,
                })
                .is_ok(),
            Ok(None) => {
                trace!(conn = %self.conn, "ignoring empty frame");
                true
            }
            Err(err) => {
                warn!(conn = %self.conn, error = %err, len = bytes.len(), "dropping malformed frame");
                true
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
