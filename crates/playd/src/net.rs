//! Line-oriented TCP transport.
//!
//! One acceptor thread and one reader thread per connection turn socket
//! traffic into [`ControlEvent`]s for the control thread. Each connection
//! also gets a writer thread fed through a bounded queue, so the control
//! thread only ever enqueues lines. A client whose queue fills up, or whose
//! writer fails, is dropped and its socket shut down.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use playd_engine::response::{Response, ResponseSink};

pub type ClientId = u64;

/// Lines a client may fall behind by before it is dropped.
pub const CLIENT_QUEUE_LINES: usize = 256;

/// Bounds how long a writer thread waits on a client that stopped reading.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the control thread reacts to, apart from its own tick.
pub enum ControlEvent {
    Connected {
        id: ClientId,
        client: ClientHandle,
    },
    Line {
        id: ClientId,
        line: String,
    },
    Disconnected {
        id: ClientId,
    },
    /// Shut down as if a client had sent `quit`.
    Shutdown,
}

/// Outgoing half of one connection: a queue drained by its own writer thread.
///
/// Dropping the handle shuts the socket down, which also ends the
/// connection's reader thread.
pub struct ClientHandle {
    lines: Option<Sender<String>>,
    writer: Option<JoinHandle<()>>,
    socket: Option<TcpStream>,
}

impl ClientHandle {
    pub fn spawn<W>(id: ClientId, writer: W, socket: Option<TcpStream>) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::spawn_bounded(id, writer, socket, CLIENT_QUEUE_LINES)
    }

    pub fn spawn_bounded<W>(
        id: ClientId,
        writer: W,
        socket: Option<TcpStream>,
        queue_lines: usize,
    ) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(queue_lines.max(1));
        let writer = std::thread::spawn(move || write_lines(id, writer, rx));
        Self {
            lines: Some(tx),
            writer: Some(writer),
            socket,
        }
    }

    /// Queue `line` without waiting; `false` means the client must be dropped.
    fn offer(&self, id: ClientId, line: &str) -> bool {
        let Some(lines) = &self.lines else {
            return false;
        };
        match lines.try_send(line.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client = id, "client is not reading, dropping it");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!(client = id, "client writer has stopped, dropping it");
                false
            }
        }
    }

    /// Let the writer flush what is queued, then close the connection.
    fn close(mut self) {
        drop(self.lines.take());
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if let Some(socket) = &self.socket {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
}

fn write_lines<W: Write>(id: ClientId, mut writer: W, lines: Receiver<String>) {
    for line in lines {
        if let Err(e) = write_line(&mut writer, &line) {
            tracing::warn!(client = id, "write failed: {e}");
            return;
        }
    }
}

fn write_line(writer: &mut dyn Write, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Outgoing handles of all connected clients.
#[derive(Clone, Default)]
pub struct Clients {
    inner: Arc<Mutex<HashMap<ClientId, ClientHandle>>>,
}

impl Clients {
    pub fn insert(&self, id: ClientId, client: ClientHandle) {
        self.lock().insert(id, client);
    }

    pub fn remove(&self, id: ClientId) {
        self.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue one line for one client.
    pub fn send(&self, id: ClientId, line: &str) {
        let mut clients = self.lock();
        let Some(client) = clients.get(&id) else {
            return;
        };
        if !client.offer(id, line) {
            clients.remove(&id);
        }
    }

    /// Queue one line for every client, dropping any that cannot take it.
    pub fn broadcast(&self, line: &str) {
        self.lock().retain(|id, client| client.offer(*id, line));
    }

    /// Flush and close every connection.
    pub fn close_all(&self) {
        let drained: Vec<ClientHandle> = self.lock().drain().map(|(_, c)| c).collect();
        for client in drained {
            client.close();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delivers player responses to every connected client.
pub struct Broadcast {
    clients: Clients,
}

impl Broadcast {
    pub fn new(clients: Clients) -> Self {
        Self { clients }
    }
}

impl ResponseSink for Broadcast {
    fn respond(&self, response: Response) {
        self.clients.broadcast(&response.pack());
    }
}

/// Accept connections forever on a background thread.
pub fn spawn_acceptor(listener: TcpListener, events: Sender<ControlEvent>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let next_id = AtomicU64::new(1);
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("accept error: {e}");
                    continue;
                }
            };
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = start_client(id, stream, &events) {
                tracing::warn!(client = id, "client setup failed: {e:#}");
            }
        }
    })
}

fn start_client(id: ClientId, stream: TcpStream, events: &Sender<ControlEvent>) -> Result<()> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    stream
        .set_write_timeout(Some(WRITE_TIMEOUT))
        .context("set write timeout")?;
    let writer = stream.try_clone().context("clone client stream")?;
    let closer = stream.try_clone().context("clone client stream")?;

    tracing::info!(client = id, peer = %peer, "client connected");
    events
        .send(ControlEvent::Connected {
            id,
            client: ClientHandle::spawn(id, writer, Some(closer)),
        })
        .map_err(|_| anyhow!("control loop has stopped"))?;

    let events = events.clone();
    std::thread::spawn(move || {
        read_lines(id, stream, &events);
        tracing::info!(client = id, "client disconnected");
        let _ = events.send(ControlEvent::Disconnected { id });
    });
    Ok(())
}

/// Forward each line from `reader` as a [`ControlEvent::Line`] until EOF or error.
pub fn read_lines<R: std::io::Read>(id: ClientId, reader: R, events: &Sender<ControlEvent>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(client = id, "read error: {e}");
                return;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if events
            .send(ControlEvent::Line {
                id,
                line: line.to_string(),
            })
            .is_err()
        {
            return;
        }
    }
}
