//! Compositor IPC transport using the i3 IPC protocol.
//!
//! Works with compositors that speak the Sway/i3 IPC dialect
//! ($SWAYSOCK): binary framing (`i3-ipc` magic, LE length + type) with
//! JSON payloads.
//!
//! One persistent connection carries everything: the event subscription,
//! tree requests, and focus commands. A worker thread blocks on the read
//! side and forwards each frame as a typed [`IpcMessage`] over a channel;
//! writes go through a mutex-guarded clone of the stream, so commands can
//! be issued from any thread while the worker is mid-read. If the
//! connection drops the worker reconnects with exponential backoff and
//! re-subscribes.
//!
//! Reference: https://man.archlinux.org/man/sway-ipc.7.en

use std::env;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

// i3 IPC constants
const IPC_MAGIC: &[u8; 6] = b"i3-ipc";
const IPC_HEADER_SIZE: usize = 14; // 6 (magic) + 4 (length) + 4 (type)

// Message types (outgoing)
const IPC_RUN_COMMAND: u32 = 0;
const IPC_SUBSCRIBE: u32 = 2;
const IPC_GET_TREE: u32 = 4;

// Event types have bit 31 set in the response type
const IPC_EVENT_BIT: u32 = 1 << 31;
const IPC_EVENT_WORKSPACE: u32 = IPC_EVENT_BIT; // event type 0
const IPC_EVENT_WINDOW: u32 = IPC_EVENT_BIT | 3;

/// Event classes the engine needs; anything else is noise here.
const SUBSCRIBE_PAYLOAD: &[u8] = b"[\"workspace\",\"window\"]";

const RECONNECT_INITIAL_MS: u64 = 1000;
const RECONNECT_MAX_MS: u64 = 30000;
const RECONNECT_MULTIPLIER: f64 = 1.5;

/// Reject IPC payloads larger than this to guard against bogus length fields.
const MAX_IPC_PAYLOAD: usize = 64 * 1024 * 1024; // 64 MB

/// How long a blocked read waits before re-checking the shutdown flag.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Typed message delivered from the IPC worker to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    /// A subscribed change notification arrived. The event payload itself
    /// is irrelevant: the engine re-fetches the full tree.
    Change,
    /// Reply to a GET_TREE request, carrying the raw JSON document.
    Tree(Vec<u8>),
    /// Reply to a RUN_COMMAND request.
    CommandResult(Vec<u8>),
    /// The event connection was (re-)established and subscribed; tree
    /// state may have changed meanwhile.
    Connected,
}

/// Write side of the transport, as seen by the engine.
///
/// Both operations are fire-and-forget at the protocol level; replies come
/// back through the worker as [`IpcMessage`]s.
pub trait Transport: Send + Sync {
    /// Request a full tree snapshot.
    fn request_tree(&self) -> io::Result<()>;
    /// Submit a compositor command, e.g. `workspace number 3`.
    fn run_command(&self, command: &str) -> io::Result<()>;
    /// Shut down the transport worker, if any.
    fn stop(&self) {}
}

/// Resolve the IPC socket path from the config override or `$SWAYSOCK`.
pub fn socket_path(config_override: Option<&Path>) -> swaytasks_core::Result<String> {
    if let Some(path) = config_override {
        return Ok(path.to_string_lossy().into_owned());
    }
    env::var("SWAYSOCK").map_err(|_| swaytasks_core::Error::SocketUnavailable)
}

fn write_message(stream: &mut UnixStream, msg_type: u32, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    let mut header = [0u8; IPC_HEADER_SIZE];
    header[..6].copy_from_slice(IPC_MAGIC);
    header[6..10].copy_from_slice(&len.to_le_bytes());
    header[10..14].copy_from_slice(&msg_type.to_le_bytes());
    stream.write_all(&header)?;
    if !payload.is_empty() {
        stream.write_all(payload)?;
    }
    Ok(())
}

/// Read one framed message. Returns (message_type, payload_bytes).
fn read_message(stream: &mut UnixStream) -> io::Result<(u32, Vec<u8>)> {
    let mut header = [0u8; IPC_HEADER_SIZE];
    stream.read_exact(&mut header)?;

    if &header[..6] != IPC_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid i3-ipc magic",
        ));
    }

    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let msg_type = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);

    if len > MAX_IPC_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("IPC payload too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len];
    if len > 0 {
        stream.read_exact(&mut payload)?;
    }

    Ok((msg_type, payload))
}

/// Map a received frame to the message the engine consumes. Subscribe
/// acknowledgements and unhandled event classes are absorbed here.
fn classify(msg_type: u32, payload: Vec<u8>) -> Option<IpcMessage> {
    if msg_type & IPC_EVENT_BIT != 0 {
        return match msg_type {
            IPC_EVENT_WORKSPACE | IPC_EVENT_WINDOW => Some(IpcMessage::Change),
            _ => {
                trace!("ignoring event type 0x{:x}", msg_type);
                None
            }
        };
    }

    match msg_type {
        IPC_GET_TREE => Some(IpcMessage::Tree(payload)),
        IPC_RUN_COMMAND => Some(IpcMessage::CommandResult(payload)),
        IPC_SUBSCRIBE => {
            let success = serde_json::from_slice::<serde_json::Value>(&payload)
                .ok()
                .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
                .unwrap_or(false);
            if !success {
                warn!("subscribe rejected: {}", String::from_utf8_lossy(&payload));
            }
            None
        }
        _ => {
            trace!("ignoring reply type {}", msg_type);
            None
        }
    }
}

/// Connection to the compositor's IPC socket.
pub struct SwayIpc {
    socket_path: String,
    /// Current write half; replaced by the worker on reconnect, `None`
    /// while disconnected.
    writer: Arc<Mutex<Option<UnixStream>>>,
    /// Read half of the initial connection, handed to the worker.
    pending_reader: Mutex<Option<UnixStream>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SwayIpc {
    /// Connect to the compositor. The connection is usable for writes
    /// immediately; call [`SwayIpc::start`] to begin reading.
    pub fn connect(socket_path: String) -> io::Result<Self> {
        let stream = UnixStream::connect(&socket_path)?;
        let writer = stream.try_clone()?;

        Ok(Self {
            socket_path,
            writer: Arc::new(Mutex::new(Some(writer))),
            pending_reader: Mutex::new(Some(stream)),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the worker thread. Each decoded frame is classified and sent
    /// to `tx`; the worker exits when the receiver is dropped or
    /// [`Transport::stop`] is called.
    pub fn start(&self, tx: Sender<IpcMessage>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("IPC worker already running");
            return;
        }

        let socket_path = self.socket_path.clone();
        let running = Arc::clone(&self.running);
        let writer = Arc::clone(&self.writer);
        let initial = self.pending_reader.lock().take();

        let handle = thread::Builder::new()
            .name("swaytasks-ipc".into())
            .spawn(move || {
                worker_loop(socket_path, running, writer, tx, initial);
            })
            .ok();

        *self.worker.lock() = handle;
    }

    fn send(&self, msg_type: u32, payload: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        let stream = writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "IPC disconnected"))?;
        write_message(stream, msg_type, payload)
    }
}

impl Transport for SwayIpc {
    fn request_tree(&self) -> io::Result<()> {
        self.send(IPC_GET_TREE, b"")
    }

    fn run_command(&self, command: &str) -> io::Result<()> {
        self.send(IPC_RUN_COMMAND, command.as_bytes())
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        debug!("IPC transport stopped");
    }
}

impl Drop for SwayIpc {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Worker loop: (re)connect, subscribe, then pump frames into the channel.
fn worker_loop(
    socket_path: String,
    running: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<UnixStream>>>,
    tx: Sender<IpcMessage>,
    mut initial: Option<UnixStream>,
) {
    let mut backoff_ms = RECONNECT_INITIAL_MS;

    while running.load(Ordering::SeqCst) {
        let mut stream = match initial.take() {
            Some(s) => s,
            None => match UnixStream::connect(&socket_path) {
                Ok(s) => {
                    match s.try_clone() {
                        Ok(w) => *writer.lock() = Some(w),
                        Err(e) => error!("failed to clone IPC stream: {}", e),
                    }
                    s
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        warn!(
                            "failed to connect to IPC socket: {}. Retrying in {}ms",
                            e, backoff_ms
                        );
                        thread::sleep(Duration::from_millis(backoff_ms));
                        backoff_ms = next_backoff(backoff_ms);
                    }
                    continue;
                }
            },
        };

        if let Err(e) = write_message(&mut stream, IPC_SUBSCRIBE, SUBSCRIBE_PAYLOAD) {
            if running.load(Ordering::SeqCst) {
                warn!(
                    "failed to subscribe to IPC events: {}. Retrying in {}ms",
                    e, backoff_ms
                );
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms = next_backoff(backoff_ms);
            }
            continue;
        }

        backoff_ms = RECONNECT_INITIAL_MS;

        // The tree may have changed while we were disconnected.
        if tx.send(IpcMessage::Connected).is_err() {
            return;
        }

        // Finite read timeout so the shutdown flag is checked between frames.
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }

            match read_message(&mut stream) {
                Ok((msg_type, payload)) => {
                    if let Some(msg) = classify(msg_type, payload) {
                        if tx.send(msg).is_err() {
                            // Engine gone; nothing left to do
                            return;
                        }
                    }
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        warn!("IPC event connection lost: {}", e);
                    }
                    break; // Reconnect
                }
            }
        }

        *writer.lock() = None;
    }

    debug!("IPC worker exiting");
}

fn next_backoff(backoff_ms: u64) -> u64 {
    ((backoff_ms as f64) * RECONNECT_MULTIPLIER).min(RECONNECT_MAX_MS as f64) as u64
}
