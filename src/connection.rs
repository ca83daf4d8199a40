// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Full-duplex connection wrapper (component C7, `Connection<R, W>`): two
// background pump threads, an unbounded write queue, and multicast event
// hooks. Per the design note decision recorded in SPEC_FULL.md §5/§9, each
// connection uses two rings (one per direction) rather than one
// bidirectional ring, for simpler single-producer/single-consumer
// reasoning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::error::IpcError;
use crate::frame::FrameCodec;
use crate::stream::{MessageStream, StreamConfig};

/// `Connection` lifecycle, exactly the spec's `New -> Open -> Closing ->
/// Closed` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    New,
    Open,
    Closing,
    Closed,
}

/// Which side of a rendezvous a `Connection` plays: determines which of
/// the two per-connection rings is read from and which is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that initiated the connection (typically the client).
    Initiator,
    /// The side that accepted it (typically the server).
    Acceptor,
}

/// Tunable knobs bundled for constructing a `Connection`'s pair of rings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub node_count: u32,
    pub node_size: u32,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub spin_acquire_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            node_count: 1024,
            node_size: 4096,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            spin_acquire_timeout_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn with_node_count(mut self, n: u32) -> Self {
        self.node_count = n;
        self
    }

    pub fn with_node_size(mut self, n: u32) -> Self {
        self.node_size = n;
        self
    }

    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout_ms = d.as_millis() as u64;
        self
    }

    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout_ms = d.as_millis() as u64;
        self
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            read_timeout_ms: self.read_timeout_ms,
            write_timeout_ms: self.write_timeout_ms,
            spin_acquire_timeout_ms: self.spin_acquire_timeout_ms,
        }
    }
}

/// Opens the two rings that make up one full-duplex connection and returns
/// `(in_stream, out_stream)` from the caller's point of view, based on
/// `role`.
pub fn open_pair(base_name: &str, config: &ConnectionConfig) -> Result<(MessageStream, MessageStream), IpcError> {
    open_pair_with_role(base_name, Role::Initiator, config)
}

fn open_pair_with_role(
    base_name: &str,
    role: Role,
    config: &ConnectionConfig,
) -> Result<(MessageStream, MessageStream), IpcError> {
    let a2b = format!("{base_name}.a2b");
    let b2a = format!("{base_name}.b2a");
    let sc = config.stream_config();
    let a2b_stream = MessageStream::open_or_create(&a2b, config.node_count, config.node_size, sc)?;
    let b2a_stream = MessageStream::open_or_create(&b2a, config.node_count, config.node_size, sc)?;
    Ok(match role {
        Role::Initiator => (b2a_stream, a2b_stream), // read b2a, write a2b
        Role::Acceptor => (a2b_stream, b2a_stream),  // read a2b, write b2a
    })
}

type MsgListener<R> = Box<dyn Fn(&R) + Send + Sync>;
type ErrListener = Box<dyn Fn(&IpcError) + Send + Sync>;
type DiscListener = Box<dyn Fn() + Send + Sync>;

struct Listeners<R> {
    on_message: Mutex<Vec<MsgListener<R>>>,
    on_disconnect: Mutex<Vec<DiscListener>>,
    on_error: Mutex<Vec<ErrListener>>,
}

impl<R> Default for Listeners<R> {
    fn default() -> Self {
        Self {
            on_message: Mutex::new(Vec::new()),
            on_disconnect: Mutex::new(Vec::new()),
            on_error: Mutex::new(Vec::new()),
        }
    }
}

struct ConnectionInner<R, W> {
    in_stream: MessageStream,
    out_stream: MessageStream,
    codec_in: Box<dyn Codec<R> + Send + Sync>,
    codec_out: Box<dyn Codec<W> + Send + Sync>,
    state: Mutex<ConnState>,
    notified: AtomicBool,
    write_tx: mpsc::Sender<W>,
    write_rx: Mutex<Option<mpsc::Receiver<W>>>,
    listeners: Listeners<R>,
    read_handle: Mutex<Option<JoinHandle<()>>>,
    write_handle: Mutex<Option<JoinHandle<()>>>,
    open_signal: (Mutex<bool>, Condvar),
    closed_signal: (Mutex<bool>, Condvar),
}

/// Full-duplex connection over a pair of rings. Cloning shares the same
/// underlying pumps and queue (cheap `Arc` clone) — matching the "listeners
/// hold a non-owning handle" cyclic-ownership guidance, a listener closure
/// may clone and hold a `Connection` without keeping the pumps alive any
/// longer than they otherwise would be.
pub struct Connection<R, W>
where
    R: Send + 'static,
    W: Send + 'static,
{
    inner: Arc<ConnectionInner<R, W>>,
}

impl<R, W> Clone for Connection<R, W>
where
    R: Send + 'static,
    W: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, W> Connection<R, W>
where
    R: Send + 'static,
    W: Send + 'static,
{
    pub fn new(
        in_stream: MessageStream,
        out_stream: MessageStream,
        codec_in: Box<dyn Codec<R> + Send + Sync>,
        codec_out: Box<dyn Codec<W> + Send + Sync>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            inner: Arc::new(ConnectionInner {
                in_stream,
                out_stream,
                codec_in,
                codec_out,
                state: Mutex::new(ConnState::New),
                notified: AtomicBool::new(false),
                write_tx: tx,
                write_rx: Mutex::new(Some(rx)),
                listeners: Listeners::default(),
                read_handle: Mutex::new(None),
                write_handle: Mutex::new(None),
                open_signal: (Mutex::new(false), Condvar::new()),
                closed_signal: (Mutex::new(false), Condvar::new()),
            }),
        }
    }

    /// Convenience constructor establishing both rings of one connection
    /// from a shared base name and a role.
    pub fn connect(
        base_name: &str,
        role: Role,
        config: &ConnectionConfig,
        codec_in: Box<dyn Codec<R> + Send + Sync>,
        codec_out: Box<dyn Codec<W> + Send + Sync>,
    ) -> Result<Self, IpcError> {
        let (in_stream, out_stream) = open_pair_with_role(base_name, role, config)?;
        Ok(Self::new(in_stream, out_stream, codec_in, codec_out))
    }

    /// Register a listener fired once per delivered message, in ring order.
    pub fn on_message<F: Fn(&R) + Send + Sync + 'static>(&self, f: F) {
        self.inner.listeners.on_message.lock().unwrap().push(Box::new(f));
    }

    /// Register a listener fired exactly once, after the last `on_message`.
    pub fn on_disconnect<F: Fn() + Send + Sync + 'static>(&self, f: F) {
        self.inner.listeners.on_disconnect.lock().unwrap().push(Box::new(f));
    }

    /// Register a listener fired for every non-fatal pump error.
    pub fn on_error<F: Fn(&IpcError) + Send + Sync + 'static>(&self, f: F) {
        self.inner.listeners.on_error.lock().unwrap().push(Box::new(f));
    }

    /// Starts both background pumps. Transitions `New -> Open`.
    pub fn open(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != ConnState::New {
                return;
            }
            *state = ConnState::Open;
        }

        let rx = self
            .inner
            .write_rx
            .lock()
            .unwrap()
            .take()
            .expect("open() called more than once");

        let read_inner = Arc::clone(&self.inner);
        let read_handle = thread::spawn(move || read_pump(read_inner));

        let write_inner = Arc::clone(&self.inner);
        let write_handle = thread::spawn(move || write_pump(write_inner, rx));

        *self.inner.read_handle.lock().unwrap() = Some(read_handle);
        *self.inner.write_handle.lock().unwrap() = Some(write_handle);

        let (lock, cvar) = &self.inner.open_signal;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
        info!(stream = self.inner.in_stream.name(), "connection open");
    }

    /// Enqueues `w` for the write pump. Never blocks for I/O; silently
    /// dropped if the connection is already closing.
    pub fn push_message(&self, w: W) {
        let _ = self.inner.write_tx.send(w);
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.lock().unwrap() == ConnState::Open
    }

    pub fn state(&self) -> ConnState {
        *self.inner.state.lock().unwrap()
    }

    /// Idempotent. Sets `shutting_down` on both rings, wakes both pumps,
    /// and fires `on_disconnect` exactly once via the "notified" flag.
    pub fn close(&self) {
        close_inner(&self.inner);
    }

    /// Blocks until the connection reaches `Open`, or `timeout` elapses.
    /// Returns `true` if open.
    pub fn wait_open(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &self.inner.open_signal;
        let guard = lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = cvar.wait_timeout(guard, timeout).unwrap();
        *guard
    }

    /// Blocks until the connection reaches `Closed`, or `timeout` elapses.
    /// Returns `true` if closed.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &self.inner.closed_signal;
        let guard = lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = cvar.wait_timeout(guard, timeout).unwrap();
        *guard
    }
}

fn close_inner<R, W>(inner: &Arc<ConnectionInner<R, W>>)
where
    R: Send + 'static,
    W: Send + 'static,
{
    if inner.notified.swap(true, Ordering::AcqRel) {
        return; // already closing/closed
    }

    {
        let mut state = inner.state.lock().unwrap();
        *state = ConnState::Closing;
    }
    inner.in_stream.close();
    inner.out_stream.close();

    let read_handle = inner.read_handle.lock().unwrap().take();
    let write_handle = inner.write_handle.lock().unwrap().take();
    let closer_inner = Arc::clone(inner);

    // Join from a dedicated thread: close() may itself be invoked from
    // within a pump thread (e.g. a user on_message handler calling
    // conn.close()), and a pump must never join itself.
    thread::spawn(move || {
        if let Some(h) = read_handle {
            let _ = h.join();
        }
        if let Some(h) = write_handle {
            let _ = h.join();
        }
        *closer_inner.state.lock().unwrap() = ConnState::Closed;
        for f in closer_inner.listeners.on_disconnect.lock().unwrap().iter() {
            f();
        }
        let (lock, cvar) = &closer_inner.closed_signal;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
        info!("connection closed");
    });
}

fn fire_error<R, W>(inner: &Arc<ConnectionInner<R, W>>, e: &IpcError)
where
    R: Send + 'static,
    W: Send + 'static,
{
    if e.is_recoverable() {
        debug!(error = %e, "connection pump recoverable error");
    } else {
        warn!(error = %e, "connection pump error");
    }
    for f in inner.listeners.on_error.lock().unwrap().iter() {
        f(e);
    }
}

fn read_pump<R, W>(inner: Arc<ConnectionInner<R, W>>)
where
    R: Send + 'static,
    W: Send + 'static,
{
    let frame = FrameCodec::new(&inner.in_stream);
    loop {
        if *inner.state.lock().unwrap() != ConnState::Open {
            break;
        }
        match frame.read_frame(inner.codec_in.as_ref()) {
            Ok(Some(msg)) => {
                for f in inner.listeners.on_message.lock().unwrap().iter() {
                    f(&msg);
                }
            }
            Ok(None) => {
                close_inner(&inner);
                break;
            }
            Err(e) if e.is_fatal() => {
                // CLOSED (mid-frame peer close), INCOMPATIBLE, or IO: tear
                // down without touching on_error — on_disconnect reports
                // this, not on_error.
                close_inner(&inner);
                break;
            }
            Err(e) => {
                fire_error(&inner, &e);
                // TIMEOUT is expected idle behavior; keep polling.
            }
        }
    }
}

const WRITE_POLL: Duration = Duration::from_millis(50);

fn write_pump<R, W>(inner: Arc<ConnectionInner<R, W>>, rx: mpsc::Receiver<W>)
where
    R: Send + 'static,
    W: Send + 'static,
{
    let frame = FrameCodec::new(&inner.out_stream);
    loop {
        match rx.recv_timeout(WRITE_POLL) {
            Ok(msg) => {
                if let Err(e) = frame.write_frame(&msg, inner.codec_out.as_ref()) {
                    if e.is_fatal() {
                        close_inner(&inner);
                        break;
                    }
                    fire_error(&inner, &e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if *inner.state.lock().unwrap() != ConnState::Open {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextCodec;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn unique_name(prefix: &str) -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/ringmem_conn_test_{prefix}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
        )
    }

    #[test]
    fn open_then_push_message_delivers_and_disconnect_fires_once() {
        let base = unique_name("c1");
        let config = ConnectionConfig::default()
            .with_node_count(64)
            .with_node_size(256);

        let server = Connection::<String, String>::connect(
            &base,
            Role::Acceptor,
            &config,
            Box::new(TextCodec),
            Box::new(TextCodec),
        )
        .unwrap();
        let client = Connection::<String, String>::connect(
            &base,
            Role::Initiator,
            &config,
            Box::new(TextCodec),
            Box::new(TextCodec),
        )
        .unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        server.on_message(move |m: &String| {
            received_clone.lock().unwrap().push(m.clone());
        });
        let disconnect_count = Arc::new(AtomicUsize::new(0));
        let dc_clone = Arc::clone(&disconnect_count);
        server.on_disconnect(move || {
            dc_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });

        server.open();
        client.open();
        assert!(client.wait_open(Duration::from_millis(500)));

        client.push_message("hello from client".to_string());

        let deadline = Instant::now() + Duration::from_secs(5);
        while received.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received.lock().unwrap().as_slice(), ["hello from client"]);

        client.close();
        server.close();
        assert!(server.wait_closed(Duration::from_secs(5)));
        assert!(client.wait_closed(Duration::from_secs(5)));
        assert_eq!(disconnect_count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let base = unique_name("c2");
        let config = ConnectionConfig::default()
            .with_node_count(8)
            .with_node_size(64);
        let conn = Connection::<String, String>::connect(
            &base,
            Role::Initiator,
            &config,
            Box::new(TextCodec),
            Box::new(TextCodec),
        )
        .unwrap();
        conn.open();
        conn.close();
        conn.close();
        assert!(conn.wait_closed(Duration::from_secs(5)));
    }
}
