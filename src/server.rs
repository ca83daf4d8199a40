// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// One concrete implementation of the external `HandshakeRendezvous`
// contract (component C8) plus an optional `ServiceDirectory` companion.
// `Listener` is grounded in the four-step rendezvous spec.md §4.6
// describes; `ServiceDirectory` is grounded in the teacher's
// `proto::service_registry` (SHM-backed array of named entries with
// spinlock mutual exclusion and PID-liveness checks).

use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::codec::{Codec, TextCodec};
use crate::connection::{Connection, ConnectionConfig, Role};
use crate::error::IpcError;
use crate::frame::FrameCodec;
use crate::mmap::{MmapRegion, ShmOpenMode};
use crate::stream::{MessageStream, StreamConfig};

const HANDSHAKE_NODE_COUNT: u32 = 3;
const HANDSHAKE_NODE_SIZE: u32 = 4096;
const HANDSHAKE_RETRY_SLEEP: Duration = Duration::from_millis(5);
/// Best-effort grace period between writing the per-connection buffer name
/// into the handshake buffer and closing it, giving the client time to
/// read it first. This does not eliminate the race (O4-adjacent design
/// limitation, see DESIGN.md): a client that is slow to call its matching
/// `open` can still lose the race against the handshake buffer's teardown.
const HANDSHAKE_GRACE: Duration = Duration::from_millis(50);

/// A listener on a well-known buffer name, accepting clients per the
/// four-step rendezvous in spec.md §4.6.
pub struct Listener<R, W, CIn, COut>
where
    R: Send + 'static,
    W: Send + 'static,
    CIn: Codec<R> + Default + Send + Sync + 'static,
    COut: Codec<W> + Default + Send + Sync + 'static,
{
    name: String,
    config: ConnectionConfig,
    shutdown: AtomicBool,
    next_id: AtomicUsize,
    connections: Mutex<Vec<Connection<R, W>>>,
    _codecs: PhantomData<(CIn, COut)>,
}

impl<R, W, CIn, COut> Listener<R, W, CIn, COut>
where
    R: Send + 'static,
    W: Send + 'static,
    CIn: Codec<R> + Default + Send + Sync + 'static,
    COut: Codec<W> + Default + Send + Sync + 'static,
{
    pub fn bind(name: &str, config: ConnectionConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            shutdown: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            _codecs: PhantomData,
        }
    }

    /// Blocks up to `timeout`, polling `shutdown()` once per retry
    /// interval (O4: no dummy-client teardown trick).
    pub fn accept(&self, timeout: Duration) -> Result<Connection<R, W>, IpcError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(IpcError::Closed {
                    name: self.name.clone(),
                });
            }
            if Instant::now() >= deadline {
                return Err(IpcError::Timeout {
                    name: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            let handshake = match MessageStream::open_or_create(
                &self.name,
                HANDSHAKE_NODE_COUNT,
                HANDSHAKE_NODE_SIZE,
                StreamConfig::default(),
            ) {
                Ok(s) => s,
                Err(_) => {
                    std::thread::sleep(HANDSHAKE_RETRY_SLEEP);
                    continue;
                }
            };

            let conn_name = self.generate_buffer_name();
            let frame = FrameCodec::new(&handshake);
            frame.write_frame(&conn_name, &TextCodec)?;
            std::thread::sleep(HANDSHAKE_GRACE);
            handshake.close();
            debug!(listener = self.name, conn_name, "handed out connection buffer name");

            let conn = Connection::connect(
                &conn_name,
                Role::Acceptor,
                &self.config,
                Box::new(CIn::default()),
                Box::new(COut::default()),
            )?;
            conn.open();
            self.connections.lock().unwrap().push(conn.clone());
            return Ok(conn);
        }
    }

    /// Fans `msg` out to every connection's write queue.
    pub fn broadcast(&self, msg: W)
    where
        W: Clone,
    {
        let conns = self.connections.lock().unwrap();
        for c in conns.iter() {
            c.push_message(msg.clone());
        }
    }

    /// Signals a blocked or future `accept()` call to return `CLOSED`.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn generate_buffer_name(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}.client{}.{}", self.name, std::process::id(), id)
    }
}

/// Client-side half of the rendezvous: reads the per-connection buffer
/// name from the well-known handshake buffer and opens it.
pub fn rendezvous_connect<R, W, CIn, COut>(
    well_known_name: &str,
    config: &ConnectionConfig,
    timeout: Duration,
) -> Result<Connection<R, W>, IpcError>
where
    R: Send + 'static,
    W: Send + 'static,
    CIn: Codec<R> + Default + Send + Sync + 'static,
    COut: Codec<W> + Default + Send + Sync + 'static,
{
    let handshake = MessageStream::open_or_create(
        well_known_name,
        HANDSHAKE_NODE_COUNT,
        HANDSHAKE_NODE_SIZE,
        StreamConfig::default().with_read_timeout(timeout),
    )?;
    let frame = FrameCodec::new(&handshake);
    let conn_name = frame
        .read_frame(&TextCodec)?
        .ok_or_else(|| IpcError::Closed {
            name: well_known_name.to_string(),
        })?;

    Connection::connect(
        &conn_name,
        Role::Initiator,
        config,
        Box::new(CIn::default()),
        Box::new(COut::default()),
    )
}

// ---------------------------------------------------------------------------
// ServiceDirectory — optional companion: logical-name -> buffer-name lookup
// ---------------------------------------------------------------------------

pub const MAX_SERVICES: usize = 32;
const MAX_NAME_LEN: usize = 64;
const MAX_BUFFER_NAME_LEN: usize = 96;

#[repr(C)]
struct ServiceSlot {
    pid: AtomicI32,
    registered_at: i64,
    name: [u8; MAX_NAME_LEN],
    buffer_name: [u8; MAX_BUFFER_NAME_LEN],
}

#[repr(C)]
struct DirectoryLayout {
    spinlock: AtomicI32,
    slots: [ServiceSlot; MAX_SERVICES],
}

fn dir_lock(layout: &DirectoryLayout) {
    while layout
        .spinlock
        .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        std::hint::spin_loop();
    }
}

fn dir_unlock(layout: &DirectoryLayout) {
    layout.spinlock.store(0, Ordering::Release);
}

#[cfg(unix)]
fn is_pid_alive(pid: i32) -> bool {
    let ret = unsafe { libc::kill(pid, 0) };
    ret == 0 || io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(windows)]
fn is_pid_alive(pid: i32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, STILL_ACTIVE,
    };
    unsafe {
        let h = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid as u32);
        if h == 0 {
            return false;
        }
        let mut code: u32 = 0;
        let ok = GetExitCodeProcess(h, &mut code) != 0 && code == STILL_ACTIVE as u32;
        CloseHandle(h);
        ok
    }
}

fn copy_fixed(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    let n = bytes.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&bytes[..n]);
    dst[n] = 0;
}

fn read_fixed(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// A well-known, SHM-backed directory mapping logical service names to the
/// handshake buffer name a client should use to rendezvous with that
/// service, plus the owning PID for liveness checks. Registration persists
/// only while the registering process holds its `ServiceDirectory` handle.
pub struct ServiceDirectory {
    region: MmapRegion,
}

impl ServiceDirectory {
    pub fn open(name: &str) -> Result<Self, IpcError> {
        let size = std::mem::size_of::<DirectoryLayout>();
        let region =
            MmapRegion::open(name, size, ShmOpenMode::CreateOrOpen).map_err(|e| IpcError::Io {
                name: name.to_string(),
                source: e,
            })?;
        if region.is_owner() {
            unsafe {
                std::ptr::write_bytes(region.as_mut_ptr(), 0, size);
            }
        }
        Ok(Self { region })
    }

    fn layout(&self) -> &DirectoryLayout {
        unsafe { &*(self.region.as_ptr() as *const DirectoryLayout) }
    }

    /// Registers `service_name -> buffer_name` under the current process's
    /// PID, reusing a dead entry's slot if the table is full.
    pub fn register(&self, service_name: &str, buffer_name: &str) -> bool {
        let layout = self.layout();
        dir_lock(layout);
        let pid = std::process::id() as i32;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut target: Option<usize> = None;
        for (i, slot) in layout.slots.iter().enumerate() {
            let existing_pid = slot.pid.load(Ordering::Relaxed);
            if existing_pid == 0 || !is_pid_alive(existing_pid) {
                target = Some(i);
                break;
            }
        }
        let ok = if let Some(i) = target {
            let slot = &layout.slots[i];
            let slot_ptr = slot as *const ServiceSlot as *mut ServiceSlot;
            unsafe {
                copy_fixed(&mut (*slot_ptr).name, service_name);
                copy_fixed(&mut (*slot_ptr).buffer_name, buffer_name);
                (*slot_ptr).registered_at = now;
            }
            slot.pid.store(pid, Ordering::Release);
            true
        } else {
            false
        };
        dir_unlock(layout);
        if ok {
            info!(service = service_name, buffer_name, "registered service");
        }
        ok
    }

    /// Looks up a live entry by logical service name.
    pub fn lookup(&self, service_name: &str) -> Option<String> {
        let layout = self.layout();
        dir_lock(layout);
        let mut found = None;
        for slot in layout.slots.iter() {
            let pid = slot.pid.load(Ordering::Acquire);
            if pid != 0 && is_pid_alive(pid) && read_fixed(&slot.name) == service_name {
                found = Some(read_fixed(&slot.buffer_name));
                break;
            }
        }
        dir_unlock(layout);
        found
    }

    /// Removes every entry owned by the current process.
    pub fn deregister(&self, service_name: &str) {
        let layout = self.layout();
        dir_lock(layout);
        let pid = std::process::id() as i32;
        for slot in layout.slots.iter() {
            if slot.pid.load(Ordering::Relaxed) == pid && read_fixed(&slot.name) == service_name {
                slot.pid.store(0, Ordering::Release);
            }
        }
        dir_unlock(layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextCodec;
    use std::sync::atomic::AtomicUsize as TestCounter;

    fn unique_name(prefix: &str) -> String {
        static COUNTER: TestCounter = TestCounter::new(0);
        format!(
            "/ringmem_server_test_{prefix}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn service_directory_register_and_lookup() {
        let name = unique_name("dir1");
        let dir = ServiceDirectory::open(&name).unwrap();
        assert!(dir.register("echo", "/echo.buffer.1"));
        assert_eq!(dir.lookup("echo").as_deref(), Some("/echo.buffer.1"));
        assert_eq!(dir.lookup("missing"), None);
        dir.deregister("echo");
        assert_eq!(dir.lookup("echo"), None);
    }

    #[test]
    fn handshake_round_trip() {
        let name = unique_name("hs1");
        let config = ConnectionConfig::default()
            .with_node_count(64)
            .with_node_size(256);
        let listener: Listener<String, String, TextCodec, TextCodec> =
            Listener::bind(&name, config);

        let accept_thread = {
            let listener_name = name.clone();
            std::thread::spawn(move || {
                let config = ConnectionConfig::default()
                    .with_node_count(64)
                    .with_node_size(256);
                let listener: Listener<String, String, TextCodec, TextCodec> =
                    Listener::bind(&listener_name, config);
                listener.accept(Duration::from_secs(5))
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        let client = rendezvous_connect::<String, String, TextCodec, TextCodec>(
            &name,
            &ConnectionConfig::default().with_node_count(64).with_node_size(256),
            Duration::from_secs(5),
        );

        let server_conn = accept_thread.join().unwrap();
        assert!(server_conn.is_ok());
        assert!(client.is_ok());
        let _ = listener;
    }
}
