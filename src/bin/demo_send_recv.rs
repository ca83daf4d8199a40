// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Usage:
//   demo_send_recv send <size> <interval_ms>
//   demo_send_recv recv <interval_ms>
//
// Two processes rendezvous on a connection base name "demo-send-recv". The
// sender fills a buffer of <size> bytes with 'A' and pushes it every
// <interval_ms> milliseconds. The receiver prints the size of each frame it
// gets via `on_message`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringmem_ipc::{BytesCodec, Connection, ConnectionConfig, Role};

const BASE_NAME: &str = "/demo-send-recv";

fn do_send(size: usize, interval_ms: u64, quit: Arc<AtomicBool>) {
    let conn = Connection::<Vec<u8>, Vec<u8>>::connect(
        BASE_NAME,
        Role::Initiator,
        &ConnectionConfig::default(),
        Box::new(BytesCodec),
        Box::new(BytesCodec),
    )
    .expect("connect sender");
    conn.open();
    println!("send: waiting for receiver...");
    conn.wait_open(Duration::from_secs(30));
    println!("send: connected, starting");

    let buffer = vec![b'A'; size];
    while !quit.load(Ordering::Acquire) {
        println!("send size: {}", buffer.len());
        conn.push_message(buffer.clone());
        thread::sleep(Duration::from_millis(interval_ms));
    }
    conn.close();
}

fn do_recv(_interval_ms: u64, quit: Arc<AtomicBool>) {
    let conn = Connection::<Vec<u8>, Vec<u8>>::connect(
        BASE_NAME,
        Role::Acceptor,
        &ConnectionConfig::default(),
        Box::new(BytesCodec),
        Box::new(BytesCodec),
    )
    .expect("connect receiver");
    conn.on_message(|buf: &Vec<u8>| println!("recv size: {}", buf.len()));
    conn.open();
    println!("recv: waiting for messages...");

    while !quit.load(Ordering::Acquire) && conn.is_connected() {
        thread::sleep(Duration::from_millis(100));
    }
    conn.close();
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: demo_send_recv send <size> <interval_ms>");
        eprintln!("       demo_send_recv recv <interval_ms>");
        std::process::exit(1);
    }

    tracing_subscriber::fmt::init();

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        ctrlc_or_sigterm(move || q.store(true, Ordering::Release));
    }

    match args[1].as_str() {
        "send" => {
            if args.len() < 4 {
                eprintln!("usage: demo_send_recv send <size> <interval_ms>");
                std::process::exit(1);
            }
            let size: usize = args[2].parse().expect("size");
            let interval: u64 = args[3].parse().expect("interval");
            do_send(size, interval, quit);
        }
        "recv" => {
            let interval: u64 = args[2].parse().expect("interval");
            do_recv(interval, quit);
        }
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }
}

// Minimal cross-platform signal hook: sets the flag on SIGINT / SIGTERM.
fn ctrlc_or_sigterm(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::Mutex;
        static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = f;
    }
}

#[cfg(unix)]
extern crate libc;
