// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Usage:
//   demo_chat host           (run once, rebroadcasts every message to every
//                              other connected client)
//   demo_chat join <id>      (run per participant, in separate terminals)
//
// The host listens on the well-known name "ipc-chat" via the handshake
// rendezvous and hands each joining client its own connection buffer.
// Joiners type a line and press Enter to broadcast it; "q" quits.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ringmem_ipc::{rendezvous_connect, Connection, ConnectionConfig, Listener, Role, TextCodec};

const WELL_KNOWN_NAME: &str = "/ipc-chat";
const QUIT: &str = "q";

fn run_host() {
    let listener: Listener<String, String, TextCodec, TextCodec> =
        Listener::bind(WELL_KNOWN_NAME, ConnectionConfig::default());
    let peers: Arc<Mutex<Vec<Connection<String, String>>>> = Arc::new(Mutex::new(Vec::new()));
    println!("chat host ready on {WELL_KNOWN_NAME}");

    loop {
        let conn = match listener.accept(Duration::from_secs(3600)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("accept failed: {e}");
                continue;
            }
        };
        let peers_for_msg = Arc::clone(&peers);
        conn.on_message(move |msg: &String| {
            println!("{msg}");
            // Clients filter out their own messages by id prefix, so the
            // host rebroadcasts to every peer including the sender.
            for p in peers_for_msg.lock().unwrap().iter() {
                p.push_message(msg.clone());
            }
        });
        peers.lock().unwrap().push(conn.clone());
        println!("client joined ({} total)", peers.lock().unwrap().len());
    }
}

fn run_join(id: &str) {
    let conn = rendezvous_connect::<String, String, TextCodec, TextCodec>(
        WELL_KNOWN_NAME,
        &ConnectionConfig::default(),
        Duration::from_secs(30),
    )
    .expect("rendezvous connect");

    let id_recv = id.to_string();
    conn.on_message(move |msg: &String| {
        if let Some((from_id, _)) = msg.split_once("> ") {
            if from_id == id_recv {
                return; // skip echoes of our own messages
            }
        }
        println!("{msg}");
    });
    conn.open();
    conn.wait_open(Duration::from_secs(30));
    println!("{id} is ready.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.trim().is_empty() {
            break;
        }
        let trimmed = line.trim();
        if trimmed == QUIT {
            break;
        }
        conn.push_message(format!("{id}> {trimmed}"));
    }
    conn.close();
    conn.wait_closed(Duration::from_secs(5));
    println!("{id} is quit...");
}

fn main() {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("host") => run_host(),
        Some("join") => {
            let id = args.get(2).cloned().unwrap_or_else(|| "anon".to_string());
            run_join(&id);
        }
        _ => {
            eprintln!("usage: demo_chat host");
            eprintln!("       demo_chat join <id>");
            std::process::exit(1);
        }
    }
}
