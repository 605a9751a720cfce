// CLI entry point for the standalone Partyline relay.
//
// Starts a relay server that game clients connect to. The relay forwards
// every message to all other peers without understanding its content — no
// matchmaking, no authority, no rooms. See `server.rs` for the networking
// architecture.
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>    Listen port (default: 7878)
//     --bind <ADDR>    Bind address (default: 127.0.0.1)
//     --no-relay       Queue messages for poll() only; don't forward to peers

use std::time::Duration;

use partyline_relay::server::{ServerConfig, start_server};

fn main() {
    let config = parse_args();

    let server = match start_server(&config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {}", server.local_addr());
    println!(
        "Forwarding: {}",
        if config.relay { "on" } else { "off (poll only)" }
    );
    println!("Press Ctrl+C to stop.");

    // The process exits on SIGINT/SIGTERM by default, which tears down the
    // accept and receive threads with it — fine for a standalone relay.
    // Meanwhile, drain our own inbox so the relay is observable.
    loop {
        for message in server.poll(64) {
            println!("[{} peers] {}", server.peer_count(), message.event);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--bind" => {
                i += 1;
                config.bind_addr = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--bind requires an address");
                    std::process::exit(1);
                });
            }
            "--no-relay" => {
                config.relay = false;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>    Listen port (default: 7878)");
    println!("  --bind <ADDR>    Bind address (default: 127.0.0.1)");
    println!("  --no-relay       Queue messages for poll() only; don't forward to peers");
    println!("  --help, -h       Show this help");
}
