//! Mock vehicle position API for testing tramlights
//!
//! Usage: cargo run -p tramlights-mock-feed-server
//! Then run tramlights with --endpoint http://127.0.0.1:35080/

use clap::Parser;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tramlights_feed_lib::{branch_for_headsign, VehiclePosition, ROUTE_ID};
use tramlights_position_lib::Branch;

/// Simulated tram speed in track units per second
const SPEED: u64 = 25;

/// Clients that stall mid-request are dropped after this
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(name = "tramlights-mock-feed-server")]
#[command(about = "Serve simulated tram line A vehicle positions")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:35080")]
    bind: String,

    /// Vehicles per branch
    #[arg(short, long, default_value = "3")]
    trams: u64,

    /// Answer every Nth request with an empty body (0 = never)
    #[arg(long, default_value = "0")]
    empty_every: u64,
}

struct Shared {
    args: Args,
    start_time: Instant,
    requests: AtomicU64,
    read_timeout: Duration,
}

fn main() {
    let args = Args::parse();
    println!("Mock feed starting on {}...", args.bind);
    let listener = TcpListener::bind(&args.bind).expect("Failed to bind");
    println!("Mock feed ready - {} trams per branch", args.trams);

    let shared = Arc::new(Shared {
        args,
        start_time: Instant::now(),
        requests: AtomicU64::new(0),
        read_timeout: READ_TIMEOUT,
    });

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || handle_client(stream, &shared));
            }
            Err(e) => eprintln!("Connection error: {e}"),
        }
    }
}

fn handle_client(mut stream: TcpStream, shared: &Shared) {
    if let Err(e) = stream.set_read_timeout(Some(shared.read_timeout)) {
        eprintln!("Socket error: {e}");
        return;
    }
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(e) => {
            eprintln!("Clone error: {e}");
            return;
        }
    };

    let mut request_line = String::new();
    if let Err(e) = reader.read_line(&mut request_line) {
        eprintln!("Read error: {e}");
        return;
    }
    // Drain headers up to the blank line
    let mut header = String::new();
    loop {
        header.clear();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header.trim().is_empty() => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Read error: {e}");
                return;
            }
        }
    }

    let request_line = request_line.trim();
    println!("RX: {request_line}");
    let n = shared.requests.fetch_add(1, Ordering::Relaxed) + 1;
    let (status, body) = if shared.args.empty_every != 0 && n % shared.args.empty_every == 0 {
        ("200 OK", String::new())
    } else {
        respond(
            request_line,
            shared.args.trams,
            shared.start_time.elapsed().as_secs(),
        )
    };
    println!("TX: {status} ({} bytes)", body.len());

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        eprintln!("Write error: {e}");
    }
}

/// Status line and body for one request line such as
/// `GET /path?format=json&route_id=A&trip_headsign=porte+de+gouesnou HTTP/1.1`
fn respond(request_line: &str, trams: u64, elapsed_secs: u64) -> (&'static str, String) {
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return ("400 Bad Request", String::new());
    };
    let query = target.split_once('?').map_or("", |(_, q)| q);
    let params = parse_query(query);
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let Some(headsign) = param("trip_headsign") else {
        return ("400 Bad Request", String::new());
    };
    let Some(branch) = branch_for_headsign(headsign) else {
        return ("404 Not Found", String::new());
    };
    if param("route_id").is_some_and(|r| !r.eq_ignore_ascii_case(ROUTE_ID)) {
        return ("200 OK", "[]".to_string());
    }

    let vehicles = simulated_vehicles(branch, trams, elapsed_secs);
    match serde_json::to_string(&vehicles) {
        Ok(json) => ("200 OK", json),
        Err(e) => {
            eprintln!("Encode error: {e}");
            ("500 Internal Server Error", String::new())
        }
    }
}

/// Split a query string into decoded key/value pairs
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

/// Form decoding: `+` is a space, `%XX` a byte
fn decode_component(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00");
                out.push(u8::from_str_radix(hex, 16).unwrap_or_default());
                i += 3;
                continue;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Evenly spaced vehicles moving along the branch.
///
/// Positions wrap before the terminus so every vehicle stays on the strip.
fn simulated_vehicles(branch: Branch, trams: u64, elapsed_secs: u64) -> Vec<VehiclePosition> {
    let max = branch.max_track_position().unsigned_abs();
    let id_base = match branch {
        Branch::PlouzaneBound => 1000,
        Branch::GouesnouBound => 2000,
        Branch::GuipavasBound => 3000,
    };

    (0..trams)
        .map(|i| {
            let pos = (i * max / trams.max(1) + elapsed_secs * SPEED) % max;
            // Alternate Plouzané-bound vehicles between the two spurs
            let cape = match branch {
                Branch::PlouzaneBound if i % 2 == 0 => "230",
                Branch::PlouzaneBound => "100",
                _ => "045",
            };
            VehiclePosition {
                id_vehicle: Some(Value::String((id_base + i).to_string())),
                pos: Value::String(pos.to_string()),
                cape: Some(Value::String(cape.to_string())),
            }
        })
        .collect()
}
