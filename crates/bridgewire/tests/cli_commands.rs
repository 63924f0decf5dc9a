#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bson::{doc, Bson, Document};

fn unique_temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "bwcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn read_document(stream: &mut TcpStream) -> Option<Document> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).ok()?;
    let len = i32::from_le_bytes(prefix) as usize;
    let mut bytes = prefix.to_vec();
    bytes.resize(len, 0);
    stream.read_exact(&mut bytes[4..]).ok()?;
    Document::from_reader(&mut bytes.as_slice()).ok()
}

fn write_document(stream: &mut TcpStream, document: &Document) {
    let mut out = Vec::new();
    document.to_writer(&mut out).expect("reply should encode");
    stream.write_all(&out).expect("reply should send");
}

fn as_i64(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

/// Single-connection TCP bridge speaking BSON.
///
/// `/add_two_ints` answers with the sum, `/silent` never answers, every other
/// service fails. Subscribing to `/chatter` delivers one message. Returns the
/// `op` of every received document once the client hangs up.
fn spawn_bridge() -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bridge should bind");
    let addr = listener.local_addr().expect("bridge should have an address");

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("bridge should accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("read timeout should apply");
        let mut ops = Vec::new();

        while let Some(request) = read_document(&mut stream) {
            let op = request.get_str("op").unwrap_or_default().to_string();
            let id = request.get_str("id").unwrap_or_default().to_string();

            if op == "call_service" {
                let service = request.get_str("service").unwrap_or_default().to_string();
                let reply = match service.as_str() {
                    "/add_two_ints" => {
                        let args = request.get_document("args").cloned().unwrap_or_default();
                        let sum = as_i64(args.get("a")) + as_i64(args.get("b"));
                        Some(doc! {
                            "op": "service_response",
                            "id": id,
                            "service": service,
                            "values": { "sum": sum },
                            "result": true,
                        })
                    }
                    "/silent" => None,
                    _ => Some(doc! {
                        "op": "service_response",
                        "id": id,
                        "service": service,
                        "values": "service does not exist",
                        "result": false,
                    }),
                };
                if let Some(reply) = reply {
                    write_document(&mut stream, &reply);
                }
            } else if op == "subscribe" && request.get_str("topic").ok() == Some("/chatter") {
                write_document(
                    &mut stream,
                    &doc! {
                        "op": "publish",
                        "topic": "/chatter",
                        "msg": { "data": "hi from bridge" },
                    },
                );
            }

            ops.push(op);
        }

        ops
    });

    (addr, handle)
}

fn bridgewire(addr: SocketAddr, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bridgewire"))
        .env_remove("BRIDGEWIRE_ENCODING")
        .env_remove("BRIDGEWIRE_TRANSPORT")
        .env_remove("BRIDGEWIRE_ENDPOINT")
        .args(["--log-level", "error", "--format", "json"])
        .args(["--transport", "tcp", "--encoding", "bson"])
        .args(["--endpoint", &addr.to_string()])
        .args(args)
        .output()
        .expect("bridgewire should run")
}

#[test]
fn probe_round_trip_reports_sum_and_logs_latency() {
    let (addr, bridge) = spawn_bridge();
    let log_file = unique_temp_path("probe.log");

    let output = bridgewire(
        addr,
        &["probe", "--log-file", log_file.to_str().expect("utf-8 temp path")],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("probe should emit json");
    assert_eq!(report["response"]["sum"], 42);
    assert_eq!(report["class"], "ok");
    assert_eq!(report["encoding"], "bson");
    assert_eq!(report["transport"], "tcp");

    let ops = bridge.join().expect("bridge thread should finish");
    assert_eq!(ops, ["advertise", "publish", "call_service", "unadvertise"]);

    let log = std::fs::read_to_string(&log_file).expect("log file should exist");
    assert!(log.starts_with("--------------\n---- Test ----\n"));
    assert!(log.lines().last().unwrap_or_default().starts_with("ok: 0m"));
    let _ = std::fs::remove_file(log_file);
}

#[test]
fn probe_loop_runs_requested_rounds() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(addr, &["probe", "--loop", "3"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 3);

    let ops = bridge.join().expect("bridge thread should finish");
    let calls = ops.iter().filter(|op| *op == "call_service").count();
    let advertises = ops.iter().filter(|op| *op == "advertise").count();
    assert_eq!(calls, 3);
    assert_eq!(advertises, 1);
}

#[test]
fn call_prints_service_values() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(addr, &["call", "/add_two_ints", "--json", "{\"a\":1,\"b\":2}"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let printed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("call should emit json");
    assert_eq!(printed["kind"], "service_response");
    assert_eq!(printed["source"], "/add_two_ints");
    assert_eq!(printed["payload"]["sum"], 3);
    bridge.join().expect("bridge thread should finish");
}

#[test]
fn failing_service_exits_1() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(addr, &["call", "/missing"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("service does not exist"));
    bridge.join().expect("bridge thread should finish");
}

#[test]
fn silent_service_times_out_with_124() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(addr, &["--timeout", "200ms", "call", "/silent"]);

    assert_eq!(output.status.code(), Some(124));
    bridge.join().expect("bridge thread should finish");
}

#[test]
fn echo_prints_delivery_then_exits() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(addr, &["echo", "/chatter", "std_msgs/String", "--count", "1"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let printed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("echo should emit json");
    assert_eq!(printed["kind"], "delivery");
    assert_eq!(printed["payload"]["data"], "hi from bridge");

    let ops = bridge.join().expect("bridge thread should finish");
    assert_eq!(ops, ["advertise", "subscribe", "unsubscribe", "unadvertise"]);
}

#[test]
fn publish_sends_advertise_then_payload() {
    let (addr, bridge) = spawn_bridge();

    let output = bridgewire(
        addr,
        &["publish", "/chatter", "std_msgs/String", "--json", "{\"data\":\"x\"}"],
    );

    assert!(output.status.success());
    let ops = bridge.join().expect("bridge thread should finish");
    assert_eq!(ops, ["advertise", "publish", "unadvertise"]);
}

#[test]
fn publish_rejects_invalid_json_with_64() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("address should resolve");

    let output = bridgewire(addr, &["publish", "/chatter", "std_msgs/String", "--json", "{"]);

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unreachable_bridge_exits_3() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener.local_addr().expect("address should resolve")
    };

    let output = bridgewire(addr, &["call", "/add_two_ints"]);

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_bridgewire"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("bridgewire {}", env!("CARGO_PKG_VERSION"))
    );
}
