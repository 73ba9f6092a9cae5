// Lifecycle tests for rotor-server
//
// These tests start a real server on an ephemeral loopback port, connect
// plain TCP clients to it and observe what each client reads.

use rotor_common::{Probe, Reply};
use rotor_server::{Connection, HelloHandler, RequestHandler, Server, ServerConfig};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Test Helpers
// ============================================================================

fn config(workers: usize) -> ServerConfig {
    ServerConfig::new()
        .with_address("127.0.0.1")
        .with_port(0)
        .with_workers(workers)
}

/// Start a server and run its accept loop on a background thread
fn start_server<H: RequestHandler>(
    workers: usize,
    handler: H,
) -> (Arc<Server>, thread::JoinHandle<rotor_common::Result<()>>) {
    let server = Arc::new(Server::bind(config(workers), handler).expect("Failed to bind server"));
    let runner = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.run())
    };
    (server, runner)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("Failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("Failed to set read timeout");
    stream
}

fn read_reply(stream: &mut TcpStream) -> Reply {
    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf) {
        Ok(_) => Reply::parse(&buf),
        Err(_) => Reply::Other(buf),
    }
}

fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Normal processing
// ============================================================================

#[test]
fn test_single_client_receives_hello_then_close() {
    let delay = Duration::from_millis(200);
    let (server, runner) = start_server(1, HelloHandler::new().with_reply_delay(delay));

    let start = Instant::now();
    let mut client = connect(server.local_addr());
    assert_eq!(read_reply(&mut client), Reply::Hello);
    assert!(start.elapsed() >= delay);

    server.stop();
    runner.join().unwrap().unwrap();

    let metrics = server.metrics();
    assert_eq!(metrics.accepted, 1);
    assert_eq!(metrics.completed, 1);
    assert!(metrics.is_balanced());
}

#[test]
fn test_client_fetch_against_server() {
    let (server, runner) = start_server(1, HelloHandler::new().with_reply_delay(Duration::ZERO));

    let reply = Probe::new()
        .with_timeout(Duration::from_secs(5))
        .fetch(&server.local_addr().to_string())
        .unwrap();
    assert_eq!(reply, Reply::Hello);

    server.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_round_robin_assignment_in_acceptance_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let handler = move |worker: usize, conn: Connection| {
        record.lock().unwrap().push((conn.id(), worker));
        conn.close();
    };

    let (server, runner) = start_server(2, handler);

    for _ in 0..4 {
        let mut client = connect(server.local_addr());
        read_reply(&mut client);
    }

    server.stop();
    runner.join().unwrap().unwrap();

    let mut assignments = seen.lock().unwrap().clone();
    assignments.sort();
    assert_eq!(assignments, vec![(0, 0), (1, 1), (2, 0), (3, 1)]);

    let metrics = server.metrics();
    assert_eq!(metrics.workers[0].dispatched, 2);
    assert_eq!(metrics.workers[1].dispatched, 2);
}

#[test]
fn test_fifo_within_one_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let handler = move |worker: usize, conn: Connection| {
        thread::sleep(Duration::from_millis(20));
        record.lock().unwrap().push((worker, conn.id()));
        conn.close();
    };

    let (server, runner) = start_server(2, handler);

    let mut clients: Vec<_> = (0..8).map(|_| connect(server.local_addr())).collect();
    for client in &mut clients {
        read_reply(client);
    }

    server.stop();
    runner.join().unwrap().unwrap();

    let seen = seen.lock().unwrap();
    for worker in 0..2 {
        let order: Vec<_> = seen
            .iter()
            .filter(|(w, _)| *w == worker)
            .map(|(_, id)| *id)
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted, "worker {} served out of order", worker);
        assert!(order.iter().all(|id| *id as usize % 2 == worker));
    }
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_queued_connection_rejected_on_shutdown() {
    let delay = Duration::from_millis(500);
    let (server, runner) = start_server(1, HelloHandler::new().with_reply_delay(delay));
    let addr = server.local_addr();

    let mut busy = connect(addr);
    wait_until("first connection to be queued", || server.metrics().workers[0].dispatched == 1);
    thread::sleep(Duration::from_millis(50));

    let mut queued = connect(addr);
    wait_until("second connection to be queued", || server.metrics().workers[0].dispatched == 2);

    let stopper = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.stop())
    };

    assert_eq!(read_reply(&mut queued), Reply::UnexpectedlyClosed);
    assert_eq!(read_reply(&mut busy), Reply::Hello);

    stopper.join().unwrap();
    runner.join().unwrap().unwrap();
    assert!(server.is_terminated());

    let metrics = server.metrics();
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.drained, 1);
    assert!(metrics.is_balanced());
}

#[test]
fn test_every_accepted_connection_closed_exactly_once() {
    let (server, runner) = start_server(3, HelloHandler::new().with_reply_delay(Duration::from_millis(30)));
    let addr = server.local_addr();

    let clients: Vec<_> = (0..12).map(|_| connect(addr)).collect();
    wait_until("all connections to be accepted", || server.metrics().accepted == 12);

    let readers: Vec<_> = clients
        .into_iter()
        .map(|mut client| thread::spawn(move || read_reply(&mut client)))
        .collect();

    thread::sleep(Duration::from_millis(40));
    server.stop();
    runner.join().unwrap().unwrap();

    let replies: Vec<_> = readers.into_iter().map(|r| r.join().unwrap()).collect();
    let hello = replies.iter().filter(|r| **r == Reply::Hello).count() as u64;
    let rejected = replies.iter().filter(|r| **r == Reply::UnexpectedlyClosed).count() as u64;

    let metrics = server.metrics();
    assert!(metrics.is_balanced(), "unbalanced metrics: {:?}", metrics);
    assert_eq!(hello + rejected, 12);
    assert_eq!(hello, metrics.completed);
    assert_eq!(rejected, metrics.drained + metrics.aborted);
}

#[test]
fn test_stop_reports_balanced_metrics_while_clients_keep_arriving() {
    let (server, runner) = start_server(2, |_: usize, conn: Connection| conn.close());
    let addr = server.local_addr();

    let connector = thread::spawn(move || {
        let mut streams = Vec::new();
        for _ in 0..200 {
            match TcpStream::connect(addr) {
                Ok(stream) => streams.push(stream),
                Err(_) => break,
            }
        }
        streams.len()
    });

    wait_until("some connections to be accepted", || server.metrics().accepted >= 5);

    let stopper = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            server.stop();
            server.metrics()
        })
    };

    // Checked before the runner is joined: stop itself must account for
    // everything the accept loop took.
    let metrics = stopper.join().unwrap();
    assert!(server.is_terminated());
    assert!(metrics.is_balanced(), "unbalanced metrics: {:?}", metrics);

    runner.join().unwrap().unwrap();
    connector.join().unwrap();
    let after = server.metrics();
    assert_eq!(after.accepted, metrics.accepted);
    assert_eq!(after.aborted, metrics.aborted);
}

#[test]
fn test_stop_twice_and_concurrently() {
    let (server, runner) = start_server(2, HelloHandler::new());

    let stoppers: Vec<_> = (0..3)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || server.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }
    server.stop();

    runner.join().unwrap().unwrap();
    assert!(server.is_terminated());
    assert_eq!(server.metrics().accepted, 0);
}

#[test]
fn test_stop_handle_request_lets_run_finish_shutdown() {
    let (server, runner) = start_server(2, HelloHandler::new());

    let handle = server.stop_handle();
    handle.request();

    runner.join().unwrap().unwrap();
    assert!(handle.is_complete());
}

#[test]
fn test_broken_peer_does_not_disturb_server() {
    let (server, runner) = start_server(1, HelloHandler::new().with_reply_delay(Duration::from_millis(50)));
    let addr = server.local_addr();

    drop(connect(addr));
    wait_until("dropped connection to be accepted", || server.metrics().accepted == 1);

    let mut client = connect(addr);
    assert_eq!(read_reply(&mut client), Reply::Hello);

    server.stop();
    runner.join().unwrap().unwrap();
    assert_eq!(server.metrics().completed, 2);
}
