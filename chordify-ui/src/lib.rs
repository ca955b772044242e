// Interactive and batch CLI surfaces. Grammar and output
// shapes follow original_source/chord.py's process_command /
// print_status / print_help: case-insensitive comma-separated
// commands, one per line.

use std::io::{BufRead, Write};
use std::path::Path;

use chordify_ring::NodeState;
use chordify_store::LocalStore;
use tracing::info;

/// Run the interactive REPL on stdin/stdout until `exit` or EOF.
pub fn run_interactive(state: &NodeState, store: &dyn LocalStore) {
    println!("Chord DHT CLI - enter commands ('help' for reference)");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {
                if process_command(line.trim(), state, store) {
                    break;
                }
            }
            Err(e) => {
                println!("error reading command: {e}");
                break;
            }
        }
    }
}

/// Run the batch driver over a file of comma-separated commands, one
/// per line, accepting the same grammar as the interactive REPL.
pub fn run_batch(state: &NodeState, store: &dyn LocalStore, path: &Path) -> chordify_base::Result<()> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if process_command(line, state, store) {
            break;
        }
    }
    Ok(())
}

/// Processes one command line; returns true if the CLI should stop
/// (exit command or a graceful depart request).
fn process_command(line: &str, state: &NodeState, store: &dyn LocalStore) -> bool {
    let parts: Vec<&str> = line.split(',').map(|p| p.trim()).collect();
    if parts.is_empty() || parts[0].is_empty() {
        return false;
    }
    match parts[0].to_lowercase().as_str() {
        "exit" => {
            println!("Departing.");
            if let Err(e) = chordify_ring::depart(state) {
                println!("error during depart: {e:?}");
            }
            return true;
        }
        "help" => print_help(),
        "status" => print_status(state, store),
        "greet" => process_greet(&parts, state),
        "insert" => process_insert(&parts, state),
        "delete" => process_delete(&parts, state),
        "query" => process_query(&parts, state, store),
        other => println!("invalid command: {other}"),
    }
    false
}

fn print_help() {
    println!("Available commands:");
    println!("  help - Display this help message");
    println!("  status - Show node status and ring structure");
    println!("  greet, [<ip>], [<port>] - Greet another node (default: 127.0.0.1:5000)");
    println!("  insert, <key> [, <value>] - Store key-value pair in the ring");
    println!("  delete, <key> - Remove an entry from the ring");
    println!("  query, <key> - Retrieve a value from the ring; query \"*\" for everything");
    println!("  exit - Leave the network and shut down");
}

fn print_status(state: &NodeState, store: &dyn LocalStore) {
    println!("\nNetwork status:");
    println!("  self:        {}", state.self_pos.id);
    println!("  successor:   {}", state.successor().id);
    println!("  predecessor: {}", state.predecessor().id);
    println!("\nLocal storage:");
    match store.all_entries() {
        Ok(entries) => {
            for entry in entries {
                println!("  {}: {}", entry.key, entry.value);
            }
        }
        Err(e) => println!("  error reading local store: {e:?}"),
    }
}

fn process_greet(parts: &[&str], state: &NodeState) {
    let ip: std::net::Ipv4Addr = parts
        .get(1)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(std::net::Ipv4Addr::new(127, 0, 0, 1));
    let port: u16 = parts
        .get(2)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    match chordify_ring::greet(state, ip, port) {
        Ok(msg) => println!("greet reply from {ip}:{port}: {msg}"),
        Err(e) => {
            info!(target: "chordify", error = %e, "greet failed");
            println!("greet to {ip}:{port} failed: {e:?}");
        }
    }
}

fn process_insert(parts: &[&str], state: &NodeState) {
    let Some(key) = parts.get(1).filter(|s| !s.is_empty()) else {
        println!("missing key for insertion");
        return;
    };
    let value = parts.get(2).copied().unwrap_or("");
    match chordify_ring::insert(state, key, value) {
        Ok(_) => println!("inserted: {key} => {value}"),
        Err(e) => println!("insert failed: {e:?}"),
    }
}

fn process_delete(parts: &[&str], state: &NodeState) {
    let Some(key) = parts.get(1).filter(|s| !s.is_empty()) else {
        println!("missing key for deletion");
        return;
    };
    match chordify_ring::delete(state, key) {
        Ok(_) => println!("deleted: {key}"),
        Err(e) => println!("delete failed: {e:?}"),
    }
}

fn process_query(parts: &[&str], state: &NodeState, store: &dyn LocalStore) {
    let Some(key) = parts.get(1).filter(|s| !s.is_empty()) else {
        println!("missing key for query");
        return;
    };
    if *key == "*" {
        match chordify_ring::query_all(state, store) {
            Ok(entries) => {
                println!("all entries:");
                for (key, value) in entries {
                    println!("  {key}: {value}");
                }
            }
            Err(e) => println!("query_all failed: {e:?}"),
        }
        return;
    }
    match chordify_ring::query(state, key) {
        Ok(result) => match result.value {
            Some(value) => println!("query result for {key}: {value}"),
            None => println!("query result for {key}: not found"),
        },
        Err(e) => println!("query failed: {e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordify_base::{ConsistencyType, Policy, RingPosition};
    use chordify_store::{RedbStore, StoredEntry};
    use std::net::Ipv4Addr;
    use test_log::test;

    fn temp_state_and_store() -> (tempfile::TempDir, NodeState, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("s.redb")).unwrap();
        let self_pos = RingPosition::new(Ipv4Addr::LOCALHOST, 5000);
        let state = NodeState::bootstrap(self_pos, Policy::new(ConsistencyType::Eventual, 1));
        (dir, state, store)
    }

    /// Commands like `insert`/`query` round-trip over loopback to this
    /// node's own accept loop (self-forwarding), so exercising
    /// them needs a real listener dispatching through chordify-ring.
    fn running_state_and_store() -> (tempfile::TempDir, &'static NodeState, std::sync::Arc<RedbStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(RedbStore::open(dir.path().join("s.redb")).unwrap());
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let self_pos = RingPosition::new(Ipv4Addr::LOCALHOST, port);
        let state: &'static NodeState = Box::leak(Box::new(NodeState::bootstrap(
            self_pos,
            Policy::new(ConsistencyType::Eventual, 1),
        )));
        let dispatch_store = std::sync::Arc::clone(&store);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                if let Ok(envelope) = chordify_net::read_envelope(&mut stream) {
                    chordify_ring::dispatch(state, dispatch_store.as_ref(), true, envelope);
                }
            }
        });
        (dir, state, store)
    }

    #[test]
    fn help_and_blank_lines_do_not_request_exit() {
        let (_dir, state, store) = temp_state_and_store();
        assert!(!process_command("help", &state, &store));
        assert!(!process_command("", &state, &store));
        assert!(!process_command("status", &state, &store));
    }

    #[test]
    fn exit_command_requests_stop() {
        let (_dir, state, store) = temp_state_and_store();
        assert!(process_command("exit", &state, &store));
    }

    #[test]
    fn insert_then_query_round_trips_through_the_cli_grammar() {
        // insert/query self-forward over a real loopback connection, so
        // this needs an accept loop actually dispatching into the store,
        // unlike the other commands exercised against a bare state.
        let (_dir, state, store) = running_state_and_store();
        // insert() blocks until the insertion_response arrives, so the
        // dispatch handler has already applied the effect by the time
        // process_command returns.
        assert!(!process_command("insert, song, a", state, &store));
        assert_eq!(
            store
                .lookup_value_by_hash(chordify_base::Identifier::hash("song"))
                .unwrap(),
            Some("a".to_string())
        );
        assert!(!process_command("query, song", state, &store));
    }

    #[test]
    fn status_reports_local_entries() {
        let (_dir, state, store) = temp_state_and_store();
        store
            .upsert(StoredEntry {
                key: "a".into(),
                key_hash: chordify_base::Identifier::hash("a"),
                value: "1".into(),
            })
            .unwrap();
        // print_status only writes to stdout; this just checks it does
        // not panic against a populated store.
        print_status(&state, &store);
    }
}
