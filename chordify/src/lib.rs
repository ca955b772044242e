// Startup wiring for a Chord node (spec §6 "Startup arguments"): turn
// command-line arguments into a bound TCP listener, a `NodeState`
// (bootstrap or joined), a local store, a background accept loop, and
// the CLI surface from `chordify-ui`. Mirrors the shape of
// `original_source/chord.py`'s `main()` plus the CLI-driving daemon
// thread, translated into the teacher's module layout.

use std::net::{Ipv4Addr, TcpListener, TcpStream, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use chordify_base::{ConsistencyType, Policy, RingPosition};
use chordify_net::read_envelope;
use chordify_ring::NodeState;
use chordify_store::{LocalStore, RedbStore};

/// The fixed port the bootstrap always listens on (spec §6).
pub const BOOTSTRAP_PORT: u16 = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConsistencyArg {
    Linearizability,
    Eventual,
}

impl From<ConsistencyArg> for ConsistencyType {
    fn from(value: ConsistencyArg) -> ConsistencyType {
        match value {
            ConsistencyArg::Linearizability => ConsistencyType::Linearizability,
            ConsistencyArg::Eventual => ConsistencyType::Eventual,
        }
    }
}

/// Command-line surface for a node process (spec §6). `ip` is the
/// bootstrap's address and is required unless `--bootstrap` is given;
/// `port` is always this node's own preferred local listen port
/// (`original_source/chord.py`'s `--port`, default 5000), except that
/// the bootstrap ignores it and always binds `BOOTSTRAP_PORT`.
#[derive(Parser, Debug)]
#[command(name = "chordify", about = "A Chord ring key-value store node")]
pub struct Args {
    /// Found a new ring instead of joining an existing one.
    #[arg(long)]
    pub bootstrap: bool,

    /// IP address of the bootstrap node to join through. Required
    /// unless --bootstrap is given.
    pub ip: Option<Ipv4Addr>,

    /// Preferred local listen port; falls back to an OS-assigned free
    /// port if occupied. Ignored by the bootstrap, which always binds
    /// BOOTSTRAP_PORT.
    #[arg(default_value_t = BOOTSTRAP_PORT)]
    pub port: u16,

    /// Read batch commands from this file instead of running the
    /// interactive REPL (spec §6 "the batch driver").
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Directory for this node's local shard (one redb file per
    /// process, named by the bound port).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Consistency mode, authored by the bootstrap only (spec §3
    /// Policy); ignored by joiners, who receive it from the bootstrap.
    #[arg(long, value_enum, default_value_t = ConsistencyArg::Eventual)]
    pub consistency: ConsistencyArg,

    /// Replication factor k, authored by the bootstrap only; ignored
    /// by joiners.
    #[arg(long, default_value_t = 1)]
    pub replication_factor: u32,
}

/// Best-effort local IPv4 address discovery, the way
/// `original_source/node.py` calls `socket.gethostbyname(socket.gethostname())`:
/// open a UDP socket "connected" to a public address (no packets are
/// actually sent) and read back the local address the kernel would
/// route through. Falls back to loopback, matching the original's
/// `except` branch.
fn resolve_local_ip() -> Ipv4Addr {
    let probe = || -> chordify_base::Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        match socket.local_addr()?.ip() {
            std::net::IpAddr::V4(ip) => Ok(ip),
            std::net::IpAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        }
    };
    probe().unwrap_or_else(|e| {
        warn!(target: "chordify", error = %e, "failed to resolve local ip, defaulting to loopback");
        Ipv4Addr::LOCALHOST
    })
}

/// Bind the main listener. The bootstrap binds `BOOTSTRAP_PORT`
/// unconditionally (a bind failure there is fatal, per spec §6 "Exit
/// status"); a joiner tries its preferred port and falls back to an
/// OS-assigned one if it's occupied (spec §6).
fn bind_listener(preferred_port: u16, is_bootstrap: bool) -> chordify_base::Result<TcpListener> {
    if is_bootstrap {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, preferred_port)).map_err(Into::into);
    }
    match TcpListener::bind((Ipv4Addr::UNSPECIFIED, preferred_port)) {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!(target: "chordify", port = preferred_port, error = %e, "preferred port unavailable, falling back to an OS-assigned port");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(Into::into)
        }
    }
}

/// The accept loop (spec §4.2 "Receive"): every accepted connection is
/// read to EOF, parsed as one envelope, and dispatched on its own
/// thread so handlers never block one another or the loop itself
/// (spec §5 "Handlers run concurrently").
fn spawn_accept_loop(
    listener: TcpListener,
    state: Arc<NodeState>,
    store: Arc<dyn LocalStore>,
    is_bootstrap: bool,
) {
    std::thread::spawn(move || {
        for incoming in listener.incoming() {
            let mut stream: TcpStream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(target: "chordify", error = %e, "failed to accept connection");
                    continue;
                }
            };
            let state = Arc::clone(&state);
            let store = Arc::clone(&store);
            std::thread::spawn(move || match read_envelope(&mut stream) {
                Ok(envelope) => chordify_ring::dispatch(&state, store.as_ref(), is_bootstrap, envelope),
                Err(e) => warn!(target: "chordify", error = %e, "dropping malformed envelope"),
            });
        }
    });
}

/// Build the `NodeState` for this process: either a fresh singleton
/// ring (bootstrap) or a ring join through the given bootstrap address
/// (spec §4.3).
fn establish_ring_state(args: &Args, self_pos: RingPosition) -> chordify_base::Result<(NodeState, bool)> {
    if args.bootstrap {
        let policy = Policy::new(args.consistency.into(), args.replication_factor);
        info!(target: "chordify", id = %self_pos.id, ip = %self_pos.ip, port = self_pos.port, "started bootstrap node");
        Ok((NodeState::bootstrap(self_pos, policy), true))
    } else {
        let bootstrap_ip = args
            .ip
            .ok_or_else(|| chordify_base::err("must specify bootstrap ip when not --bootstrap"))?;
        let state = chordify_ring::join_via(self_pos, bootstrap_ip, BOOTSTRAP_PORT)?;
        info!(target: "chordify", id = %self_pos.id, ip = %self_pos.ip, port = self_pos.port, "joined ring");
        Ok((state, false))
    }
}

/// Run a node process end to end: bind, join or bootstrap, start the
/// accept loop, then hand control to the CLI (interactive or batch)
/// until it returns. Returns an error for any startup failure; per
/// spec §6 "Exit status" this maps to a non-zero process exit code.
pub fn run(args: Args) -> chordify_base::Result<()> {
    let local_ip = resolve_local_ip();
    let preferred_port = if args.bootstrap { BOOTSTRAP_PORT } else { args.port };
    let listener = bind_listener(preferred_port, args.bootstrap)?;
    let bound_port = listener.local_addr()?.port();

    let self_pos = RingPosition::new(local_ip, bound_port);
    let (state, is_bootstrap) = establish_ring_state(&args, self_pos)?;
    let state = Arc::new(state);

    let data_dir = args.data_dir.clone().unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&data_dir)?;
    let store_path = data_dir.join(format!("chordify-{bound_port}.redb"));
    let store: Arc<dyn LocalStore> = Arc::new(RedbStore::open(&store_path)?);

    spawn_accept_loop(listener, Arc::clone(&state), Arc::clone(&store), is_bootstrap);

    let result = match &args.file {
        Some(path) => chordify_ui::run_batch(&state, store.as_ref(), path),
        None => {
            chordify_ui::run_interactive(&state, store.as_ref());
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!(target: "chordify", error = %e, "batch run failed");
    }
    result
}
