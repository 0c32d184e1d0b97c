//! this binary starts one in-memory stub node, useful for dry runs of `dht-bench`
//! to see the list of options, type: `dht-stub-node --help`
//!
//! Every stub started by one process shares a single key/value store, so
//! `dht-stub-node --addr 127.0.0.1:8000 --count 4` emulates a healthy four node ring on
//! ports 8000 to 8003.

use std::net::SocketAddr;
use std::process::exit;
use std::thread;

use clap::{crate_version, value_t, App, Arg};
use dhtbench::stub::{spawn_stub, StubStore};
use dhtbench::{BenchError, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    count: u16,
    threads: usize,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT and that `count` nodes fit
    /// on consecutive ports after it
    /// # Errors
    /// returns [`BenchError::Parsing`] if one of the parameters is invalid
    fn build(addr: &str, count: u16, threads: usize) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| BenchError::Parsing(format!("could not parse {} into an IP address and port", &addr)))?;
        if count == 0 || addr.port().checked_add(count - 1).is_none() {
            return Err(BenchError::Parsing(format!("cannot start {} nodes from port {}", count, addr.port())));
        }
        Ok(Opt { addr, count, threads })
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let matches = App::new("dht-stub-node")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("an in-memory stand-in for chord cluster nodes")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT the first node listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("count")
            .long("count")
            .value_name("N")
            .help("how many nodes to start on consecutive ports")
            .default_value("1"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("runtime worker threads per node")
            .default_value("4"))
        .get_matches();

    let addr = matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
    let count = value_t!(matches, "count", u16).unwrap_or_else(|e| e.exit());
    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());
    let opt = match Opt::build(addr, count, threads) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("dht-stub-node {}", env!("CARGO_PKG_VERSION"));
    let store = StubStore::new();
    for offset in 0..opt.count {
        let addr = SocketAddr::new(opt.addr.ip(), opt.addr.port() + offset);
        let node = spawn_stub(addr, store.clone(), opt.threads)?;
        println!("{}", node);
    }
    // the nodes serve on their own threads until the process is killed
    loop {
        thread::park();
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than DEBUG (e.g, info, warn, etc.)
        // will be written.
        .with_max_level(Level::DEBUG)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
