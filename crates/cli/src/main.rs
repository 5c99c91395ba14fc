//! `cachesim`: reads a binary event trace off a named pipe and drives
//! [`cachesim_core::Dispatcher`] to completion, then writes a stats file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cachesim_core::config::{CacheGeometry, Config, ExecutionPolicy, Tags};
use cachesim_core::event::{Event, EVENT_SIZE};
use cachesim_core::{Dispatcher, Orchestrator};
use clap::Parser;

/// A trace-driven multicore cache simulator.
#[derive(Debug, Parser)]
#[command(name = "cachesim", version, about)]
struct Cli {
    /// Output stats filename. A `.1` suffix (repeated as needed) is
    /// appended on collision.
    #[arg(long, default_value = "rcdcsim-stats.py")]
    stats_file: PathBuf,
    /// Path to the input named pipe carrying the event trace.
    #[arg(long)]
    to_sim_fifo: PathBuf,
    /// Coherence/determinism scheme label, copied into the stats header.
    #[arg(long, default_value = "")]
    scheme: String,
    /// Workload label, copied into the stats header.
    #[arg(long, default_value = "")]
    workload: String,
    /// Input label, copied into the stats header.
    #[arg(long, default_value = "")]
    input: String,
    /// Application thread count, recorded as a tag only.
    #[arg(long, default_value_t = 0)]
    threads: u32,
    /// Simulated core count.
    #[arg(long, default_value_t = 8)]
    cores: u32,
    /// Memory accesses with stack-ref set skip the store buffer (but still
    /// access the cache).
    #[arg(long)]
    ignore_stack: bool,
    /// Bytes per cache block.
    #[arg(long, default_value_t = 64)]
    block_size: u64,
    /// L1 size in bytes.
    #[arg(long, default_value_t = 32 * 1024)]
    l1_size: u64,
    /// L1 associativity.
    #[arg(long, default_value_t = 8)]
    l1_assoc: u64,
    /// Enable a private L2.
    #[arg(long)]
    use_l2: bool,
    /// L2 size in bytes, if `--use-l2`.
    #[arg(long, default_value_t = 256 * 1024)]
    l2_size: u64,
    /// L2 associativity, if `--use-l2`.
    #[arg(long, default_value_t = 8)]
    l2_assoc: u64,
    /// Enable a shared L3.
    #[arg(long)]
    use_l3: bool,
    /// L3 size in bytes, if `--use-l3`.
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    l3_size: u64,
    /// L3 associativity, if `--use-l3`.
    #[arg(long, default_value_t = 16)]
    l3_assoc: u64,
    /// Every synchronization sink ends the sinking core's quantum.
    #[arg(long, conflicts_with_all = ["det_hb", "nondet"])]
    det_tso: bool,
    /// A sink ends the sinking core's quantum only if its matching source
    /// landed in the same round.
    #[arg(long, conflicts_with_all = ["det_tso", "nondet"])]
    det_hb: bool,
    /// Baseline mode: synchronization never forces a quantum boundary.
    #[arg(long, conflicts_with_all = ["det_tso", "det_hb"])]
    nondet: bool,
    /// Target instructions per quantum.
    #[arg(long, default_value_t = 1000)]
    quantum_size: u64,
    /// Enable deterministic-time-based work accounting.
    #[arg(long)]
    smart_qb: bool,
}

impl Cli {
    fn policy(&self) -> Option<ExecutionPolicy> {
        match (self.det_tso, self.det_hb, self.nondet) {
            (true, false, false) => Some(ExecutionPolicy::DetTso),
            (false, true, false) => Some(ExecutionPolicy::DetHb),
            (false, false, true) => Some(ExecutionPolicy::NonDet),
            _ => None,
        }
    }

    fn into_config(self) -> Result<Config, &'static str> {
        let policy = self.policy().ok_or(
            "exactly one of --det-tso, --det-hb, --nondet must be given",
        )?;
        Ok(Config {
            cores: self.cores,
            block_size: self.block_size,
            l1: CacheGeometry {
                size_bytes: self.l1_size,
                ways: self.l1_assoc,
            },
            l2: self.use_l2.then_some(CacheGeometry {
                size_bytes: self.l2_size,
                ways: self.l2_assoc,
            }),
            l3: self.use_l3.then_some(CacheGeometry {
                size_bytes: self.l3_size,
                ways: self.l3_assoc,
            }),
            policy,
            quantum_size: self.quantum_size,
            smart_quantum_building: self.smart_qb,
            ignore_stack: self.ignore_stack,
            stats_file: self.stats_file.to_string_lossy().into_owned(),
            tags: Tags {
                scheme: self.scheme.clone(),
                workload: self.workload.clone(),
                input: self.input.clone(),
                threads: self.threads,
            },
        })
    }
}

/// Opens `path` for exclusive creation, retrying with `.1`, `.1.1`, … until
/// a fresh path is found, so repeated runs against a populated output
/// directory never silently clobber a prior run's stats.
fn create_stats_file(path: &Path) -> std::io::Result<File> {
    let mut candidate = path.to_path_buf();
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let mut name = candidate.into_os_string();
                name.push(".1");
                candidate = PathBuf::from(name);
            }
            Err(e) => return Err(e),
        }
    }
}

fn decode_trace(fifo: &Path, dispatcher: &mut Dispatcher) -> std::io::Result<()> {
    let mut source = File::open(fifo)?;
    let mut buf = [0u8; EVENT_SIZE];
    loop {
        let mut got = 0;
        while got < EVENT_SIZE {
            let n = source.read(&mut buf[got..])?;
            if n == 0 {
                if got == 0 {
                    dispatcher.mark_eof();
                    return Ok(());
                }
                tracing::error!(got, want = EVENT_SIZE, "short read mid-record");
                std::process::exit(1);
            }
            got += n;
        }
        match Event::decode(&buf) {
            Ok(event) => dispatcher.push_event(event),
            Err(err) => {
                tracing::error!(%err, "malformed event record");
                std::process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> std::io::Result<()> {
    let fifo = cli.to_sim_fifo.clone();
    let config = cli.into_config().unwrap_or_else(|msg| {
        tracing::error!(msg, "invalid command line");
        std::process::exit(2);
    });
    config.validate().unwrap_or_else(|err| {
        tracing::error!(%err, "invalid configuration");
        std::process::exit(2);
    });
    tracing::info!(?config, "starting simulation");

    let stats_path = PathBuf::from(&config.stats_file);
    let orchestrator = Orchestrator::new(&config);
    let mut dispatcher = Dispatcher::new(orchestrator, config.ignore_stack);
    decode_trace(&fifo, &mut dispatcher)?;
    dispatcher.run_to_completion();

    let file = create_stats_file(&stats_path)?;
    let mut out = BufWriter::new(file);
    let prefix = format!(
        "{{'scheme': {:?}, 'workload': {:?}, 'input': {:?}, 'threads': {}, ",
        config.tags.scheme, config.tags.workload, config.tags.input, config.tags.threads
    );
    dispatcher.orchestrator().dump_stats(&mut out, &prefix, "}\n")?;
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
