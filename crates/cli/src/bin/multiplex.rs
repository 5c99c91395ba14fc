//! `multiplex SOURCE DEST1 DEST2 …`: reads fixed-width event records from
//! SOURCE and writes each one verbatim to every DEST, so one trace producer
//! can feed several simulator instances side by side.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::process::ExitCode;

use cachesim_core::event::EVENT_SIZE;

fn run(source_path: &str, dest_paths: &[String]) -> std::io::Result<()> {
    let mut source = File::open(source_path)?;
    let mut dests: Vec<BufWriter<File>> = dest_paths
        .iter()
        .map(|p| File::create(p).map(BufWriter::new))
        .collect::<std::io::Result<_>>()?;

    let mut buf = [0u8; EVENT_SIZE];
    loop {
        let mut got = 0;
        while got < EVENT_SIZE {
            let n = source.read(&mut buf[got..])?;
            if n == 0 {
                if got == 0 {
                    for dest in &mut dests {
                        dest.flush()?;
                    }
                    return Ok(());
                }
                tracing::error!(got, want = EVENT_SIZE, "short read mid-record on source");
                std::process::exit(1);
            }
            got += n;
        }
        for dest in &mut dests {
            dest.write_all(&buf)?;
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [source, dests @ ..] = args.as_slice() else {
        eprintln!("usage: multiplex SOURCE DEST1 DEST2 ...");
        return ExitCode::FAILURE;
    };
    if dests.is_empty() {
        eprintln!("usage: multiplex SOURCE DEST1 DEST2 ...");
        return ExitCode::FAILURE;
    }

    match run(source, dests) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "multiplex failed");
            ExitCode::FAILURE
        }
    }
}
