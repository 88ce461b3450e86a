//! Multi-link reorder simulator.
//!
//! Generates synthetic management traffic over several links, runs it
//! through the reorder engine and checks the delivered stream.
//!
//! # Usage
//!
//! ```sh
//! reo-sim --links 4 --frames 10000 --seed 7 --fw-consumed 10 --error 5
//! RUST_LOG=mgmt_reo=debug reo-sim --wrap
//! ```
//!
//! Exits with status 1 if the delivered stream breaks ordering.

use mgmt_reo::ReoConfig;
use mgmt_reo::sim::{self, SimConfig, SimError};

fn main() {
    if let Err(e) = run() {
        eprintln!("reo-sim: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let args: Vec<String> = std::env::args().collect();
    let config = parse_args(&args)?;

    mgmt_reo::trace::init_tracing_with_default("mgmt_reo=warn");

    eprintln!(
        "reo-sim: {} frames over {} links, seed {}",
        config.num_frames, config.num_links, config.seed
    );
    let report = sim::run(&config);
    println!("{report}");
    report.check()
}

fn parse_args(args: &[String]) -> Result<SimConfig, SimError> {
    let mut config = SimConfig::default().with_reo(ReoConfig::debug());

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--links" | "-l" => {
                let n = value(args, &mut i, flag)?;
                if !(1..=mgmt_reo::MAX_LINKS).contains(&n) {
                    return Err(SimError::InvalidArgument(format!(
                        "--links must be in 1..={}",
                        mgmt_reo::MAX_LINKS
                    )));
                }
                config = config.with_links(n);
            }
            "--frames" | "-n" => config = config.with_frames(value(args, &mut i, flag)?),
            "--seed" | "-s" => config = config.with_seed(value(args, &mut i, flag)?),
            "--fw-consumed" => {
                let pct = percent(value(args, &mut i, flag)?, flag)?;
                let error_pct = config.error_pct;
                config = config.with_loss(pct, error_pct);
            }
            "--error" => {
                let pct = percent(value(args, &mut i, flag)?, flag)?;
                let fw_consumed_pct = config.fw_consumed_pct;
                config = config.with_loss(fw_consumed_pct, pct);
            }
            "--wrap" => {
                // Start just short of both wraparounds.
                config = config.with_start(u32::MAX - 200_000, u16::MAX - 50);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(SimError::InvalidArgument(format!("unknown argument: {arg}")));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Parses the value following `args[*i]`, advancing `i` past it.
fn value<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> Result<T, SimError>
where
    T::Err: std::fmt::Display,
{
    *i += 1;
    let raw = args
        .get(*i)
        .ok_or_else(|| SimError::InvalidArgument(format!("missing value for {flag}")))?;
    raw.parse()
        .map_err(|e| SimError::InvalidArgument(format!("{flag} {raw}: {e}")))
}

fn percent(pct: u8, flag: &str) -> Result<u8, SimError> {
    if pct > 100 {
        return Err(SimError::InvalidArgument(format!("{flag} must be <= 100")));
    }
    Ok(pct)
}

fn print_usage() {
    eprintln!(
        "Usage: reo-sim [OPTIONS]

Options:
  -l, --links <N>          Number of links (default: 3)
  -n, --frames <N>         Frames to generate (default: 2000)
  -s, --seed <N>           RNG seed (default: 0)
      --fw-consumed <PCT>  Frames consumed by firmware (default: 10)
      --error <PCT>        Forwarded frames dropped by the host (default: 10)
      --wrap               Start near counter and timestamp wraparound
  -h, --help               Print help

Environment:
  RUST_LOG                 Log filter (default: mgmt_reo=warn)"
    );
}
