//! Benchmark driver: generate tagged keys on every rank, sort them over a
//! chosen transport, report phase timings and verify the result.

mod config;
mod keygen;

use anyhow::Context;
use clap::Parser;
use config::{Config, Flags};
use psort::{
    psort_observed, verify, Exchange, Fingerprint, PhaseReport, RankSummary, SortOutput, World,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Distributed bucket sort benchmark
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    flags: Flags,
}

/// What one rank brings back
#[derive(Debug)]
struct RankRun {
    /// Digest of the generated input
    input: Fingerprint,
    /// Sorted keys and counts
    output: SortOutput,
    /// Phase timings in protocol order
    reports: Vec<PhaseReport>,
}

/// Generate this rank's keys and take part in the sort.
fn run_rank(mut ep: Box<dyn Exchange + Send>, config: &Config) -> Result<RankRun, psort::Error> {
    let rank = ep.rank();
    let keys = keygen::tagged_keys(
        rank,
        config.keys_per_rank,
        config.sort.bbits,
        config.tag,
        config.seed,
    );
    let input = Fingerprint::of(&keys);
    let mut reports = Vec::new();
    let output = psort_observed(&mut *ep, &config.sort, keys, &mut |r: &PhaseReport| {
        reports.push(*r)
    })?;
    Ok(RankRun {
        input,
        output,
        reports,
    })
}

/// Slowest rank's time for every phase, in protocol order.
fn phase_maxima(runs: &[RankRun]) -> Vec<(String, Duration)> {
    let Some(first) = runs.first() else {
        return Vec::new();
    };
    first
        .reports
        .iter()
        .enumerate()
        .map(|(i, report)| {
            let slowest = runs
                .iter()
                .filter_map(|run| run.reports.get(i))
                .map(|r| r.elapsed)
                .max()
                .unwrap_or_default();
            (report.phase.to_string(), slowest)
        })
        .collect()
}

/// Run every rank of the job and collect their results in rank order.
///
/// Each rank gets its own OS thread through [`World::run`]: no rank gets
/// past the first barrier until all of them are running, so ranks can't
/// share a bounded pool such as tokio's blocking threads.
async fn run_ranks(config: &Config) -> anyhow::Result<Vec<RankRun>> {
    let world = World::new(config.npes, config.transport)?;
    let job = config.clone();
    let results = tokio::task::spawn_blocking(move || world.run(|ep| run_rank(ep, &job)))
        .await
        .context("rank thread panicked")?;

    let mut runs = Vec::with_capacity(results.len());
    let mut failure = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(run) => runs.push(run),
            Err(e) => {
                error!(rank, error = %e, "rank failed");
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(runs),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), &cli.flags)?;
    info!(?config, "starting run");

    let started = Instant::now();
    let runs = run_ranks(&config).await?;
    let wall = started.elapsed();

    let total: usize = runs.iter().map(|run| run.output.keys.len()).sum();
    println!(
        "{} ranks, {} keys, transport {}, algorithm {}",
        config.npes, total, config.transport, config.sort.algorithm
    );
    for (phase, slowest) in phase_maxima(&runs) {
        println!("  {phase:<14} {:>12.3} ms", slowest.as_secs_f64() * 1e3);
    }
    let global_max = runs.first().map_or(0, |run| run.output.global_max);
    println!(
        "  total {:>20.3} ms, {:.1} Mkeys/s, largest rank {global_max} keys",
        wall.as_secs_f64() * 1e3,
        total as f64 / wall.as_secs_f64() / 1e6,
    );

    if config.verify {
        let input: Fingerprint = runs.iter().map(|run| run.input).collect();
        let summaries: Vec<RankSummary> = runs
            .iter()
            .enumerate()
            .map(|(rank, run)| RankSummary::new(rank, config.npes, config.sort.bbits, &run.output.keys))
            .collect();
        verify(input, &summaries).context("verification failed")?;
        println!("verification passed");
    }

    if let Some(path) = &config.output {
        let keys: Vec<u64> = runs
            .iter()
            .flat_map(|run| run.output.keys.iter().map(|k| k.to_le()))
            .collect();
        tokio::fs::write(path, bytemuck::cast_slice::<u64, u8>(&keys))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), keys = keys.len(), "wrote sorted keys");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use psort::{SortParams, Transport};

    #[tokio::test]
    async fn more_ranks_than_blocking_threads() {
        // tokio's blocking pool holds 512 threads by default
        let config = Config {
            npes: 520,
            keys_per_rank: 2,
            transport: Transport::Symmetric,
            ..Config::default()
        };
        let runs = run_ranks(&config).await.unwrap();
        assert_eq!(runs.len(), 520);
        let total: usize = runs.iter().map(|run| run.output.keys.len()).sum();
        assert_eq!(total, 1040);
    }

    #[tokio::test]
    async fn first_failure_is_reported() {
        let config = Config {
            npes: 3,
            keys_per_rank: 4,
            tag: 1,
            sort: SortParams::new(63),
            ..Config::default()
        };
        let err = run_ranks(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<psort::Error>(),
            Some(psort::Error::Argument(_))
        ));
    }
}
