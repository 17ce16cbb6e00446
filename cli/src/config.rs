//! Run configuration
//!
//! Sources, lowest priority first: built-in defaults, the TOML file named by
//! `--config` (or `PSORT_CONFIG`), `PSORT_*` environment variables, then
//! command line flags.
//!
//! ```toml
//! npes = 8
//! keys_per_rank = 1048576
//! transport = "one-sided"
//!
//! [sort]
//! bbits = 4
//! algorithm = "radix"
//! ```

use anyhow::{ensure, Context};
use clap::Args;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use psort::{SortAlgorithm, SortParams, Transport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Number of ranks
    pub(crate) npes: usize,
    /// Keys generated on every rank
    pub(crate) keys_per_rank: usize,
    /// Communication model
    pub(crate) transport: Transport,
    /// Value of the bucket tag carried by every key
    pub(crate) tag: u64,
    /// Seed for key generation
    pub(crate) seed: u64,
    /// Check the result after sorting
    pub(crate) verify: bool,
    /// Write the sorted keys here, little-endian, in rank order
    pub(crate) output: Option<PathBuf>,
    /// Sort parameters shared by every rank
    pub(crate) sort: SortParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            npes: 4,
            keys_per_rank: 1 << 20,
            transport: Transport::default(),
            tag: 0,
            seed: 0x5eed,
            verify: true,
            output: None,
            sort: SortParams::default(),
        }
    }
}

/// Command line overrides; unset flags leave the configured value alone
#[derive(Debug, Default, Args)]
pub(crate) struct Flags {
    /// Number of ranks
    #[arg(short = 'n', long)]
    npes: Option<usize>,
    /// Keys generated on every rank
    #[arg(short = 'k', long)]
    keys_per_rank: Option<usize>,
    /// Communication model: messaging, one-sided, symmetric, partitioned
    #[arg(short, long)]
    transport: Option<Transport>,
    /// Number of high key bits holding the bucket tag
    #[arg(short, long)]
    bbits: Option<u32>,
    /// Bucket tag value
    #[arg(long)]
    tag: Option<u64>,
    /// Local sort: insert, select, bubble, qsort, radix
    #[arg(short, long)]
    algorithm: Option<SortAlgorithm>,
    /// Seed for key generation
    #[arg(long)]
    seed: Option<u64>,
    /// Skip verification
    #[arg(long)]
    no_verify: bool,
    /// Write the sorted keys to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Flags {
    /// Merge the flags that were given on top of `figment`.
    fn apply(&self, mut figment: Figment) -> Figment {
        if let Some(npes) = self.npes {
            figment = figment.merge(("npes", npes));
        }
        if let Some(keys) = self.keys_per_rank {
            figment = figment.merge(("keys_per_rank", keys));
        }
        if let Some(transport) = self.transport {
            figment = figment.merge(("transport", transport));
        }
        if let Some(bbits) = self.bbits {
            figment = figment.merge(("sort.bbits", bbits));
        }
        if let Some(tag) = self.tag {
            figment = figment.merge(("tag", tag));
        }
        if let Some(algorithm) = self.algorithm {
            figment = figment.merge(("sort.algorithm", algorithm));
        }
        if let Some(seed) = self.seed {
            figment = figment.merge(("seed", seed));
        }
        if self.no_verify {
            figment = figment.merge(("verify", false));
        }
        if let Some(output) = &self.output {
            figment = figment.merge(("output", output));
        }
        figment
    }
}

impl Config {
    /// Defaults, file and environment, before flags.
    fn figment(file: Option<&Path>) -> Figment {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PSORT_CONFIG").map(PathBuf::from));
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment
            .merge(
                Env::prefixed("PSORT_SORT_")
                    .map(|k| format!("sort.{}", k.as_str().to_lowercase()).into()),
            )
            .merge(Env::prefixed("PSORT_").filter(|k| {
                let k = k.as_str().to_ascii_lowercase();
                !k.starts_with("sort_") && k != "config"
            }))
    }

    /// Load and check the configuration.
    pub(crate) fn load(file: Option<&Path>, flags: &Flags) -> anyhow::Result<Self> {
        if let Some(file) = file {
            ensure!(file.is_file(), "config file {} not found", file.display());
        }
        let config: Config = flags
            .apply(Self::figment(file))
            .extract()
            .context("invalid configuration")?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings no run could use.
    fn check(&self) -> anyhow::Result<()> {
        ensure!(self.npes >= 1, "npes must be at least 1");
        let bbits = self.sort.bbits;
        ensure!(bbits <= u64::BITS, "bbits must be at most 64, got {bbits}");
        ensure!(
            self.tag.checked_shr(bbits).unwrap_or(0) == 0,
            "tag {:#x} does not fit in {bbits} bits",
            self.tag
        );
        Ok(())
    }
}
