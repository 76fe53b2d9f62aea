//! # proofpack
//!
//! Entry point for the `proofpack` binary.
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load config: defaults < JSON file < PROOFPACK_* env
//!   ├─> Initialize tracing
//!   └─> Run the subcommand on a Tokio runtime
//!         ├─ serve   HTTP service
//!         ├─ build   one pack to disk
//!         └─ verify  check a downloaded archive
//! ```
//!
//! ```bash
//! proofpack serve --dataset fixtures/dataset.json
//! proofpack build --dataset fixtures/dataset.json --org org-1 --time-range 30d --out packs/
//! proofpack verify packs/audit-pack-pack-20260310-0123456789ab.zip
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // CLI output goes to stdout

mod cli;

use anyhow::Result;
use clap::Parser as _;
use proofpack::config::AppConfig;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    proofpack::logging::init(&config.logging)?;

    tokio::runtime::Runtime::new()?.block_on(cli::run_command(config, cli.command))
}
