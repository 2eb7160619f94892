//! # loghopper entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load config (file + flag overrides)
//!   ├─> Initialize logging
//!   └─> Create Tokio runtime and execute the command
//! ```
//!
//! ```bash
//! loghopper init-config
//! loghopper watch --root /srv/testlogs/incoming
//! loghopper parse SN123_0315.txt --pretty
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;
use loghopper::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config_path = cli.config_path()?;
    let config = cli.load_config()?;

    let _log_guards = logging::init(&config.logging)?;

    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command, config, &config_path))
}
