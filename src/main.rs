use anyhow::Result;
use clap::Parser;

mod cleanup;
mod cli;
mod config;
mod error;
mod layout;
mod lifecycle;
mod logging;
mod output;
mod pipeline;
mod probe;
mod runtime;
mod server;
mod stage;
#[cfg(test)]
mod test_support;
mod util;
mod workflow;

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    logging::init_logging(args.verbose);
    workflow::run(args)
}
