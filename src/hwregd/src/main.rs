// SPDX-License-Identifier: Apache-2.0

//! Privileged daemon mediating MSR and PCI-config-space register access
//! over a Unix domain socket, one fork per connection.

mod cli;
mod error;
mod logging;
mod service;
mod supervisor;

use clap::Parser;
use cli::Cli;
use error::BrokerError;

const EXIT_CODE_ERROR: i32 = 1;

fn run(cli: Cli) -> Result<(), BrokerError> {
    logging::init(cli.verbose);
    supervisor::run(&cli)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(EXIT_CODE_ERROR);
    }
}
