/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 *
 */
extern crate candb;

use candb::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Sort, merge and dump DBC CAN databases.
///
/// Examples:
///   can-dbc sort bus.dbc sorted.dbc
///   can-dbc merge all.dbc body.dbc powertrain.dbc
///   can-dbc dump bus.dbc > bus.json
#[derive(Debug, Parser)]
#[command(name = "can-dbc", version, about, author)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sort messages and signals of one database
    Sort {
        input: PathBuf,
        /// defaults to <input>.dbc, or <input>_merged.dbc when that is the input
        output: Option<PathBuf>,
        #[arg(short = 'k', long = "key", value_enum, default_value_t = Order::Id)]
        key: Order,
    },
    /// Merge several databases, later files win
    Merge {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print the parsed model as JSON
    Dump { input: PathBuf },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Order {
    Id,
    Name,
}

impl From<Order> for SortKey {
    fn from(order: Order) -> Self {
        match order {
            Order::Id => SortKey::Id,
            Order::Name => SortKey::Name,
        }
    }
}

fn init_logging(verbosity: u8) {
    // map -v levels to env_logger filters
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env = Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}

fn load(network: &mut Network, input: &Path) -> Result<(), String> {
    match network.load(input) {
        Err(error) => Err(format!("fail loading {} error:[{}] {}", input.display(), error.get_uid(), error)),
        Ok(report) => {
            for line in &report.unparsed {
                warn!("{}:{} skipped '{}'", report.source, line.line, line.text);
            }
            Ok(())
        }
    }
}

fn main() -> Result<(), String> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Sort { input, output, key } => {
            let mut network = Network::new();
            load(&mut network, &input)?;
            network.sort(key.into());
            let path = network.save(output.as_deref()).map_err(|error| error.to_string())?;
            info!("sorted {} -> {}", input.display(), path.display());
        }
        Command::Merge { output, inputs } => {
            let mut network = Network::new();
            for input in &inputs {
                load(&mut network, input)?;
            }
            let path = network.save(Some(output.as_path())).map_err(|error| error.to_string())?;
            info!("merged {} files -> {}", inputs.len(), path.display());
        }
        Command::Dump { input } => {
            let mut network = Network::new();
            load(&mut network, &input)?;
            let json = network.to_json().map_err(|error| format!("fail to serialize: {error}"))?;
            println!("{json}");
        }
    }
    Ok(())
}
