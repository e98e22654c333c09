//! ZModSim command line entry point.
//!
//! Builds the slave configuration from defaults, an optional JSON file
//! and flag overrides (flags win), then runs the simulator until ctrl-c.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use tokio::signal;

use zmodsim::{
    parse_register_list, AutoIncrementConfig, ModbusSlave, ModbusTcpSlave, ModsimResult,
    SlaveConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "zmodsim",
    version,
    about = "Modbus TCP slave simulator with programmable register banks"
)]
struct Cli {
    /// JSON configuration file
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Modbus unit id (1-247)
    #[arg(short = 'u', long)]
    unit_id: Option<u8>,

    /// TCP listen port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Number of coils
    #[arg(long, value_name = "N")]
    coils: Option<u16>,

    /// Number of discrete inputs
    #[arg(long, value_name = "N")]
    discrete: Option<u16>,

    /// Number of holding registers
    #[arg(long, value_name = "N")]
    holding: Option<u16>,

    /// Number of input registers
    #[arg(long, value_name = "N")]
    input: Option<u16>,

    /// Enable the holding register auto-increment worker
    #[arg(long)]
    holding_auto: bool,

    /// Holding registers to increment, e.g. 0,5,10-20
    #[arg(long, value_name = "LIST")]
    holding_regs: Option<String>,

    /// Holding auto-increment interval in milliseconds
    #[arg(long, value_name = "MS")]
    holding_interval: Option<u64>,

    /// Holding auto-increment step
    #[arg(long, value_name = "N")]
    holding_inc: Option<u16>,

    /// Holding auto-increment wrap threshold
    #[arg(long, value_name = "N")]
    holding_max: Option<u16>,

    /// Enable the input register auto-increment worker
    #[arg(long)]
    input_auto: bool,

    /// Input registers to increment, e.g. 0,5,10-20
    #[arg(long, value_name = "LIST")]
    input_regs: Option<String>,

    /// Input auto-increment interval in milliseconds
    #[arg(long, value_name = "MS")]
    input_interval: Option<u64>,

    /// Input auto-increment step
    #[arg(long, value_name = "N")]
    input_inc: Option<u16>,

    /// Input auto-increment wrap threshold
    #[arg(long, value_name = "N")]
    input_max: Option<u16>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

/// Apply one auto-increment flag group on top of a config slot
fn apply_auto_flags(
    slot: &mut AutoIncrementConfig,
    auto: bool,
    regs: &Option<String>,
    interval: Option<u64>,
    inc: Option<u16>,
    max: Option<u16>,
) -> ModsimResult<()> {
    if auto {
        slot.enabled = true;
    }
    if let Some(expr) = regs {
        slot.addresses = parse_register_list(expr)?;
    }
    if let Some(interval) = interval {
        slot.interval_ms = interval;
    }
    if let Some(inc) = inc {
        slot.increment = inc;
    }
    if let Some(max) = max {
        slot.max = max;
    }
    Ok(())
}

/// Merge defaults, file and flags into the final configuration
fn build_config(cli: &Cli) -> ModsimResult<SlaveConfig> {
    let mut config = match &cli.config {
        Some(path) => SlaveConfig::from_file(path)?,
        None => SlaveConfig::default(),
    };

    if let Some(unit_id) = cli.unit_id {
        config.unit_id = unit_id;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(coils) = cli.coils {
        config.bank_sizes.coils = coils;
    }
    if let Some(discrete) = cli.discrete {
        config.bank_sizes.discrete = discrete;
    }
    if let Some(holding) = cli.holding {
        config.bank_sizes.holding = holding;
    }
    if let Some(input) = cli.input {
        config.bank_sizes.input = input;
    }

    apply_auto_flags(
        &mut config.holding_auto,
        cli.holding_auto,
        &cli.holding_regs,
        cli.holding_interval,
        cli.holding_inc,
        cli.holding_max,
    )?;
    apply_auto_flags(
        &mut config.input_auto,
        cli.input_auto,
        &cli.input_regs,
        cli.input_interval,
        cli.input_inc,
        cli.input_max,
    )?;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", SlaveConfig::sample_json());
        return Ok(());
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut slave = ModbusTcpSlave::new(config);
    slave.start().await?;

    signal::ctrl_c().await?;
    info!("shutdown requested");
    slave.stop().await?;

    Ok(())
}
