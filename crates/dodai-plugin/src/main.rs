//! dodai-ofcctl: inspect and administer OpenFlow controller regions.
//!
//! Uses the same driver and orchestrator stack as the plugin, configured from
//! the plugin's configuration file.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dodai_ofc_driver::{build_driver, Dpid, OfcDriver, PortNumber, VlanId};
use dodai_ofc_orch::{OfcManager, OuterPort};
use dodai_plugin::config::{PluginConfig, DEFAULT_CONFIG_PATH};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// OpenFlow controller region administration
#[derive(Parser, Debug)]
#[command(name = "dodai-ofcctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plugin configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List regions known to the controller
    Regions,
    /// List switch datapath ids
    Switches,
    /// List the ports of one switch
    Ports {
        /// Datapath id of the switch
        dpid: Dpid,
    },
    /// List the server ports bound to a region
    RegionPorts {
        region: String,
    },
    /// Tear down a region, clearing its outer-port associations first
    DestroyRegion {
        region: String,

        /// VLAN whose outer-port associations should be cleared
        #[arg(long)]
        vlan: Option<VlanId>,

        /// Outer port to clear, as DPID:PORT (repeatable)
        #[arg(long = "outer-port", value_parser = parse_outer_port)]
        outer_ports: Vec<(Dpid, PortNumber)>,
    },
}

fn parse_outer_port(value: &str) -> Result<(Dpid, PortNumber), String> {
    let (dpid, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected DPID:PORT, got {}", value))?;
    let dpid = Dpid::new(dpid).ok_or_else(|| "datapath id cannot be empty".to_string())?;
    let port = port
        .parse::<PortNumber>()
        .map_err(|e| format!("invalid port number {}: {}", port, e))?;
    Ok((dpid, port))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {}", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to set logger: {}", e))
}

fn print_lines<T: Serialize>(json: bool, items: &[T], line: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", line(item));
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = PluginConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;

    let driver: Arc<dyn OfcDriver> = build_driver(&config.ofc.driver_settings())?;
    info!("Using OFC driver {}", driver.name());

    match args.command {
        Command::Regions => {
            let regions = driver.show_region().await?;
            print_lines(args.json, &regions, |r| r.region_name.clone())?;
        }
        Command::Switches => {
            let switches = driver.show_switch_datapath_ids().await?;
            print_lines(args.json, &switches, |s| s.dpid.to_string())?;
        }
        Command::Ports { dpid } => {
            let ports = driver.show_ports(&dpid).await?;
            print_lines(args.json, &ports, |p| {
                format!(
                    "{}\t{}\t{}",
                    p.port_number.map_or_else(|| "-".to_string(), |n| n.to_string()),
                    p.port_type.as_str(),
                    p.region_name.as_deref().unwrap_or("-")
                )
            })?;
        }
        Command::RegionPorts { region } => {
            let manager = OfcManager::with_config(
                driver,
                Arc::new(Vec::<OuterPort>::new()),
                config.ofc.manager_config(),
            );
            let ports = manager.region_ports(&region).await?;
            let rows: Vec<_> = ports
                .iter()
                .map(|p| (p.dpid.to_string(), p.port.port_number))
                .collect();
            print_lines(args.json, &rows, |(dpid, port)| {
                format!(
                    "{}\t{}",
                    dpid,
                    port.map_or_else(|| "-".to_string(), |n| n.to_string())
                )
            })?;
        }
        Command::DestroyRegion {
            region,
            vlan,
            outer_ports,
        } => {
            let registry: Vec<OuterPort> = outer_ports
                .into_iter()
                .enumerate()
                .map(|(i, (dpid, port))| OuterPort::new(i as u64 + 1, dpid, port))
                .collect();
            let manager =
                OfcManager::with_config(driver, Arc::new(registry), config.ofc.manager_config());

            manager.destroy_existing_region(&region, vlan).await?;
            let stats = manager.stats();
            if stats.outer_port_clear_failures > 0 {
                warn!(
                    "{} outer-port association(s) of region {} could not be cleared",
                    stats.outer_port_clear_failures, region
                );
            }
            println!("Destroyed region {}", region);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("dodai-ofcctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
