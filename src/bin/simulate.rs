//! Headless scenario runner.
//!
//! ```text
//! simulate [scenario] [--config <path>] [--timeout-secs <n>]
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use robogrid::{Config, ConsoleNotifier, Scenario, Simulation};

struct Args {
    scenario: String,
    config_path: Option<String>,
    timeout_secs: u64,
}

fn parse_args() -> Result<Args> {
    let mut scenario = "adaptive_blockers".to_string();
    let mut config_path = None;
    let mut timeout_secs = 120;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(args.next().context("--config requires a path")?);
            }
            "--timeout-secs" => {
                timeout_secs = args
                    .next()
                    .context("--timeout-secs requires a value")?
                    .parse()
                    .context("--timeout-secs must be an integer")?;
            }
            other if !other.starts_with('-') => scenario = other.to_string(),
            other => bail!("unknown flag {other:?}"),
        }
    }
    Ok(Args {
        scenario,
        config_path,
        timeout_secs,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let scenario = Scenario::by_name(&args.scenario).with_context(|| {
        format!(
            "unknown scenario {:?} (available: {})",
            args.scenario,
            Scenario::names().join(", ")
        )
    })?;

    let cfg: Config = match &args.config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {path}"))?
        }
        None => Config::default(),
    };

    let mut sim = Simulation::from_scenario(&scenario, cfg, Arc::new(ConsoleNotifier))?;
    sim.start();

    let settled = sim.wait_for_movers(Duration::from_secs(args.timeout_secs)).await;
    sim.shutdown().await;

    println!("\nfinal board:\n{}", sim.grid().lock().render());
    for status in sim.statuses() {
        println!(
            "{:<12} {:?} at {} -> {} [{}] reached={}",
            status.id, status.role, status.pos, status.target, status.state, status.reached_target
        );
    }

    if !settled {
        bail!("movers did not settle within {} seconds", args.timeout_secs);
    }
    Ok(())
}
