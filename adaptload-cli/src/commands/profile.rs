//! `profile` command: show capability probes and the derived profile.

use std::fmt::Display;

use adaptload::environment::{classify, CapabilityProvider, ProbeResult};
use clap::Args;
use serde_json::json;

use super::common::EnvironmentArgs;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Print the profile as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the profile command.
pub fn run(args: ProfileArgs) -> Result<(), CliError> {
    let provider = args.environment.provider();
    let profile = classify(provider.as_ref());

    if args.json {
        let output = json!({
            "profile": profile,
            "probes": probes_json(provider.as_ref()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Capability Probes");
    println!("=================");
    match provider.network() {
        Ok(info) => {
            let effective = info
                .effective_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  network:              {} (save-data: {})", effective, info.save_data);
        }
        Err(e) => println!("  network:              {}", e),
    }
    println!("  device memory (GB):   {}", show(provider.device_memory_gb()));
    println!("  logical cores:        {}", show(provider.logical_cores()));
    println!("  accelerated graphics: {}", show(provider.accelerated_graphics()));
    println!("  background sync:      {}", show(provider.background_sync()));
    println!("  structured storage:   {}", show(provider.structured_storage()));
    println!();
    println!("Profile: {}", profile);
    if profile.is_degraded() {
        println!("  Loads are staggered and prefetch margins shrink on this network.");
    }

    Ok(())
}

fn show<T: Display>(probe: ProbeResult<T>) -> String {
    match probe {
        Ok(value) => value.to_string(),
        Err(e) => e.to_string(),
    }
}

fn probes_json(provider: &dyn CapabilityProvider) -> serde_json::Value {
    fn value<T: Into<serde_json::Value>>(probe: ProbeResult<T>) -> serde_json::Value {
        probe.map(Into::into).unwrap_or(serde_json::Value::Null)
    }

    json!({
        "effective_type": provider
            .network()
            .ok()
            .and_then(|info| info.effective_type)
            .map(|t| t.to_string()),
        "device_memory_gb": value(provider.device_memory_gb()),
        "logical_cores": value(provider.logical_cores()),
        "accelerated_graphics": value(provider.accelerated_graphics()),
        "background_sync": value(provider.background_sync()),
        "structured_storage": value(provider.structured_storage()),
    })
}
