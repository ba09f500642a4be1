//! `budget` command: resolve the budget table for a profile and check values.

use adaptload::budget::{BudgetCheck, BudgetTable, MetricKey};
use adaptload::environment::classify;
use adaptload::ConfigFile;
use clap::Args;
use serde_json::json;

use super::common::EnvironmentArgs;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct BudgetArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Check a value against the resolved table (e.g. --check lcp=3100)
    #[arg(long, value_name = "METRIC=VALUE", value_parser = parse_check)]
    pub check: Vec<(MetricKey, f64)>,

    /// Print the table and checks as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the budget command.
pub fn run(args: BudgetArgs, config: &ConfigFile) -> Result<(), CliError> {
    let profile = classify(args.environment.provider().as_ref());
    let table = config.budget.tables.resolve(&profile);

    let checks: Vec<(MetricKey, f64, BudgetCheck)> = args
        .check
        .iter()
        .map(|&(metric, value)| (metric, value, check(&table, metric, value)))
        .collect();

    if args.json {
        let ceilings: serde_json::Map<String, serde_json::Value> = table
            .iter()
            .map(|(metric, ceiling)| (metric.as_str().to_string(), json!(ceiling)))
            .collect();
        let checks: Vec<serde_json::Value> = checks
            .iter()
            .map(|(metric, value, check)| {
                json!({ "metric": metric.as_str(), "value": value, "result": check })
            })
            .collect();
        let output = json!({
            "profile": profile,
            "ceilings": ceilings,
            "checks": checks,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Budget for {}", profile);
    println!();
    for (metric, ceiling) in table.iter() {
        println!("  {:<18} {:>10} {}", metric.as_str(), ceiling, metric.unit());
    }

    if !checks.is_empty() {
        println!();
        for (metric, value, check) in &checks {
            let verdict = match check.severity {
                None if table.ceiling(*metric).is_none() => "no budget".to_string(),
                None => "within budget".to_string(),
                Some(severity) => format!("{} violation", severity),
            };
            println!(
                "  {} = {} ({:.0}% of ceiling): {}",
                metric, value, check.percentage_of_ceiling, verdict
            );
        }
    }

    Ok(())
}

fn check(table: &BudgetTable, metric: MetricKey, value: f64) -> BudgetCheck {
    match table.ceiling(metric) {
        Some(ceiling) => BudgetCheck::evaluate(value, ceiling),
        None => BudgetCheck::unbudgeted(),
    }
}

fn parse_check(s: &str) -> Result<(MetricKey, f64), String> {
    let (metric, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected METRIC=VALUE, got '{}'", s))?;
    let metric: MetricKey = metric.parse()?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value '{}': {}", value.trim(), e))?;
    Ok((metric, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptload::budget::{BudgetTables, Severity};
    use adaptload::environment::{DeviceClass, EnvironmentProfile, NetworkClass};

    #[test]
    fn test_parse_check() {
        assert_eq!(parse_check("cls=0.25"), Ok((MetricKey::CumulativeLayoutShift, 0.25)));
        assert_eq!(parse_check("LCP = 3100"), Ok((MetricKey::LargestContentfulPaint, 3100.0)));
        assert!(parse_check("cls").is_err());
        assert!(parse_check("speed=1").is_err());
        assert!(parse_check("fcp=fast").is_err());
    }

    #[test]
    fn test_check_against_resolved_table() {
        let profile = EnvironmentProfile::new(NetworkClass::Fast, DeviceClass::Normal, false);
        let table = BudgetTables::default().resolve(&profile);

        let result = check(&table, MetricKey::CumulativeLayoutShift, 0.25);
        assert_eq!(result.severity, Some(Severity::Medium));
        assert!(!result.within_budget);

        let result = check(&table, MetricKey::FirstContentfulPaint, 1000.0);
        assert!(result.within_budget);
    }

    #[test]
    fn test_unbudgeted_metric() {
        let table = BudgetTable::new();
        let result = check(&table, MetricKey::MemoryUsage, 999.0);
        assert!(result.within_budget);
        assert_eq!(result.severity, None);
    }
}
