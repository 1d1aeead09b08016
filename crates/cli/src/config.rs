//! Cluster access and argument parsing helpers

use anyhow::{Context, Result};
use explorer_lib::{MetricKind, SortField};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::time::Duration;

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

/// Build a cluster client from a kubeconfig file and optional context
pub async fn kube_client(kubeconfig: Option<&str>, context: Option<String>) -> Result<Client> {
    let path = kubeconfig_path(kubeconfig)?;
    let kubeconfig = Kubeconfig::read_from(&path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;

    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("Failed to load cluster configuration")?;

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Parse durations such as `90s`, `30m`, `4h`, `7d` or `1h30m`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    anyhow::ensure!(!input.is_empty(), "duration must not be empty");

    let mut total = 0u64;
    let mut digits = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            other => anyhow::bail!("unknown duration unit '{}' in '{}'", other, input),
        };
        let amount: u64 = digits
            .parse()
            .with_context(|| format!("missing number before '{}' in '{}'", ch, input))?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .with_context(|| format!("duration '{}' is too large", input))?;
        digits.clear();
    }

    anyhow::ensure!(digits.is_empty(), "duration '{}' is missing a unit", input);
    anyhow::ensure!(total > 0, "duration must be positive");

    Ok(Duration::from_secs(total))
}

pub fn parse_metric_kind(input: &str) -> Result<MetricKind> {
    input.parse()
}

pub fn parse_sort_field(input: &str) -> Result<SortField> {
    input.parse()
}

/// Render a duration the way `parse_duration` accepts it
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}
