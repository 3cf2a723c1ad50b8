//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Maximum bytes of command output stored per step
pub const MAX_STEP_OUTPUT: usize = 8 * 1024;

/// Truncate free-form command output to `max` bytes, keeping the head and
/// tail, which is where apt and systemd put the interesting lines.
pub fn truncate_output(output: &str, max: usize) -> String {
    if output.len() <= max {
        return output.to_string();
    }
    let keep = max / 2;
    let head_end = floor_char_boundary(output, keep);
    let tail_start = ceil_char_boundary(output, output.len() - keep);
    format!(
        "{}\n... [{} bytes truncated] ...\n{}",
        &output[..head_end],
        output.len() - head_end - (output.len() - tail_start),
        &output[tail_start..]
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Run connectivity diagnostics and print a human-readable report.
///
/// Used by `clusterd --diagnostic` before pointing a dashboard at a fresh
/// install.
pub async fn run_diagnostic(
    layout: &crate::storage::layout::StorageLayout,
    settings: &crate::storage::settings::Settings,
) {
    use colored::Colorize;

    println!("clusterd diagnostics");
    println!("--------------------");

    // 1. scontrol on PATH
    let scontrol = tokio::process::Command::new("scontrol")
        .arg("--version")
        .output()
        .await;
    match scontrol {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            println!("scontrol:      {} ({})", "OK".green(), version);
        }
        Ok(output) => {
            println!(
                "scontrol:      {} (exit {})",
                "FAIL".red(),
                output.status.code().unwrap_or(-1)
            );
        }
        Err(e) => println!("scontrol:      {} ({})", "FAIL".red(), e),
    }

    // 2. salt-api reachability
    if settings.salt.enabled {
        let reachable = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .ok();
        match reachable {
            Some(client) => match client.get(&settings.salt.api_url).send().await {
                Ok(response) => println!(
                    "salt-api:      {} ({} -> {})",
                    "OK".green(),
                    settings.salt.api_url,
                    response.status()
                ),
                Err(e) => println!("salt-api:      {} ({})", "FAIL".red(), e),
            },
            None => println!("salt-api:      {} (client build failed)", "FAIL".red()),
        }
    } else {
        println!("salt-api:      {}", "disabled".yellow());
    }

    // 3. storage writability
    let probe = crate::filesys::file::File::new(layout.base_dir.join(".diagnostic"));
    let write = probe.write_json(&serde_json::json!({"probe": true})).await;
    match write {
        Ok(()) => {
            let _ = probe.delete().await;
            println!("storage:       {} ({})", "OK".green(), layout.base_dir.display());
        }
        Err(e) => println!("storage:       {} ({})", "FAIL".red(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_short_passthrough() {
        assert_eq!(truncate_output("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_output_long() {
        let long = "x".repeat(10_000);
        let truncated = truncate_output(&long, 1_000);
        assert!(truncated.len() < 1_200);
        assert!(truncated.contains("truncated"));
    }
}
