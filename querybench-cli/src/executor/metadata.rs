//! Report Metadata
//!
//! Harness version, generation time, and where the suite ran:
//!
//! - **Git**: commit of the working directory, when inside a repository
//! - **Host**: `/proc/sys/kernel/hostname` on Linux, `HOSTNAME` elsewhere

use chrono::Utc;
use querybench_report::ReportMeta;

/// Build report metadata for a suite run
pub fn build_report_meta(sequence_id: &str, environment: &str) -> ReportMeta {
    ReportMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        sequence_id: sequence_id.to_string(),
        environment: environment.to_string(),
        hostname: hostname(),
        git_commit: git_commit(),
    }
}

fn git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn hostname() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
            let name = name.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty())
}
