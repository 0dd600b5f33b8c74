//! Process-name → pid resolution (spec §1 "OUT OF SCOPE (external
//! collaborators): ... process-name→PID lookup").
//!
//! The core library only ever accepts a [`proctap_core::CaptureTarget`]; it
//! never looks up a name itself. This module exists purely so the `--name`
//! CLI flag has something to resolve against, using the same
//! shell-out-and-parse idiom `proctap-platform` uses for `pactl`/`lsappinfo`.

use std::process::Command;

use anyhow::{bail, Context};

/// Resolves `name` to a single pid, failing if zero or more than one
/// process matches (an ambiguous name isn't a capturable target).
pub fn resolve_pid(name: &str) -> anyhow::Result<u32> {
    let pids = list_pids_by_name(name)?;
    match pids.as_slice() {
        [] => bail!("no running process named '{name}'"),
        [pid] => Ok(*pid),
        _ => bail!(
            "{} processes named '{name}' are running; use --pid instead",
            pids.len()
        ),
    }
}

#[cfg(target_os = "windows")]
fn list_pids_by_name(name: &str) -> anyhow::Result<Vec<u32>> {
    let image = if name.to_lowercase().ends_with(".exe") {
        name.to_string()
    } else {
        format!("{name}.exe")
    };
    let output = Command::new("tasklist")
        .args(["/FI", &format!("IMAGENAME eq {image}"), "/FO", "CSV", "/NH"])
        .output()
        .context("failed to run tasklist")?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_tasklist_csv(&text))
}

#[cfg(target_os = "windows")]
fn parse_tasklist_csv(text: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            fields.get(1)?.trim_matches('"').parse::<u32>().ok()
        })
        .collect()
}

#[cfg(not(target_os = "windows"))]
fn list_pids_by_name(name: &str) -> anyhow::Result<Vec<u32>> {
    let output = Command::new("pgrep")
        .arg("-x")
        .arg(name)
        .output()
        .context("failed to run pgrep")?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_pgrep_output(&text))
}

#[cfg(not(target_os = "windows"))]
fn parse_pgrep_output(text: &str) -> Vec<u32> {
    text.lines().filter_map(|line| line.trim().parse().ok()).collect()
}
