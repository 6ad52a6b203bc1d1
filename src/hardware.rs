// src/hardware.rs

//! CPU detection used to size the transform window.
//!
//! Detection happens at runtime, so a binary built on one machine sizes its
//! pool for the machine it runs on.  Only the Linux affinity mask is
//! consulted; everything else falls back to `num_cpus`.

#[cfg(target_os = "linux")]
use std::fs;

/// CPU count from the current process affinity mask.
///
/// Respects masks set by taskset / cpuset and container CPU limits that show
/// up in `/proc/self/status` as `Cpus_allowed_list`.  Falls back to the
/// total system CPU count if the mask cannot be read.
pub fn get_affinity_cpu_count() -> usize {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = fs::read_to_string("/proc/self/status") {
            if let Some(count) = affinity_from_status(&status) {
                tracing::debug!("CPU affinity mask: {} CPUs", count);
                return count;
            }
        }
    }

    num_cpus::get()
}

#[cfg(target_os = "linux")]
fn affinity_from_status(status: &str) -> Option<usize> {
    let line = status
        .lines()
        .find(|line| line.starts_with("Cpus_allowed_list:"))?;
    let cpus = line.split(':').nth(1)?.trim();
    match parse_cpu_list(cpus) {
        0 => None,
        n => Some(n),
    }
}

/// Count the CPUs in a Linux CPU list such as `0-11,24-35` or `0,2,4`.
///
/// Malformed or reversed parts count as zero.
pub fn parse_cpu_list(cpu_list: &str) -> usize {
    cpu_list
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                (Ok(lo), Ok(hi)) if hi >= lo => hi - lo + 1,
                _ => 0,
            },
            None => usize::from(part.parse::<usize>().is_ok()),
        })
        .sum()
}

/// Total logical CPUs on the system, ignoring affinity.
pub fn total_cpus() -> usize {
    num_cpus::get()
}
