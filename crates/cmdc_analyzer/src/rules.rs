//! Deterministic output rules.
//!
//! Every rule that matches contributes facts, concerns and warnings; the
//! results are merged into one [`AnalysisResult`].

use regex::Regex;

use cmdc_core::{
    AnalysisFacts, AnalysisResult, AnalysisSource, FilesystemUsage, LoadFacts, LoadSeverity,
    LoadTrend, ProcessFacts, ProcessUsage, RaidArray, StorageFacts,
};

const RULE_CONFIDENCE: f64 = 0.95;
const GENERIC_CONFIDENCE: f64 = 0.8;

const USAGE_CONCERN: u8 = 80;
const USAGE_WARNING: u8 = 70;
const AGGREGATE_CONCERN: f64 = 80.0;
const TOP_PROCESSES: usize = 5;

/// Parse the first load-average triple (`uptime`, `top`, `w`).
pub fn parse_load(output: &str) -> Option<LoadFacts> {
    let re = Regex::new(r"load averages?:\s*([\d.]+),?\s+([\d.]+),?\s+([\d.]+)").ok()?;
    let caps = re.captures(output)?;
    let load1: f64 = caps.get(1)?.as_str().parse().ok()?;
    let load5: f64 = caps.get(2)?.as_str().parse().ok()?;
    let load15: f64 = caps.get(3)?.as_str().parse().ok()?;

    let trend = if load1 < load5 {
        LoadTrend::Decreasing
    } else if load1 > load5 {
        LoadTrend::Increasing
    } else {
        LoadTrend::Stable
    };

    Some(LoadFacts {
        load1,
        load5,
        load15,
        trend,
        severity: LoadSeverity::from_load(load1),
    })
}

/// Parse a `df` table. Returns `None` without a `Use%` header.
pub fn parse_df(output: &str) -> Option<Vec<FilesystemUsage>> {
    let mut lines = output.lines().skip_while(|l| !(l.contains("Use%") && l.contains("Mounted")));
    lines.next()?;

    let filesystems: Vec<FilesystemUsage> = lines
        .map_while(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let used_percent = fields[4].strip_suffix('%')?.parse().ok()?;
            Some(FilesystemUsage {
                filesystem: fields[0].to_string(),
                mount: fields[5..].join(" "),
                used_percent,
            })
        })
        .collect();

    if filesystems.is_empty() {
        None
    } else {
        Some(filesystems)
    }
}

/// Parse `/proc/mdstat` arrays.
///
/// An array is healthy only when its status marker is all `U` (`[UU]`).
pub fn parse_mdstat(output: &str) -> Option<Vec<RaidArray>> {
    let header = Regex::new(r"^(md\d+)\s*:").ok()?;
    let marker = Regex::new(r"\[([U_]+)\]").ok()?;

    let mut arrays: Vec<RaidArray> = Vec::new();
    for line in output.lines() {
        if let Some(caps) = header.captures(line.trim_start()) {
            arrays.push(RaidArray {
                name: caps[1].to_string(),
                marker: None,
                degraded: true,
            });
        } else if line.trim().is_empty() {
            continue;
        }

        if let Some(array) = arrays.last_mut() {
            if array.marker.is_none() {
                if let Some(caps) = marker.captures(line) {
                    let status = caps[1].to_string();
                    array.degraded = status.contains('_');
                    array.marker = Some(status);
                }
            }
        }
    }

    if arrays.is_empty() {
        None
    } else {
        Some(arrays)
    }
}

/// Parse a `ps aux` listing.
pub fn parse_ps(output: &str) -> Option<ProcessFacts> {
    let mut lines = output
        .lines()
        .skip_while(|l| !(l.contains("%CPU") && l.contains("%MEM") && l.contains("PID")));
    lines.next()?;

    let mut processes: Vec<ProcessUsage> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 11 {
                return None;
            }
            Some(ProcessUsage {
                user: fields[0].to_string(),
                pid: fields[1].parse().ok()?,
                cpu: fields[2].parse().ok()?,
                mem: fields[3].parse().ok()?,
                command: fields[10..].join(" "),
            })
        })
        .collect();

    if processes.is_empty() {
        return None;
    }

    let total_cpu = processes.iter().map(|p| p.cpu).sum();
    let total_mem = processes.iter().map(|p| p.mem).sum();
    processes.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(std::cmp::Ordering::Equal));
    processes.truncate(TOP_PROCESSES);

    Some(ProcessFacts {
        total_cpu,
        total_mem,
        top: processes,
    })
}

/// Findings accumulated across rules.
#[derive(Default)]
struct Findings {
    summary: Vec<String>,
    concerns: Vec<String>,
    warnings: Vec<String>,
    recommendations: Vec<String>,
    details: Vec<String>,
    facts: Vec<AnalysisFacts>,
}

impl Findings {
    fn load(&mut self, load: LoadFacts) {
        self.summary.push(format!(
            "System load is {} and {} ({:.2} over 1 min, {:.2} over 5 min)",
            load.severity, load.trend, load.load1, load.load5
        ));
        match load.severity {
            LoadSeverity::High | LoadSeverity::Critical => {
                self.concerns.push(format!(
                    "{} load average: {:.2}",
                    capitalize(&load.severity.to_string()),
                    load.load1
                ));
                self.recommendations
                    .push("Check the busiest processes with 'top processes'".to_string());
            }
            LoadSeverity::Moderate => self
                .warnings
                .push(format!("Moderate load average: {:.2}", load.load1)),
            _ => {}
        }
        self.details.push(format!(
            "Load averages: {:.2} {:.2} {:.2}",
            load.load1, load.load5, load.load15
        ));
        self.facts.push(AnalysisFacts::Load(load));
    }

    fn storage(&mut self, filesystems: Vec<FilesystemUsage>, raid: Vec<RaidArray>) {
        if let Some(fullest) = filesystems.iter().max_by_key(|f| f.used_percent) {
            self.summary.push(format!(
                "{} filesystem(s) checked, fullest is {} at {}%",
                filesystems.len(),
                fullest.mount,
                fullest.used_percent
            ));
        }
        for fs in &filesystems {
            if fs.used_percent > USAGE_CONCERN {
                self.concerns.push(format!(
                    "{} ({}) is {}% full",
                    fs.mount, fs.filesystem, fs.used_percent
                ));
                self.recommendations
                    .push(format!("Free up space on {}", fs.mount));
            } else if fs.used_percent > USAGE_WARNING {
                self.warnings.push(format!(
                    "{} ({}) is {}% full",
                    fs.mount, fs.filesystem, fs.used_percent
                ));
            }
        }

        if !raid.is_empty() {
            let degraded = raid.iter().filter(|a| a.degraded).count();
            self.summary.push(format!(
                "{} RAID array(s), {} degraded",
                raid.len(),
                degraded
            ));
            for array in raid.iter().filter(|a| a.degraded) {
                let marker = array.marker.as_deref().unwrap_or("no status");
                self.concerns
                    .push(format!("RAID array {} is degraded [{}]", array.name, marker));
            }
            if degraded > 0 {
                self.recommendations
                    .push("Inspect the array with 'raid status' and replace failed disks".to_string());
            }
        }

        self.facts.push(AnalysisFacts::Storage(StorageFacts { filesystems, raid }));
    }

    fn processes(&mut self, processes: ProcessFacts) {
        self.summary.push(format!(
            "Processes use {:.1}% CPU and {:.1}% memory in total",
            processes.total_cpu, processes.total_mem
        ));
        if processes.total_cpu > AGGREGATE_CONCERN {
            self.concerns
                .push(format!("High aggregate CPU usage: {:.1}%", processes.total_cpu));
        }
        if processes.total_mem > AGGREGATE_CONCERN {
            self.concerns
                .push(format!("High aggregate memory usage: {:.1}%", processes.total_mem));
        }
        if processes.total_cpu > AGGREGATE_CONCERN || processes.total_mem > AGGREGATE_CONCERN {
            self.recommendations
                .push("Review the top processes and stop runaway ones".to_string());
        }
        let top: Vec<String> = processes
            .top
            .iter()
            .map(|p| format!("{} (pid {}, {:.1}% CPU)", p.command, p.pid, p.cpu))
            .collect();
        self.details.push(format!("Top processes: {}", top.join(", ")));
        self.facts.push(AnalysisFacts::Processes(processes));
    }

    fn into_result(self) -> AnalysisResult {
        if self.facts.is_empty() {
            return AnalysisResult {
                summary: "No immediate concerns detected".to_string(),
                concerns: Vec::new(),
                warnings: Vec::new(),
                recommendations: Vec::new(),
                details: "Output did not match a known command pattern".to_string(),
                confidence: GENERIC_CONFIDENCE,
                source: AnalysisSource::RuleBased,
                facts: Vec::new(),
            };
        }

        AnalysisResult {
            summary: self.summary.join("; "),
            concerns: self.concerns,
            warnings: self.warnings,
            recommendations: self.recommendations,
            details: self.details.join("\n"),
            confidence: RULE_CONFIDENCE,
            source: AnalysisSource::RuleBased,
            facts: self.facts,
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Analyse captured output with every rule.
pub fn analyze_output(output: &str) -> AnalysisResult {
    let mut findings = Findings::default();

    if let Some(load) = parse_load(output) {
        findings.load(load);
    }

    let filesystems = parse_df(output).unwrap_or_default();
    let raid = parse_mdstat(output).unwrap_or_default();
    if !filesystems.is_empty() || !raid.is_empty() {
        findings.storage(filesystems, raid);
    }

    if let Some(processes) = parse_ps(output) {
        findings.processes(processes);
    }

    findings.into_result()
}
