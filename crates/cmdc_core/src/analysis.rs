//! Analysis result types.

use serde::{Deserialize, Serialize};

/// Where an analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisSource {
    ExternalService,
    RuleBased,
}

/// Structured interpretation of a finished command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub details: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub source: AnalysisSource,
    /// Typed findings of the rule-based analysis
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<AnalysisFacts>,
}

impl AnalysisResult {
    pub fn has_concerns(&self) -> bool {
        !self.concerns.is_empty()
    }

    /// Load facts, if the load rule matched.
    pub fn load(&self) -> Option<&LoadFacts> {
        self.facts.iter().find_map(|f| match f {
            AnalysisFacts::Load(load) => Some(load),
            _ => None,
        })
    }

    /// Storage facts, if the storage rule matched.
    pub fn storage(&self) -> Option<&StorageFacts> {
        self.facts.iter().find_map(|f| match f {
            AnalysisFacts::Storage(storage) => Some(storage),
            _ => None,
        })
    }

    /// Process facts, if the process rule matched.
    pub fn processes(&self) -> Option<&ProcessFacts> {
        self.facts.iter().find_map(|f| match f {
            AnalysisFacts::Processes(processes) => Some(processes),
            _ => None,
        })
    }
}

/// Findings of one matched rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisFacts {
    Load(LoadFacts),
    Storage(StorageFacts),
    Processes(ProcessFacts),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for LoadTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Decreasing => write!(f, "decreasing"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadSeverity {
    Minimal,
    Normal,
    Moderate,
    High,
    Critical,
}

impl LoadSeverity {
    /// Bucket a 1-minute load average.
    pub fn from_load(load: f64) -> Self {
        if load < 0.7 {
            Self::Minimal
        } else if load < 1.0 {
            Self::Normal
        } else if load < 2.0 {
            Self::Moderate
        } else if load < 4.0 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for LoadSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Minimal => "minimal",
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadFacts {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub trend: LoadTrend,
    pub severity: LoadSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemUsage {
    pub filesystem: String,
    pub mount: String,
    pub used_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidArray {
    pub name: String,
    /// Member status marker such as `UU` or `U_`
    pub marker: Option<String>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageFacts {
    pub filesystems: Vec<FilesystemUsage>,
    pub raid: Vec<RaidArray>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub user: String,
    pub pid: u32,
    pub cpu: f64,
    pub mem: f64,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFacts {
    pub total_cpu: f64,
    pub total_mem: f64,
    /// Highest CPU consumers, descending
    pub top: Vec<ProcessUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_buckets() {
        assert_eq!(LoadSeverity::from_load(0.2), LoadSeverity::Minimal);
        assert_eq!(LoadSeverity::from_load(0.7), LoadSeverity::Normal);
        assert_eq!(LoadSeverity::from_load(1.5), LoadSeverity::Moderate);
        assert_eq!(LoadSeverity::from_load(2.0), LoadSeverity::High);
        assert_eq!(LoadSeverity::from_load(4.0), LoadSeverity::Critical);
    }

    #[test]
    fn test_facts_serialize_with_kind_tag() {
        let facts = AnalysisFacts::Load(LoadFacts {
            load1: 0.5,
            load5: 0.8,
            load15: 0.9,
            trend: LoadTrend::Decreasing,
            severity: LoadSeverity::Minimal,
        });

        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["kind"], "load");
        assert_eq!(json["trend"], "decreasing");
    }
}
