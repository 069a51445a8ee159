//! Anomaly findings produced by the statistics engine

use serde::{Deserialize, Serialize};

/// Finding type for repeated failed logins from one source address
pub const MULTIPLE_FAILED_LOGINS: &str = "Multiple Failed Logins";
/// Finding type for record reads outside business hours
pub const AFTER_HOURS_ACCESS: &str = "After-Hours Access";
/// Finding type for a high volume of denied accesses
pub const EXCESSIVE_ACCESS_DENIED: &str = "Excessive Access Denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A threshold-based anomaly over a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub description: String,
    pub severity: Severity,
}

impl Finding {
    pub fn new(finding_type: &str, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            finding_type: finding_type.to_string(),
            description: description.into(),
            severity,
        }
    }
}
