// Push item payloads for the built-in queues

use serde::{Deserialize, Serialize};

/// Coverage report ready to be pushed to the Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageItem {
    pub job_id: String,
    pub build_id: String,
    pub report_file: String,
    pub report_type: String,
}

/// Static-analysis results ready to be pushed to the Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub job_id: String,
    pub build_id: String,
    pub project_key: String,
    pub server_url: String,
}
