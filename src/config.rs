use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

use crate::engine::AggregateDefaults;
use crate::valuation::{GradingScale, ScaleKind};

/// Policy settings shared by every subcommand that touches records.
#[derive(Debug, Clone, Args)]
pub struct RecordSettings {
    /// Score range grades are recorded on
    #[arg(long, env = "GRADING_SCALE", value_enum, default_value_t = ScaleKind::Percent)]
    pub grading_scale: ScaleKind,

    /// Overrides the scale's pass threshold
    #[arg(long, env = "PASS_THRESHOLD")]
    pub pass_threshold: Option<f64>,

    /// Semester label stamped on attendance summaries
    #[arg(long, env = "CURRENT_SEMESTER", default_value = "2024-2025")]
    pub current_semester: String,

    /// Display name given to newly created transcripts
    #[arg(long, env = "DEFAULT_STUDENT_NAME", default_value = "Student")]
    pub default_student_name: String,
}

impl RecordSettings {
    pub fn scale(&self) -> GradingScale {
        let scale = GradingScale::new(self.grading_scale);
        match self.pass_threshold {
            Some(threshold) => scale.with_pass_threshold(threshold),
            None => scale,
        }
    }

    pub fn defaults(&self) -> AggregateDefaults {
        AggregateDefaults {
            student_name: self.default_student_name.clone(),
            semester: self.current_semester.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerSettings {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Identity service endpoint that resolves a bearer token
    #[arg(
        long,
        env = "AUTH_SERVICE_URL",
        default_value = "http://localhost:8080/api/auth/me"
    )]
    pub auth_service_url: String,

    #[arg(long, env = "AUTH_TIMEOUT_SECS", default_value_t = 5)]
    pub auth_timeout_secs: u64,

    /// Keep records in process memory instead of Postgres
    #[arg(long)]
    pub in_memory: bool,
}

impl ServerSettings {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        records: RecordSettings,
        #[command(flatten)]
        server: ServerSettings,
    }

    #[test]
    fn twenty_scale_with_override() {
        let harness = Harness::parse_from([
            "test",
            "--grading-scale",
            "twenty",
            "--pass-threshold",
            "12",
            "--current-semester",
            "2025-S2",
        ]);
        let scale = harness.records.scale();
        assert_eq!(scale.max_score(), 20.0);
        assert_eq!(scale.pass_threshold, 12.0);
        assert_eq!(harness.records.defaults().semester, "2025-S2");
        assert!(!harness.server.in_memory);
    }

    #[test]
    fn timeout_never_drops_to_zero() {
        let harness = Harness::parse_from(["test", "--auth-timeout-secs", "0"]);
        assert_eq!(harness.server.auth_timeout(), Duration::from_secs(1));
    }
}
