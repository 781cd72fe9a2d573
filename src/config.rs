use anyhow::Context;
use clap::Args;

use crate::averages::WeightingMode;
use crate::roles::Role;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "GRADE_DB_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// How exam percentages combine into a subject average
    #[arg(long, env = "GRADE_WEIGHTING", value_enum, default_value_t = WeightingMode::Literal, global = true)]
    pub weighting: WeightingMode,

    /// Role the command runs as
    #[arg(long, env = "GRADE_ROLE", value_enum, default_value_t = Role::Administrator, global = true)]
    pub role: Role,
}

impl Settings {
    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    pub fn require(&self, allowed: bool, action: &str) -> anyhow::Result<()> {
        if !allowed {
            anyhow::bail!("role {} is not allowed to {action}", self.role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn defaults_to_literal_weighting_as_administrator() {
        let harness = Harness::parse_from(["grade-bulletin"]);
        assert_eq!(harness.settings.weighting, WeightingMode::Literal);
        assert_eq!(harness.settings.role, Role::Administrator);
        assert_eq!(harness.settings.max_connections, 5);
    }

    #[test]
    fn parses_overrides() {
        let harness = Harness::parse_from([
            "grade-bulletin",
            "--weighting",
            "normalized",
            "--role",
            "teacher",
            "--database-url",
            "postgres://localhost/school",
        ]);
        assert_eq!(harness.settings.weighting, WeightingMode::Normalized);
        assert_eq!(harness.settings.role, Role::Teacher);
        assert_eq!(
            harness.settings.database_url().unwrap(),
            "postgres://localhost/school"
        );
    }

    #[test]
    fn role_gate_rejects() {
        let harness = Harness::parse_from(["grade-bulletin", "--role", "parent"]);
        let settings = harness.settings;
        assert!(settings.require(settings.role.can_view_rankings(), "view rankings").is_err());
        assert!(settings.require(settings.role.can_view_student_data(), "view bulletins").is_ok());
    }
}
