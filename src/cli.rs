use clap::Parser;

/// Scores, researches and prioritizes CRM leads stored in Notion.
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(version, about)]
pub struct Cli {
    /// Save credentials to .env, verify Notion access and create missing
    /// output columns, then exit.
    #[arg(long, conflicts_with_all = ["dry_run", "sample"])]
    pub setup: bool,

    /// Derive fields but write nothing back and keep the state file untouched.
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most N leads.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Reprocess every lead, ignoring stored fingerprints.
    #[arg(long)]
    pub full_refresh: bool,

    /// Only process leads with this status.
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,

    /// Run against built-in sample leads instead of Notion (implies --dry-run).
    #[arg(long)]
    pub sample: bool,

    /// Post the run summary to SLACK_WEBHOOK_URL.
    #[arg(long)]
    pub slack: bool,
}

impl Cli {
    pub fn is_dry_run(&self) -> bool {
        self.dry_run || self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from(["lead-copilot", "--limit", "5", "--full-refresh", "--slack"]).unwrap();
        assert_eq!(cli.limit, Some(5));
        assert!(cli.full_refresh);
        assert!(cli.slack);
        assert!(!cli.is_dry_run());
    }

    #[test]
    fn sample_implies_dry_run() {
        let cli = Cli::try_parse_from(["lead-copilot", "--sample"]).unwrap();
        assert!(cli.is_dry_run());
    }

    #[test]
    fn setup_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["lead-copilot", "--setup", "--dry-run"]).is_err());
    }

    #[test]
    fn rejects_non_numeric_limit() {
        assert!(Cli::try_parse_from(["lead-copilot", "--limit", "many"]).is_err());
    }
}
