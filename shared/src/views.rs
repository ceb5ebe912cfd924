use serde::Serialize;
use std::str::FromStr;

use crate::types::{Report, ReportStatus};

/// Per-status totals for the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub declined: usize,
    pub resolved: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(ReportStatus),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(StatusFilter::All),
            other => other.parse::<ReportStatus>().map(StatusFilter::Only),
        }
    }
}

impl StatusFilter {
    fn matches(&self, status: ReportStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

pub fn count_by_status(reports: &[Report]) -> StatusCounts {
    reports.iter().fold(StatusCounts::default(), |mut counts, report| {
        match report.status {
            ReportStatus::Pending => counts.pending += 1,
            ReportStatus::Approved => counts.approved += 1,
            ReportStatus::Declined => counts.declined += 1,
            ReportStatus::Resolved => counts.resolved += 1,
        }
        counts.total += 1;
        counts
    })
}

/// Reports matching `filter`, newest first
pub fn filter_by_status(reports: &[Report], filter: StatusFilter) -> Vec<Report> {
    let mut selected: Vec<Report> = reports
        .iter()
        .filter(|r| filter.matches(r.status))
        .cloned()
        .collect();
    newest_first(&mut selected);
    selected
}

/// Processed reports, most recently reviewed first
pub fn history(reports: &[Report]) -> Vec<Report> {
    let mut processed: Vec<Report> = reports
        .iter()
        .filter(|r| r.status.is_terminal())
        .cloned()
        .collect();
    processed.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    processed
}

pub(crate) fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
