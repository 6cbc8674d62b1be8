//! Read-side rollups over a reconciled curriculum

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::assignments::ActiveAssignment;
use crate::db::paths::PathRow;

/// Progress summary of a user's active curriculum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumStats {
    pub has_roadmap: bool,
    pub path_id: Option<String>,
    pub path_name: Option<String>,
    pub total_modules: usize,
    pub completed_modules: usize,
    /// Rounded to the nearest whole percent
    pub completion_percentage: u32,
    pub total_hours: f64,
    pub remaining_hours: f64,
    pub weeks_remaining: Option<u32>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
}

impl CurriculumStats {
    /// The well-formed result for a user without an active path
    pub fn no_roadmap() -> Self {
        Self {
            has_roadmap: false,
            path_id: None,
            path_name: None,
            total_modules: 0,
            completed_modules: 0,
            completion_percentage: 0,
            total_hours: 0.0,
            remaining_hours: 0.0,
            weeks_remaining: None,
            estimated_completion_date: None,
        }
    }
}

/// Aggregate stats for `path` and its active assignments.
///
/// No ETA is produced when `weekly_hours` is not a positive number, or when
/// the estimate falls outside the representable date range.
pub fn aggregate(
    path: Option<&PathRow>,
    active: &[ActiveAssignment],
    weekly_hours: f64,
    now: DateTime<Utc>,
) -> CurriculumStats {
    let path = match path {
        Some(path) => path,
        None => return CurriculumStats::no_roadmap(),
    };

    let total_modules = active.len();
    let completed_modules = active.iter().filter(|a| a.assignment.is_completed).count();
    let completion_percentage = percentage(completed_modules, total_modules);

    let total_hours: f64 = active.iter().map(|a| a.module.estimated_hours.max(0.0)).sum();
    let remaining_hours: f64 = active
        .iter()
        .filter(|a| !a.assignment.is_completed)
        .map(|a| a.module.estimated_hours.max(0.0))
        .sum();

    let (weeks_remaining, estimated_completion_date) = match eta(remaining_hours, weekly_hours, now) {
        Some((weeks, date)) => (Some(weeks), Some(date)),
        None => (None, None),
    };

    CurriculumStats {
        has_roadmap: true,
        path_id: Some(path.path_id.clone()),
        path_name: Some(path.name.clone()),
        total_modules,
        completed_modules,
        completion_percentage,
        total_hours,
        remaining_hours,
        weeks_remaining,
        estimated_completion_date,
    }
}

fn percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as u32
}

fn eta(remaining_hours: f64, weekly_hours: f64, now: DateTime<Utc>) -> Option<(u32, DateTime<Utc>)> {
    if !weekly_hours.is_finite() || weekly_hours <= 0.0 {
        return None;
    }
    let weeks = (remaining_hours / weekly_hours).ceil();
    if !weeks.is_finite() || weeks < 0.0 || weeks > f64::from(u32::MAX) {
        return None;
    }
    let weeks = weeks as u32;
    let date = Duration::try_weeks(i64::from(weeks)).and_then(|d| now.checked_add_signed(d))?;
    Some((weeks, date))
}
