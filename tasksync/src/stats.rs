//! Summary figures over a set of tasks.
//!
//! Pure helpers the presentation layer can run over any task slice,
//! typically the viewer-scoped output of the filter path.

use std::cmp::Reverse;

use tasksync_model::{Priority, Task, TaskStatus, Timestamp};

/// Task counts per workflow status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
}

/// Task counts per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

/// One bundle of summary figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Tasks in the set.
    pub total: usize,
    /// Breakdown by workflow status.
    pub by_status: StatusCounts,
    /// Breakdown by priority.
    pub by_priority: PriorityCounts,
    /// Tasks past their deadline and not completed.
    pub overdue: usize,
    /// Completed share of the set, rounded to whole percent.
    pub completion_rate: u8,
}

/// Counts tasks per workflow status.
#[must_use]
pub fn status_counts(tasks: &[Task]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for task in tasks {
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Cancelled => counts.cancelled += 1,
        }
    }
    counts
}

/// Counts tasks per priority.
#[must_use]
pub fn priority_counts(tasks: &[Task]) -> PriorityCounts {
    let mut counts = PriorityCounts::default();
    for task in tasks {
        match task.priority {
            Priority::Low => counts.low += 1,
            Priority::Medium => counts.medium += 1,
            Priority::High => counts.high += 1,
        }
    }
    counts
}

/// Counts tasks whose deadline has passed without completion. Cancelled
/// tasks with a lapsed deadline still count; tasks without a deadline
/// never do.
#[must_use]
pub fn overdue_count(tasks: &[Task], now: Timestamp) -> usize {
    tasks
        .iter()
        .filter(|task| {
            task.status != TaskStatus::Completed
                && task.deadline.is_some_and(|deadline| deadline < now)
        })
        .count()
}

/// Completed share of the set as a whole percent, rounded half up.
/// An empty set rates zero.
#[must_use]
pub fn completion_rate(tasks: &[Task]) -> u8 {
    let total = tasks.len();
    if total == 0 {
        return 0;
    }
    let completed = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .count();
    u8::try_from((completed * 100 + total / 2) / total).unwrap_or(100)
}

/// The `limit` most recently updated tasks, newest first. Tasks without
/// an update timestamp rank oldest; ties keep their incoming order.
#[must_use]
pub fn recent_activity(tasks: &[Task], limit: usize) -> Vec<Task> {
    let mut recent = tasks.to_vec();
    recent.sort_by_key(|task| Reverse(task.updated_at.map_or(0, Timestamp::as_millis)));
    recent.truncate(limit);
    recent
}

/// Computes the full summary bundle for the set.
#[must_use]
pub fn summarize(tasks: &[Task], now: Timestamp) -> TaskStats {
    TaskStats {
        total: tasks.len(),
        by_status: status_counts(tasks),
        by_priority: priority_counts(tasks),
        overdue: overdue_count(tasks, now),
        completion_rate: completion_rate(tasks),
    }
}
