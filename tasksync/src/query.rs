//! Filtering and sorting over the task mirror.
//!
//! Everything here is pure and synchronous: functions take mirror
//! snapshots and produce views, with no I/O and no hidden state. Role
//! scoping is applied before any caller-supplied criteria and cannot be
//! widened by them.

use tasksync_model::{Priority, Role, Task, TaskStatus, Timestamp, User, UserId};

/// An inclusive deadline window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Earliest deadline included.
    pub start: Timestamp,
    /// Latest deadline included.
    pub end: Timestamp,
}

impl DateRange {
    /// Whether `at` falls inside the window, bounds included.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Criteria for selecting tasks from the visible set.
///
/// All populated fields must match at once. An empty filter selects every
/// visible task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Keep only tasks in this workflow status.
    pub status: Option<TaskStatus>,
    /// Keep only tasks at this priority.
    pub priority: Option<Priority>,
    /// Keep only tasks assigned to this user.
    pub assigned_to: Option<UserId>,
    /// Keep only tasks for this client.
    pub client_id: Option<UserId>,
    /// Case-insensitive substring of the title or description. Empty
    /// text imposes no constraint.
    pub search: Option<String>,
    /// Keep only tasks whose deadline falls in this window. Tasks
    /// without a deadline never match.
    pub date_range: Option<DateRange>,
}

/// Available orderings for task views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskSort {
    /// Soonest deadline first; tasks without one sort last.
    #[default]
    Deadline,
    /// Most severe priority first.
    Priority,
    /// Workflow order: completed, in progress, pending, cancelled.
    Status,
}

impl TaskSort {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Priority => "priority",
            Self::Status => "status",
        }
    }
}

impl std::fmt::Display for TaskSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `task` falls inside `viewer`'s visibility scope: providers
/// see what they created, clients see what is assigned to them.
#[must_use]
pub fn visible_to(viewer: &User, task: &Task) -> bool {
    match viewer.role {
        Role::Provider => task.created_by == viewer.id,
        Role::Client => task.assigned_to == viewer.id,
    }
}

/// Whether `task` satisfies every populated criterion of `filter`.
#[must_use]
pub fn matches_filter(task: &Task, filter: &TaskFilter) -> bool {
    filter.status.is_none_or(|want| task.status == want)
        && filter.priority.is_none_or(|want| task.priority == want)
        && filter
            .assigned_to
            .as_ref()
            .is_none_or(|want| &task.assigned_to == want)
        && filter
            .client_id
            .as_ref()
            .is_none_or(|want| &task.client_id == want)
        && filter.search.as_deref().is_none_or(|needle| {
            needle.is_empty() || {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
            }
        })
        && filter
            .date_range
            .is_none_or(|range| task.deadline.is_some_and(|deadline| range.contains(deadline)))
}

/// Selects the tasks `viewer` may see that also match `filter`, in the
/// order they appear in `tasks`.
#[must_use]
pub fn filter_tasks(viewer: &User, tasks: &[Task], filter: &TaskFilter) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| visible_to(viewer, task) && matches_filter(task, filter))
        .cloned()
        .collect()
}

/// Reorders `tasks` in place. The sort is stable: ties keep their
/// incoming relative order.
pub fn sort_tasks(tasks: &mut [Task], sort: TaskSort) {
    match sort {
        TaskSort::Deadline => tasks.sort_by_key(|task| {
            (
                task.deadline.is_none(),
                task.deadline.map_or(0, Timestamp::as_millis),
            )
        }),
        TaskSort::Priority => {
            tasks.sort_by_key(|task| std::cmp::Reverse(task.priority.severity()));
        }
        TaskSort::Status => tasks.sort_by_key(|task| task.status.workflow_rank()),
    }
}
