//! Viewer-relative task views. These are derived, never stored.

use shared::{
    domain::{TaskPriority, TaskStatus, UserId},
    protocol::Task,
};

use crate::paginate::{paginate_by, PageView, PaginateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Assigned to and by the viewer.
    Personal,
    /// Assigned to the viewer by someone else.
    Assigned,
    /// Assigned to someone other than the viewer.
    Employee,
}

impl TaskScope {
    pub fn of(task: &Task, viewer: UserId) -> Self {
        if task.assigned_to_id != viewer {
            TaskScope::Employee
        } else if task.assigned_by_id == viewer {
            TaskScope::Personal
        } else {
            TaskScope::Assigned
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub scope: Option<TaskScope>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn accepts(&self, task: &Task, viewer: UserId) -> bool {
        self.scope.map_or(true, |scope| TaskScope::of(task, viewer) == scope)
            && self.priority.map_or(true, |priority| task.priority == priority)
            && self.status.map_or(true, |status| task.status == status)
    }
}

pub fn paginate_tasks(
    tasks: &[Task],
    viewer: UserId,
    filter: TaskFilter,
    query: &str,
    page_index: usize,
    page_size: usize,
) -> Result<PageView<Task>, PaginateError> {
    paginate_by(
        tasks,
        |task: &Task| filter.accepts(task, viewer),
        query,
        page_index,
        page_size,
    )
}

#[cfg(test)]
#[path = "tests/tasks_tests.rs"]
mod tests;
