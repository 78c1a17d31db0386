use serde::{Deserialize, Serialize};

use crate::{pagination::PaginationMeta, tasks::repo_types::{Task, TaskChanges}};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl From<UpdateTaskRequest> for TaskChanges {
    fn from(req: UpdateTaskRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            completed: req.completed,
        }
    }
}

/// `data` of the list endpoint. Pagination travels inside `data` so a cached
/// copy replays it too.
#[derive(Debug, Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub pagination: PaginationMeta,
}
