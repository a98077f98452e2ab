use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, LABEL_JOB, LABEL_TASK_ID};
use crate::store::{Object, ObjectKind};

use super::job::{Job, Party, TaskState, TaskTemplate};

/// Execution phase of a created task, advanced by the executing engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<TaskPhase> for TaskState {
    fn from(phase: TaskPhase) -> Self {
        match phase {
            TaskPhase::Pending => TaskState::Pending,
            TaskPhase::Running => TaskState::Running,
            TaskPhase::Succeeded => TaskState::Succeeded,
            TaskPhase::Failed => TaskState::Failed,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub job: String,
    pub task_id: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub parties: Vec<Party>,
    #[serde(default)]
    pub app_image: String,
    #[serde(default)]
    pub task_input_config: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub phase: TaskPhase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub meta: ObjectMeta,
    pub spec: TaskSpec,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// Store name of task `task_id` of job `job_name`.
    pub fn object_name(job_name: &str, task_id: &str) -> String {
        format!("{job_name}-{task_id}")
    }

    /// Builds the task object for `template`, owned by `job`.
    pub fn from_template(job: &Job, template: &TaskTemplate) -> Self {
        let mut meta = ObjectMeta::new(
            job.meta.namespace.clone(),
            Self::object_name(&job.meta.name, &template.task_id),
        )
        .with_label(LABEL_JOB, job.meta.name.clone())
        .with_label(LABEL_TASK_ID, template.task_id.clone());
        meta.set_controller_ref(ObjectKind::Job, &job.meta.name);

        Self {
            meta,
            spec: TaskSpec {
                job: job.meta.name.clone(),
                task_id: template.task_id.clone(),
                dependencies: template.dependencies.clone(),
                parties: template.parties.clone(),
                app_image: template.app_image.clone(),
                task_input_config: template.task_input_config.clone(),
                priority: template.priority,
            },
            status: TaskStatus::default(),
        }
    }
}

impl Object for Task {
    const KIND: ObjectKind = ObjectKind::Task;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
