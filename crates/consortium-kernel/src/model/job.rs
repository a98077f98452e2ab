use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;
use crate::store::{Object, ObjectKind};

use super::transition::PhaseTransition;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    #[default]
    Pending,
    AwaitingApproval,
    Running,
    Succeeded,
    Failed,
    ApprovalReject,
    Cancelled,
}

impl JobPhase {
    pub const ALL: [JobPhase; 7] = [
        JobPhase::Pending,
        JobPhase::AwaitingApproval,
        JobPhase::Running,
        JobPhase::Succeeded,
        JobPhase::Failed,
        JobPhase::ApprovalReject,
        JobPhase::Cancelled,
    ];

    /// Terminal phases are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::ApprovalReject | Self::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobShape {
    /// Tasks are mutually unordered.
    #[default]
    Independent,
    /// Tasks form a DAG through their dependencies.
    Dependent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleMode {
    /// Tolerates task failures up to the configured fraction.
    BestEffort,
    /// Any task failure fails the job.
    #[default]
    Strict,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovePhase {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Requested lifecycle stage, written by the submission API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    #[default]
    Create,
    Cancel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub domain_id: String,
    #[serde(default)]
    pub role: String,
}

impl Party {
    pub fn new(domain_id: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            role: String::new(),
        }
    }
}

/// One task of a job as declared at submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub task_id: String,
    #[serde(default)]
    pub alias: String,
    /// Upstream task ids; only meaningful for [JobShape::Dependent].
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

impl TaskTemplate {
    pub fn new(task_id: impl Into<String>, parties: &[&str]) -> Self {
        Self {
            task_id: task_id.into(),
            parties: parties.iter().map(|d| Party::new(*d)).collect(),
            ..Self::default()
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub initiator: String,
    #[serde(default)]
    pub shape: JobShape,
    #[serde(default)]
    pub schedule_mode: ScheduleMode,
    /// Upper bound on concurrently active tasks; `None` leaves it to the
    /// runtime default.
    #[serde(default)]
    pub max_parallelism: Option<u32>,
    #[serde(default)]
    pub stage: JobStage,
    pub tasks: Vec<TaskTemplate>,
}

/// Job-level view of one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never executed because an upstream task did not succeed.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub phase: JobPhase,
    /// Per-domain decisions. `None` and a missing key both mean Pending.
    #[serde(default)]
    pub approve_status: Option<BTreeMap<String, ApprovePhase>>,
    #[serde(default)]
    pub task_status: BTreeMap<String, TaskState>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reconcile_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transitions: Vec<PhaseTransition>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub meta: ObjectMeta,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: JobStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn phase(&self) -> JobPhase {
        self.status.phase
    }

    /// Distinct domains named as parties of any task, in lexical order.
    pub fn participant_domains(&self) -> BTreeSet<String> {
        self.spec
            .tasks
            .iter()
            .flat_map(|t| t.parties.iter())
            .map(|p| p.domain_id.clone())
            .filter(|d| !d.is_empty())
            .collect()
    }

    pub fn approval_of(&self, domain_id: &str) -> ApprovePhase {
        self.status
            .approve_status
            .as_ref()
            .and_then(|m| m.get(domain_id).copied())
            .unwrap_or_default()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskTemplate> {
        self.spec.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Moves the job to `to`, recording the transition. Returns `false` (and
    /// records nothing) when the job is already in `to`.
    pub fn transition_to(
        &mut self,
        to: JobPhase,
        reason: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> bool {
        let from = self.status.phase;
        if from == to {
            return false;
        }
        let reason = reason.into();
        self.status.transitions.push(PhaseTransition {
            index: self.status.transitions.len() as u64 + 1,
            from,
            to,
            reason: reason.clone(),
            at,
        });
        self.status.phase = to;
        self.status.reason = reason;
        self.status.message = message.into();
        self.status.last_reconcile_time = Some(at);
        if to.is_terminal() && self.status.completion_time.is_none() {
            self.status.completion_time = Some(at);
        }
        true
    }
}

impl Object for Job {
    const KIND: ObjectKind = ObjectKind::Job;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_party_job() -> Job {
        Job::new(
            "cross-domain",
            "job-1",
            JobSpec {
                initiator: "alice".to_string(),
                tasks: vec![
                    TaskTemplate::new("psi", &["alice", "bob"]),
                    TaskTemplate::new("train", &["bob", "alice"]).with_dependencies(&["psi"]),
                ],
                ..JobSpec::default()
            },
        )
    }

    #[test]
    fn participants_are_distinct_and_sorted() {
        let job = two_party_job();
        let participants: Vec<String> = job.participant_domains().into_iter().collect();
        assert_eq!(participants, vec!["alice", "bob"]);
    }

    #[test]
    fn missing_approval_entries_read_as_pending() {
        let mut job = two_party_job();
        assert_eq!(job.approval_of("alice"), ApprovePhase::Pending);
        job.status.approve_status = Some(BTreeMap::from([(
            "alice".to_string(),
            ApprovePhase::Accepted,
        )]));
        assert_eq!(job.approval_of("alice"), ApprovePhase::Accepted);
        assert_eq!(job.approval_of("bob"), ApprovePhase::Pending);
    }

    #[test]
    fn transition_records_history_once() {
        let mut job = two_party_job();
        let at = Utc::now();
        assert!(job.transition_to(JobPhase::Running, "TasksCreated", "", at));
        assert!(!job.transition_to(JobPhase::Running, "TasksCreated", "", at));
        assert!(job.transition_to(JobPhase::Succeeded, "AllTasksSucceeded", "", at));
        assert_eq!(job.status.transitions.len(), 2);
        assert_eq!(job.status.transitions[1].index, 2);
        assert_eq!(job.status.transitions[1].from, JobPhase::Running);
        assert_eq!(job.status.completion_time, Some(at));
    }
}
