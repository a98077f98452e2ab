//! Job scheduler.
//!
//! Every call re-derives the plan from the job spec and the task objects that
//! currently exist; nothing about earlier decisions is remembered. Running the
//! scheduler again on the same inputs yields the same plan, so a restarted
//! reconciler resumes exactly where the stored task statuses say it is.

use std::collections::{BTreeMap, BTreeSet};

use consortium_kernel::{
    validate_name, Job, JobPhase, JobShape, KernelError, ScheduleMode, Task, TaskState,
    TaskTemplate,
};

use crate::config::SchedulerConfig;

/// Result of one scheduling pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleOutcome {
    /// Task ids to create now, in lexical order.
    pub to_create: Vec<String>,
    /// Job-level view of every task that exists, is about to be created, or was
    /// skipped. Tasks still waiting on upstream work are absent.
    pub task_status: BTreeMap<String, TaskState>,
    /// Aggregate phase: Running, Succeeded or Failed.
    pub phase: JobPhase,
    pub reason: String,
    pub message: String,
}

/// Orders tasks so every task follows its dependencies, breaking ties by task
/// id. Returns the ids caught in a cycle as the error.
pub fn topological_order(tasks: &[TaskTemplate]) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut downstream: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for task in tasks {
        indegree.entry(task.task_id.as_str()).or_insert(0);
    }
    for task in tasks {
        for dep in &task.dependencies {
            if !indegree.contains_key(dep.as_str()) {
                continue;
            }
            *indegree.entry(task.task_id.as_str()).or_insert(0) += 1;
            downstream
                .entry(dep.as_str())
                .or_default()
                .push(task.task_id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(indegree.len());
    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for next in downstream.get(id).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(next) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(next);
                }
            }
        }
    }

    if order.len() == indegree.len() {
        Ok(order)
    } else {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        Err(indegree
            .keys()
            .filter(|id| !placed.contains(*id))
            .map(|id| id.to_string())
            .collect())
    }
}

/// Structural checks run once before the first dispatch.
pub fn validate_job_spec(job: &Job) -> Result<(), KernelError> {
    let spec = &job.spec;
    if spec.tasks.is_empty() {
        return Err(KernelError::validation("job must contain at least one task"));
    }
    if spec.max_parallelism == Some(0) {
        return Err(KernelError::validation("max_parallelism must be at least 1"));
    }

    let mut seen = BTreeSet::new();
    for task in &spec.tasks {
        validate_name(&task.task_id, "task_id")?;
        if !seen.insert(task.task_id.as_str()) {
            return Err(KernelError::validation(format!(
                "duplicate task id {}",
                task.task_id
            )));
        }
        if task.parties.is_empty() || task.parties.iter().any(|p| p.domain_id.is_empty()) {
            return Err(KernelError::validation(format!(
                "task {} must name at least one party and no empty domain",
                task.task_id
            )));
        }
    }

    for task in &spec.tasks {
        if spec.shape == JobShape::Independent && !task.dependencies.is_empty() {
            return Err(KernelError::validation(format!(
                "task {} declares dependencies in an independent job",
                task.task_id
            )));
        }
        for dep in &task.dependencies {
            if dep == &task.task_id {
                return Err(KernelError::validation(format!(
                    "task {} depends on itself",
                    task.task_id
                )));
            }
            if !seen.contains(dep.as_str()) {
                return Err(KernelError::validation(format!(
                    "task {} depends on unknown task {dep}",
                    task.task_id
                )));
            }
        }
    }

    topological_order(&spec.tasks).map_err(|cyclic| {
        KernelError::validation(format!(
            "task dependencies form a cycle through {}",
            cyclic.join(", ")
        ))
    })?;
    Ok(())
}

pub struct JobScheduler {
    config: SchedulerConfig,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Plans the next step of `job` given the task objects that exist for it.
    /// Tasks belonging to other jobs or unknown task ids are ignored.
    pub fn schedule(&self, job: &Job, tasks: &[Task]) -> ScheduleOutcome {
        let observed: BTreeMap<&str, TaskState> = tasks
            .iter()
            .filter(|t| t.spec.job == job.meta.name && job.task(&t.spec.task_id).is_some())
            .map(|t| (t.spec.task_id.as_str(), TaskState::from(t.status.phase)))
            .collect();

        let mut task_status: BTreeMap<String, TaskState> = BTreeMap::new();
        let mut eligible: Vec<String> = Vec::new();

        match job.spec.shape {
            JobShape::Independent => {
                for template in &job.spec.tasks {
                    match observed.get(template.task_id.as_str()) {
                        Some(state) => {
                            task_status.insert(template.task_id.clone(), *state);
                        }
                        None => eligible.push(template.task_id.clone()),
                    }
                }
            }
            JobShape::Dependent => {
                // A cyclic spec never gets here; validation fails it first.
                let order = topological_order(&job.spec.tasks).unwrap_or_default();
                for task_id in order {
                    if let Some(state) = observed.get(task_id.as_str()) {
                        task_status.insert(task_id, *state);
                        continue;
                    }
                    let Some(template) = job.task(&task_id) else {
                        continue;
                    };
                    let upstream: Vec<Option<TaskState>> = template
                        .dependencies
                        .iter()
                        .map(|dep| task_status.get(dep).copied())
                        .collect();
                    let blocked = upstream
                        .iter()
                        .any(|s| matches!(s, Some(TaskState::Failed | TaskState::Skipped)));
                    if blocked {
                        task_status.insert(task_id, TaskState::Skipped);
                    } else if upstream.iter().all(|s| *s == Some(TaskState::Succeeded)) {
                        eligible.push(task_id);
                    }
                }
            }
        }

        eligible.sort();
        let limit = job
            .spec
            .max_parallelism
            .or(self.config.default_max_parallelism);
        if let Some(limit) = limit {
            let active = task_status
                .values()
                .filter(|s| matches!(s, TaskState::Pending | TaskState::Running))
                .count();
            eligible.truncate((limit as usize).saturating_sub(active));
        }
        for task_id in &eligible {
            task_status.insert(task_id.clone(), TaskState::Pending);
        }

        let (phase, reason, message) = self.aggregate(job, &task_status);
        if phase.is_terminal() {
            for task_id in eligible.drain(..) {
                task_status.remove(&task_id);
            }
        }

        ScheduleOutcome {
            to_create: eligible,
            task_status,
            phase,
            reason,
            message,
        }
    }

    fn aggregate(
        &self,
        job: &Job,
        task_status: &BTreeMap<String, TaskState>,
    ) -> (JobPhase, String, String) {
        let total = job.spec.tasks.len();
        let ids_in = |wanted: TaskState| -> Vec<&str> {
            task_status
                .iter()
                .filter(|(_, s)| **s == wanted)
                .map(|(id, _)| id.as_str())
                .collect()
        };
        let failed = ids_in(TaskState::Failed);
        let skipped = ids_in(TaskState::Skipped);
        let bad = failed.len() + skipped.len();

        match (job.spec.schedule_mode, job.spec.shape) {
            (ScheduleMode::Strict, _) if !failed.is_empty() => {
                return (
                    JobPhase::Failed,
                    "TaskFailed".to_string(),
                    format!("task {} failed", failed.join(", ")),
                );
            }
            // Any loss in a DAG leaves a Skipped or Failed node behind, so the
            // job can no longer finish with every task Succeeded.
            (ScheduleMode::BestEffort, JobShape::Dependent) if bad > 0 => {
                return (
                    JobPhase::Failed,
                    "SuccessUnreachable".to_string(),
                    format!(
                        "task {} failed, {} skipped",
                        failed.join(", "),
                        skipped.len()
                    ),
                );
            }
            (ScheduleMode::BestEffort, JobShape::Independent)
                if total > 0 && bad as f64 / total as f64 > self.config.failure_tolerance =>
            {
                return (
                    JobPhase::Failed,
                    "FailureToleranceExceeded".to_string(),
                    format!(
                        "{bad} of {total} tasks did not succeed, tolerance is {}",
                        self.config.failure_tolerance
                    ),
                );
            }
            _ => {}
        }

        let all_terminal =
            task_status.len() == total && task_status.values().all(TaskState::is_terminal);
        if all_terminal {
            if bad == 0 {
                return (JobPhase::Succeeded, "TasksFinished".to_string(), String::new());
            }
            return (
                JobPhase::Failed,
                "TasksNotSucceeded".to_string(),
                format!("{bad} of {total} tasks did not succeed"),
            );
        }
        (JobPhase::Running, "TasksRunning".to_string(), String::new())
    }
}
