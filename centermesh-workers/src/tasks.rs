//! Tasks are scheduled onto fronts by asking the front worker, over RPC, to
//! queue them on its shortest queue.

use std::sync::Arc;
use tracing::{info, warn};

use centermesh::{DomainError, Pattern, PatternRegistry, Result, RpcClient, RpcError};

use crate::fronts::{self, FrontPattern};
use crate::models::{CreateTask, Front, Task, TaskAssignment, TaskChanges, TaskStatus, UpdateRequest};
use crate::store::MemoryStore;
use crate::{async_method, method};

pub const SERVICE: &str = "task_service";

centermesh::define_patterns! {
    pub enum TaskPattern {
        Create => "task.create",
        CreateTask => "task.createTask",
        GetAll => "task.getAll",
        Get => "task.get",
        Update => "task.update",
        Delete => "task.delete",
    }
}

#[derive(Debug)]
pub struct TaskService {
    tasks: MemoryStore<Task>,
    fronts: RpcClient,
}

fn internal(err: serde_json::Error) -> DomainError {
    DomainError::new("Internal", err.to_string())
}

impl TaskService {
    /// `fronts` is the client used to reach the front worker
    pub fn new(fronts: RpcClient) -> Self {
        Self {
            tasks: MemoryStore::new("Task"),
            fronts,
        }
    }

    /// Store the task, then queue it on the best front.
    ///
    /// With no front available the task is kept as `unscheduled`; any other
    /// failure removes it again.
    pub async fn create(self: Arc<Self>, request: CreateTask) -> std::result::Result<Task, DomainError> {
        if request.title.trim().is_empty() {
            return Err(DomainError::invalid("Task title is required"));
        }

        let task = self.tasks.insert_with(|id| Task::new(id, request))?;
        let assignment = TaskAssignment {
            task_id: task.id,
            estimated_seconds: task.estimated_seconds,
        };
        let payload = serde_json::to_value(&assignment).map_err(internal)?;

        let result = self
            .fronts
            .call_default(fronts::SERVICE, FrontPattern::AddBestTaskToFront.as_str(), payload)
            .await;

        match result {
            Ok(front) => {
                let front: Front = serde_json::from_value(front).map_err(internal)?;
                let task = self.tasks.update(task.id, |task| {
                    task.schedule(front.id);
                    Ok(())
                })?;
                info!("Task {} scheduled on front {}", task.id, front.id);
                Ok(task)
            }
            Err(RpcError::Domain(err)) if err.is(DomainError::NOT_FOUND) => {
                info!("Task {} left unscheduled: {}", task.id, err.message);
                Ok(task)
            }
            Err(err) => {
                warn!("Could not schedule task {}: {}", task.id, err);
                if let Err(rollback) = self.tasks.remove(task.id) {
                    warn!("Task {} could not be rolled back: {}", task.id, rollback);
                }
                Err(match err {
                    RpcError::Domain(err) => err,
                    other => DomainError::unavailable(format!("Front service unavailable: {}", other)),
                })
            }
        }
    }

    pub fn get_all(&self, _: ()) -> std::result::Result<Vec<Task>, DomainError> {
        Ok(self.tasks.all()?)
    }

    pub fn get(&self, id: u64) -> std::result::Result<Task, DomainError> {
        Ok(self.tasks.get(id)?)
    }

    pub fn update(&self, request: UpdateRequest<TaskChanges>) -> std::result::Result<Task, DomainError> {
        let task = self.tasks.update(request.id, |task| {
            task.apply(request.data);
            Ok(())
        })?;
        info!("Updated task {}", task.id);
        Ok(task)
    }

    /// Remove the task and release its slot on the front it was queued on
    pub async fn delete(self: Arc<Self>, id: u64) -> std::result::Result<bool, DomainError> {
        let task = self.tasks.remove(id)?;
        info!("Deleted task {}", id);

        if let (TaskStatus::Scheduled, Some(front_id)) = (task.status, task.front_id) {
            let released = self
                .fronts
                .call_default(
                    fronts::SERVICE,
                    FrontPattern::DeleteFrontTaskLength.as_str(),
                    serde_json::Value::from(front_id),
                )
                .await;
            if let Err(err) = released {
                warn!("Task {} deleted but front {} was not updated: {}", id, front_id, err);
            }
        }
        Ok(true)
    }
}

pub fn registry(service: Arc<TaskService>) -> Result<PatternRegistry> {
    PatternRegistry::builder::<TaskPattern>()
        .json(TaskPattern::Create, async_method(&service, TaskService::create))
        .json(TaskPattern::CreateTask, async_method(&service, TaskService::create))
        .json(TaskPattern::GetAll, method(&service, TaskService::get_all))
        .json(TaskPattern::Get, method(&service, TaskService::get))
        .json(TaskPattern::Update, method(&service, TaskService::update))
        .json(TaskPattern::Delete, async_method(&service, TaskService::delete))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fronts::FrontService;
    use crate::models::CreateFront;
    use centermesh::channel::default_channels;
    use centermesh::{ChannelRegistry, MemoryBroker, RpcSettings, Worker, WorkerConfig};

    struct Harness {
        broker: Arc<MemoryBroker>,
        fronts: Arc<FrontService>,
        tasks: Arc<TaskService>,
    }

    async fn harness() -> Harness {
        let broker = Arc::new(MemoryBroker::new());
        let channels = Arc::new(ChannelRegistry::new(default_channels()).unwrap());

        let fronts = Arc::new(FrontService::new());
        let worker = Worker::new(
            fronts::SERVICE,
            &channels,
            broker.clone(),
            fronts::registry(fronts.clone()).unwrap(),
            WorkerConfig::default(),
        )
        .unwrap();
        worker.listen().await.unwrap();

        let client = RpcClient::start(SERVICE, broker.clone(), channels, &RpcSettings::default())
            .await
            .unwrap();
        Harness {
            broker,
            fronts,
            tasks: Arc::new(TaskService::new(client)),
        }
    }

    fn request(title: &str) -> CreateTask {
        CreateTask {
            title: title.into(),
            description: None,
            estimated_seconds: 300,
        }
    }

    #[tokio::test]
    async fn test_task_is_scheduled_on_shortest_front() {
        let h = harness().await;
        for name in ["a", "b"] {
            h.fronts
                .create(CreateFront {
                    name: name.into(),
                    center_id: None,
                })
                .unwrap();
        }

        let first = h.tasks.clone().create(request("first")).await.unwrap();
        let second = h.tasks.clone().create(request("second")).await.unwrap();

        assert_eq!(first.status, TaskStatus::Scheduled);
        assert_eq!((first.front_id, second.front_id), (Some(1), Some(2)));
        assert_eq!(h.fronts.get(1).unwrap().time_to_complete_all_tasks, 300);
        assert_eq!(h.tasks.get(first.id).unwrap(), first);
    }

    #[tokio::test]
    async fn test_task_without_fronts_stays_unscheduled() {
        let h = harness().await;
        let task = h.tasks.clone().create(request("lonely")).await.unwrap();

        assert_eq!(task.status, TaskStatus::Unscheduled);
        assert_eq!(task.front_id, None);
        assert_eq!(h.tasks.get_all(()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_releases_front_slot() {
        let h = harness().await;
        h.fronts
            .create(CreateFront {
                name: "a".into(),
                center_id: None,
            })
            .unwrap();
        let task = h.tasks.clone().create(request("done soon")).await.unwrap();
        assert_eq!(h.fronts.get(1).unwrap().length, 1);

        assert!(h.tasks.clone().delete(task.id).await.unwrap());
        assert_eq!(h.fronts.get(1).unwrap().length, 0);
        assert!(h.tasks.get(task.id).unwrap_err().is(DomainError::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_broker_down_rolls_back_task() {
        let h = harness().await;
        h.broker.set_online(false);

        let err = h.tasks.clone().create(request("stuck")).await.unwrap_err();
        assert!(err.is(DomainError::UNAVAILABLE));
        assert!(h.tasks.get_all(()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_status() {
        let h = harness().await;
        let task = h.tasks.clone().create(request("t")).await.unwrap();

        let updated = h
            .tasks
            .update(UpdateRequest {
                id: task.id,
                data: TaskChanges {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            })
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, "t");
    }

    #[tokio::test]
    async fn test_blank_title_is_invalid() {
        let h = harness().await;
        let err = h.tasks.clone().create(request("")).await.unwrap_err();
        assert!(err.is(DomainError::INVALID));
    }

    #[tokio::test]
    async fn test_registry_builds() {
        let h = harness().await;
        let registry = registry(h.tasks.clone()).unwrap();
        assert!(registry.contains("task.create"));
        assert!(registry.contains("task.createTask"));
    }
}
