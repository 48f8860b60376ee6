//! Fronts are the counters of a center. Each keeps a queue length and the
//! estimated time to drain it; new tasks go to the shortest queue.

use std::sync::Arc;
use tracing::{debug, info};

use centermesh::{DomainError, PatternRegistry, Result};

use crate::method;
use crate::models::{CompletionTimeUpdate, CreateFront, Front, LengthUpdate, TaskAssignment};
use crate::store::{MemoryStore, StoreError, StoreResult};

pub const SERVICE: &str = "front_service";

centermesh::define_patterns! {
    pub enum FrontPattern {
        Create => "front.create",
        GetAll => "front.getAll",
        Get => "front.get",
        Delete => "front.delete",
        UpdateLength => "front.updateLength",
        AddTaskLength => "front.addTaskLength",
        DeleteFrontTaskLength => "front.deleteFrontTaskLength",
        GetFrontForTask => "front.getFrontForTask",
        AddBestTaskToFront => "front.addBestTaskToFront",
        UpdateTimeToCompleteAllTasks => "front.updateTimeToCompleteAllTasks",
    }
}

#[derive(Debug)]
pub struct FrontService {
    fronts: MemoryStore<Front>,
}

impl Default for FrontService {
    fn default() -> Self {
        Self {
            fronts: MemoryStore::new("Front"),
        }
    }
}

/// Shortest queue first, lowest id on ties
fn shortest<'a>(fronts: impl Iterator<Item = &'a Front>) -> Option<&'a Front> {
    fronts.min_by_key(|front| (front.length, front.id))
}

fn no_front() -> DomainError {
    DomainError::not_found("No front available")
}

impl FrontService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request: CreateFront) -> std::result::Result<Front, DomainError> {
        if request.name.trim().is_empty() {
            return Err(DomainError::invalid("Front name is required"));
        }
        let front = self.fronts.insert_with(|id| Front::new(id, request))?;
        info!("Created front {} ({})", front.id, front.name);
        Ok(front)
    }

    pub fn get_all(&self, _: ()) -> std::result::Result<Vec<Front>, DomainError> {
        Ok(self.fronts.all()?)
    }

    pub fn get(&self, id: u64) -> std::result::Result<Front, DomainError> {
        Ok(self.fronts.get(id)?)
    }

    pub fn delete(&self, id: u64) -> std::result::Result<bool, DomainError> {
        self.fronts.remove(id)?;
        info!("Deleted front {}", id);
        Ok(true)
    }

    pub fn update_length(&self, request: LengthUpdate) -> std::result::Result<Front, DomainError> {
        Ok(self.fronts.update(request.id, |front| {
            front.length = request.length;
            front.touch();
            Ok(())
        })?)
    }

    pub fn add_task_length(&self, id: u64) -> std::result::Result<Front, DomainError> {
        Ok(self.fronts.update(id, |front| {
            front.length += 1;
            front.touch();
            Ok(())
        })?)
    }

    /// One task left the queue
    pub fn delete_task_length(&self, id: u64) -> std::result::Result<Front, DomainError> {
        Ok(self.fronts.update(id, |front| {
            if front.length == 0 {
                return Err(StoreError::Invalid(format!("Front {} has no queued tasks", id)));
            }
            front.length -= 1;
            front.touch();
            Ok(())
        })?)
    }

    pub fn front_for_task(&self, _: ()) -> std::result::Result<Front, DomainError> {
        let fronts = self.fronts.all()?;
        shortest(fronts.iter()).cloned().ok_or_else(no_front)
    }

    /// Queue a task on the shortest front; the pick and the enqueue are atomic
    pub fn add_best_task(&self, assignment: TaskAssignment) -> std::result::Result<Front, DomainError> {
        let picked = self.fronts.transaction(|rows, _| -> StoreResult<Option<Front>> {
            let Some(id) = shortest(rows.values()).map(|front| front.id) else {
                return Ok(None);
            };
            Ok(rows.get_mut(&id).map(|front| {
                front.length += 1;
                front.time_to_complete_all_tasks += assignment.estimated_seconds;
                front.touch();
                front.clone()
            }))
        })?;

        let front = picked.ok_or_else(no_front)?;
        debug!("Task {} queued on front {} (length {})", assignment.task_id, front.id, front.length);
        Ok(front)
    }

    pub fn update_completion_time(&self, request: CompletionTimeUpdate) -> std::result::Result<Front, DomainError> {
        Ok(self.fronts.update(request.id, |front| {
            front.time_to_complete_all_tasks = request.time_to_complete_all_tasks;
            front.touch();
            Ok(())
        })?)
    }
}

pub fn registry(service: Arc<FrontService>) -> Result<PatternRegistry> {
    PatternRegistry::builder::<FrontPattern>()
        .json(FrontPattern::Create, method(&service, FrontService::create))
        .json(FrontPattern::GetAll, method(&service, FrontService::get_all))
        .json(FrontPattern::Get, method(&service, FrontService::get))
        .json(FrontPattern::Delete, method(&service, FrontService::delete))
        .json(FrontPattern::UpdateLength, method(&service, FrontService::update_length))
        .json(FrontPattern::AddTaskLength, method(&service, FrontService::add_task_length))
        .json(FrontPattern::DeleteFrontTaskLength, method(&service, FrontService::delete_task_length))
        .json(FrontPattern::GetFrontForTask, method(&service, FrontService::front_for_task))
        .json(FrontPattern::AddBestTaskToFront, method(&service, FrontService::add_best_task))
        .json(
            FrontPattern::UpdateTimeToCompleteAllTasks,
            method(&service, FrontService::update_completion_time),
        )
        .build()
}
