use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{id, data}` payload of every `*.update` pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest<T> {
    pub id: u64,
    pub data: T,
}

/// Non-empty value of an optional text field
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Empty strings leave the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl User {
    pub fn new(id: u64, request: CreateUser) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: request.email,
            name: request.name,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: UserChanges) {
        if let Some(email) = non_empty(changes.email) {
            self.email = email;
        }
        if let Some(name) = non_empty(changes.name) {
            self.name = name;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Center {
    pub id: u64,
    pub name: String,
    pub address: Option<String>,
    pub front_ids: Vec<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCenter {
    pub name: String,
    pub address: Option<String>,
    #[serde(default)]
    pub front_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub front_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontRef {
    pub front_id: u64,
}

impl Center {
    pub fn new(id: u64, request: CreateCenter) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: request.name,
            address: non_empty(request.address),
            front_ids: request.front_ids,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: CenterChanges) {
        if let Some(name) = non_empty(changes.name) {
            self.name = name;
        }
        if let Some(address) = non_empty(changes.address) {
            self.address = Some(address);
        }
        if let Some(front_ids) = changes.front_ids {
            self.front_ids = front_ids;
        }
        self.updated_at = Utc::now();
    }
}

/// A service counter with a queue of waiting tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Front {
    pub id: u64,
    pub name: String,
    pub center_id: Option<u64>,
    /// Tasks currently queued
    pub length: u32,
    /// Estimated seconds to drain the queue
    pub time_to_complete_all_tasks: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFront {
    pub name: String,
    pub center_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthUpdate {
    pub id: u64,
    pub length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionTimeUpdate {
    pub id: u64,
    pub time_to_complete_all_tasks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_id: u64,
    #[serde(default)]
    pub estimated_seconds: u64,
}

impl Front {
    pub fn new(id: u64, request: CreateFront) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: request.name,
            center_id: request.center_id,
            length: 0,
            time_to_complete_all_tasks: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// No front could take the task
    Unscheduled,
    /// Queued on `front_id`
    Scheduled,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub estimated_seconds: u64,
    pub front_id: Option<u64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

impl Task {
    pub fn new(id: u64, request: CreateTask) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: request.title,
            description: non_empty(request.description),
            estimated_seconds: request.estimated_seconds,
            front_id: None,
            status: TaskStatus::Unscheduled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn schedule(&mut self, front_id: u64) {
        self.front_id = Some(front_id);
        self.status = TaskStatus::Scheduled;
        self.updated_at = Utc::now();
    }

    pub fn apply(&mut self, changes: TaskChanges) {
        if let Some(title) = non_empty(changes.title) {
            self.title = title;
        }
        if let Some(description) = non_empty(changes.description) {
            self.description = Some(description);
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_wire_format() {
        let user = User::new(1, serde_json::from_value(json!({"email": "a@b.com"})).unwrap());
        let value = serde_json::to_value(&user).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["email"], "a@b.com");
        assert_eq!(value["name"], "");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_empty_changes_are_ignored() {
        let mut user = User::new(
            1,
            CreateUser {
                email: "a@b.com".into(),
                name: "Ann".into(),
            },
        );
        user.apply(UserChanges {
            email: Some(String::new()),
            name: Some("Anna".into()),
        });

        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name, "Anna");
    }

    #[test]
    fn test_task_status_wire_names() {
        assert_eq!(serde_json::to_value(TaskStatus::Scheduled).unwrap(), json!("scheduled"));
        assert_eq!(serde_json::to_value(TaskStatus::Unscheduled).unwrap(), json!("unscheduled"));

        let changes: TaskChanges = serde_json::from_value(json!({"status": "done"})).unwrap();
        assert_eq!(changes.status, Some(TaskStatus::Done));
    }

    #[test]
    fn test_assignment_payload() {
        let assignment: TaskAssignment = serde_json::from_value(json!({"taskId": 4})).unwrap();
        assert_eq!(assignment.task_id, 4);
        assert_eq!(assignment.estimated_seconds, 0);
    }
}
