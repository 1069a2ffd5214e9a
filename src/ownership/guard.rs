use super::controller::ControllerId;
use crate::state::{StateError, ThreadMetadata, ThreadRegistry};

#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("thread `{thread_id}` not found")]
    NotFound { thread_id: String },
    #[error("thread `{thread_id}` belongs to a different controller")]
    DifferentController { thread_id: String },
    #[error(
        "thread `{thread_id}` has no controller; ownership is only assigned when a thread is created"
    )]
    Unowned { thread_id: String },
    #[error(transparent)]
    State(#[from] StateError),
}

pub fn assert_ownership(
    thread_id: &str,
    record: Option<ThreadMetadata>,
    controller: &ControllerId,
) -> Result<ThreadMetadata, OwnershipError> {
    let Some(record) = record else {
        return Err(OwnershipError::NotFound {
            thread_id: thread_id.to_string(),
        });
    };
    match record.owner() {
        Some(owner) if owner == controller.as_str() => Ok(record),
        Some(_) => Err(OwnershipError::DifferentController {
            thread_id: thread_id.to_string(),
        }),
        None => Err(OwnershipError::Unowned {
            thread_id: thread_id.to_string(),
        }),
    }
}

pub fn load_owned_thread(
    registry: &ThreadRegistry,
    thread_id: &str,
    controller: &ControllerId,
) -> Result<ThreadMetadata, OwnershipError> {
    assert_ownership(thread_id, registry.get(thread_id)?, controller)
}

pub fn owned_threads(
    registry: &ThreadRegistry,
    controller: &ControllerId,
) -> Result<Vec<ThreadMetadata>, StateError> {
    Ok(registry
        .list_threads()?
        .into_iter()
        .filter(|thread| thread.owner() == Some(controller.as_str()))
        .collect())
}
