use std::sync::Arc;
use tracing::info;

use centermesh::{DomainError, PatternRegistry, Result};

use crate::method;
use crate::models::{Center, CenterChanges, CreateCenter, FrontRef, UpdateRequest};
use crate::store::MemoryStore;

pub const SERVICE: &str = "center_service";

centermesh::define_patterns! {
    pub enum CenterPattern {
        Create => "center.create",
        GetAll => "center.getAll",
        Get => "center.get",
        Update => "center.update",
        Delete => "center.delete",
        /// `{frontId}` -> the center that front belongs to
        GetCenterWithFrontId => "center.getCenterWithFrontId",
    }
}

#[derive(Debug)]
pub struct CenterService {
    centers: MemoryStore<Center>,
}

impl Default for CenterService {
    fn default() -> Self {
        Self {
            centers: MemoryStore::new("Center"),
        }
    }
}

impl CenterService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request: CreateCenter) -> std::result::Result<Center, DomainError> {
        if request.name.trim().is_empty() {
            return Err(DomainError::invalid("Center name is required"));
        }
        let center = self.centers.insert_with(|id| Center::new(id, request))?;
        info!("Created center {} ({})", center.id, center.name);
        Ok(center)
    }

    pub fn get_all(&self, _: ()) -> std::result::Result<Vec<Center>, DomainError> {
        Ok(self.centers.all()?)
    }

    pub fn get(&self, id: u64) -> std::result::Result<Center, DomainError> {
        Ok(self.centers.get(id)?)
    }

    pub fn update(&self, request: UpdateRequest<CenterChanges>) -> std::result::Result<Center, DomainError> {
        let center = self.centers.update(request.id, |center| {
            center.apply(request.data);
            Ok(())
        })?;
        info!("Updated center {}", center.id);
        Ok(center)
    }

    pub fn delete(&self, id: u64) -> std::result::Result<bool, DomainError> {
        self.centers.remove(id)?;
        info!("Deleted center {}", id);
        Ok(true)
    }

    pub fn get_with_front(&self, front: FrontRef) -> std::result::Result<Center, DomainError> {
        self.centers
            .find(|center| center.front_ids.contains(&front.front_id))?
            .ok_or_else(|| DomainError::not_found(format!("No center has front {}", front.front_id)))
    }
}

pub fn registry(service: Arc<CenterService>) -> Result<PatternRegistry> {
    PatternRegistry::builder::<CenterPattern>()
        .json(CenterPattern::Create, method(&service, CenterService::create))
        .json(CenterPattern::GetAll, method(&service, CenterService::get_all))
        .json(CenterPattern::Get, method(&service, CenterService::get))
        .json(CenterPattern::Update, method(&service, CenterService::update))
        .json(CenterPattern::Delete, method(&service, CenterService::delete))
        .json(CenterPattern::GetCenterWithFrontId, method(&service, CenterService::get_with_front))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(service: &CenterService, name: &str, front_ids: Vec<u64>) -> Center {
        service
            .create(CreateCenter {
                name: name.into(),
                address: None,
                front_ids,
            })
            .unwrap()
    }

    #[test]
    fn test_crud() {
        let service = CenterService::new();
        let north = center(&service, "north", vec![]);

        assert_eq!(service.get(north.id).unwrap(), north);

        let updated = service
            .update(UpdateRequest {
                id: north.id,
                data: CenterChanges {
                    address: Some("1 Main St".into()),
                    ..Default::default()
                },
            })
            .unwrap();
        assert_eq!(updated.name, "north");
        assert_eq!(updated.address.as_deref(), Some("1 Main St"));

        assert!(service.delete(north.id).unwrap());
        assert!(service.get(north.id).unwrap_err().is(DomainError::NOT_FOUND));
    }

    #[test]
    fn test_blank_name_is_invalid() {
        let service = CenterService::new();
        let err = service
            .create(CreateCenter {
                name: " ".into(),
                address: None,
                front_ids: vec![],
            })
            .unwrap_err();
        assert!(err.is(DomainError::INVALID));
    }

    #[test]
    fn test_center_for_front() {
        let service = CenterService::new();
        center(&service, "north", vec![1, 2]);
        let south = center(&service, "south", vec![3]);

        assert_eq!(service.get_with_front(FrontRef { front_id: 3 }).unwrap(), south);
        assert!(service
            .get_with_front(FrontRef { front_id: 9 })
            .unwrap_err()
            .is(DomainError::NOT_FOUND));
    }

    #[test]
    fn test_registry_builds() {
        let registry = registry(Arc::new(CenterService::new())).unwrap();
        assert!(registry.contains("center.getCenterWithFrontId"));
        assert_eq!(registry.len(), 6);
    }
}
