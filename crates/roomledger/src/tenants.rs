//! Tenant CRUD. The national id (`id_card`) is the unique business key;
//! deletion is blocked while the tenant still holds an active rental.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::domain::{Page, PageParams, Tenant, TenantId, TenantStatus};
use crate::error::ServiceError;
use crate::store::Store;

static TENANT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_tenant_id() -> TenantId {
    let id = TENANT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TenantId(format!("tenant-{id:06}"))
}

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub status: Option<TenantStatus>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct AddTenantParams {
    pub name: String,
    pub id_card: String,
    #[serde(default)]
    pub phone: String,
    pub status: Option<TenantStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantParams {
    pub id: TenantId,
    pub name: Option<String>,
    pub id_card: Option<String>,
    pub phone: Option<String>,
    pub status: Option<TenantStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TenantIdParams {
    pub id: TenantId,
}

pub struct TenantService<S> {
    store: Arc<S>,
}

impl<S: Store> TenantService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_tenants(&self, query: TenantQuery) -> Result<Page<Tenant>, ServiceError> {
        let mut tenants = self.store.tenants()?;
        if let Some(status) = query.status {
            tenants.retain(|tenant| tenant.status == status);
        }
        tenants.sort_by(|a, b| b.create_date.cmp(&a.create_date));
        Ok(Page::slice(tenants, query.page))
    }

    pub fn add_tenant(&self, params: AddTenantParams) -> Result<Tenant, ServiceError> {
        if self.store.tenant_by_id_card(&params.id_card)?.is_some() {
            return Err(ServiceError::validation("该身份证号已存在"));
        }

        let tenant = Tenant {
            id: next_tenant_id(),
            name: params.name,
            id_card: params.id_card,
            phone: params.phone,
            status: params.status.unwrap_or(TenantStatus::Active),
            create_date: Utc::now(),
        };

        Ok(self.store.insert_tenant(tenant)?)
    }

    pub fn update_tenant(&self, params: UpdateTenantParams) -> Result<Tenant, ServiceError> {
        let mut tenant = self
            .store
            .tenant(&params.id)?
            .ok_or_else(|| ServiceError::not_found("租户不存在"))?;

        if let Some(id_card) = params.id_card {
            if id_card != tenant.id_card && self.store.tenant_by_id_card(&id_card)?.is_some() {
                return Err(ServiceError::validation("该身份证号已存在"));
            }
            tenant.id_card = id_card;
        }
        if let Some(name) = params.name {
            tenant.name = name;
        }
        if let Some(phone) = params.phone {
            tenant.phone = phone;
        }
        if let Some(status) = params.status {
            tenant.status = status;
        }

        self.store.update_tenant(&tenant)?;
        Ok(tenant)
    }

    pub fn delete_tenant(&self, id: &TenantId) -> Result<(), ServiceError> {
        if self.store.tenant(id)?.is_none() {
            return Err(ServiceError::not_found("租户不存在"));
        }
        if self.store.active_rental_for_tenant(id)?.is_some() {
            return Err(ServiceError::validation(
                "该租户有活跃的租赁关系，无法删除",
            ));
        }
        self.store.remove_tenant(id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (TenantService<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TenantService::new(store.clone()), store)
    }

    #[test]
    fn duplicate_id_card_is_rejected() {
        let (service, _) = service();
        service
            .add_tenant(AddTenantParams {
                name: "张三".to_string(),
                id_card: "410102199001011234".to_string(),
                phone: "13800000000".to_string(),
                status: None,
            })
            .expect("add");

        let err = service
            .add_tenant(AddTenantParams {
                name: "李四".to_string(),
                id_card: "410102199001011234".to_string(),
                phone: "13900000000".to_string(),
                status: None,
            })
            .expect_err("duplicate id card");
        assert!(err.to_string().contains("该身份证号已存在"));
    }

    #[test]
    fn update_checks_id_card_uniqueness() {
        let (service, _) = service();
        service
            .add_tenant(AddTenantParams {
                name: "张三".to_string(),
                id_card: "A".to_string(),
                phone: String::new(),
                status: None,
            })
            .expect("add");
        let second = service
            .add_tenant(AddTenantParams {
                name: "李四".to_string(),
                id_card: "B".to_string(),
                phone: String::new(),
                status: None,
            })
            .expect("add");

        let err = service
            .update_tenant(UpdateTenantParams {
                id: second.id,
                name: None,
                id_card: Some("A".to_string()),
                phone: None,
                status: None,
            })
            .expect_err("conflicting id card");
        assert!(err.to_string().contains("该身份证号已存在"));
    }
}
