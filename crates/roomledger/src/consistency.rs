//! Room–rental consistency engine.
//!
//! Rooms cache a pointer to their active rental (`current_rental_id`).
//! The store offers no transactions, so the pointer can drift from the
//! rental records: dangling ids, links to completed/terminated rentals,
//! rented rooms with no link at all, active rentals whose room forgot
//! them. This module detects and corrects that drift three ways:
//!
//! * [`ConsistencyEngine::resolve_on_read`] — reactive repair while
//!   listing rooms; read paths may mutate the store.
//! * [`ConsistencyEngine::audit`] — pure diagnostic pass
//!   (`debugDatabase`).
//! * [`ConsistencyEngine::fix_inconsistencies`] — idempotent batch
//!   repair (`fixDataInconsistencies`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Rental, RentalId, RentalStatus, Room, RoomId, RoomStatus, Tenant, TenantId};
use crate::error::ServiceError;
use crate::store::Store;

pub struct ConsistencyEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for ConsistencyEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// Room as returned by the listing path, with the current rental and
/// tenant attached when the back-reference is healthy.
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_rental: Option<Rental>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tenant: Option<Tenant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Room is rented but carries no rental pointer.
    MissingRentalId,
    /// Room points at a rental id that does not exist.
    InvalidRentalId,
    /// Room points at a rental that is no longer active.
    InactiveRental,
}

#[derive(Debug, Clone, Serialize)]
pub struct Inconsistency {
    #[serde(rename = "type")]
    pub kind: InconsistencyKind,
    pub room_id: RoomId,
    pub room_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_id: Option<RentalId>,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionTotals {
    pub rooms: usize,
    pub tenants: usize,
    pub rentals: usize,
    pub utility_records: usize,
    pub maintenance_records: usize,
    pub users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub debug_info: CollectionTotals,
    pub inconsistencies: Vec<Inconsistency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    MissingRentalId,
    InvalidRentalId,
    InactiveRental,
    MissingTenant,
    /// Active rental whose room no longer exists.
    OrphanedRental,
    /// Active rental losing the tie-break against the room's existing
    /// link.
    DuplicateRental,
    /// Room back-reference repaired to point at its active rental.
    MissingBackReference,
}

#[derive(Debug, Clone, Serialize)]
pub struct Fix {
    #[serde(rename = "type")]
    pub kind: FixKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_id: Option<RentalId>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub fixes_applied: usize,
    pub fixes: Vec<Fix>,
}

impl<S: Store> ConsistencyEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolves a room's rental pointer while it is being read, applying
    /// at most one corrective room write. Healthy links come back with
    /// the rental and tenant attached; broken ones are repaired in place
    /// and the room falls back to `available`.
    pub fn resolve_on_read(&self, mut room: Room) -> Result<RoomView, ServiceError> {
        let Some(rental_id) = room.current_rental_id.clone() else {
            // Drift: a rented room must carry a rental pointer.
            if room.status == RoomStatus::Rented {
                self.reset_room(&mut room)?;
            }
            return Ok(RoomView {
                room,
                current_rental: None,
                current_tenant: None,
            });
        };

        let Some(rental) = self.store.rental(&rental_id)? else {
            self.reset_room(&mut room)?;
            return Ok(RoomView {
                room,
                current_rental: None,
                current_tenant: None,
            });
        };

        if rental.status != RentalStatus::Active {
            self.reset_room(&mut room)?;
            return Ok(RoomView {
                room,
                current_rental: None,
                current_tenant: None,
            });
        }

        match self.store.tenant(&rental.tenant_id)? {
            Some(tenant) => Ok(RoomView {
                room,
                current_rental: Some(rental),
                current_tenant: Some(tenant),
            }),
            None => {
                let mut rental = rental;
                self.terminate_rental(&mut rental, "tenant missing")?;
                self.reset_room(&mut room)?;
                Ok(RoomView {
                    room,
                    current_rental: None,
                    current_tenant: None,
                })
            }
        }
    }

    /// Pure diagnostic pass: classifies every rented room without
    /// touching the store.
    pub fn audit(&self) -> Result<AuditReport, ServiceError> {
        let rooms = self.store.rooms()?;
        let rentals = self.store.rentals()?;
        let debug_info = CollectionTotals {
            rooms: rooms.len(),
            tenants: self.store.tenants()?.len(),
            rentals: rentals.len(),
            utility_records: self.store.utility_records()?.len(),
            maintenance_records: self.store.maintenance_records()?.len(),
            users: self.store.users()?.len(),
        };

        let rental_by_id: HashMap<&RentalId, &Rental> =
            rentals.iter().map(|rental| (&rental.id, rental)).collect();

        let mut inconsistencies = Vec::new();
        for room in rooms.iter().filter(|room| room.status == RoomStatus::Rented) {
            match &room.current_rental_id {
                None => inconsistencies.push(Inconsistency {
                    kind: InconsistencyKind::MissingRentalId,
                    room_id: room.id.clone(),
                    room_number: room.room_number.clone(),
                    rental_id: None,
                    issue: "房间标记为已租但没有租赁ID".to_string(),
                }),
                Some(rental_id) => match rental_by_id.get(rental_id) {
                    None => inconsistencies.push(Inconsistency {
                        kind: InconsistencyKind::InvalidRentalId,
                        room_id: room.id.clone(),
                        room_number: room.room_number.clone(),
                        rental_id: Some(rental_id.clone()),
                        issue: "房间指向不存在的租赁记录".to_string(),
                    }),
                    Some(rental) if rental.status != RentalStatus::Active => {
                        inconsistencies.push(Inconsistency {
                            kind: InconsistencyKind::InactiveRental,
                            room_id: room.id.clone(),
                            room_number: room.room_number.clone(),
                            rental_id: Some(rental_id.clone()),
                            issue: "房间指向非活跃的租赁记录".to_string(),
                        })
                    }
                    Some(_) => {}
                },
            }
        }

        Ok(AuditReport {
            debug_info,
            inconsistencies,
        })
    }

    /// Batch repair. Applies the audit corrections, terminates orphaned
    /// and duplicate active rentals, and restores missing
    /// back-references. Idempotent: a second consecutive run reports
    /// zero fixes. A failing write is logged and skipped so the batch
    /// always makes forward progress.
    pub fn fix_inconsistencies(&self) -> Result<RepairReport, ServiceError> {
        let mut rooms: HashMap<RoomId, Room> = self
            .store
            .rooms()?
            .into_iter()
            .map(|room| (room.id.clone(), room))
            .collect();
        let mut rentals: HashMap<RentalId, Rental> = self
            .store
            .rentals()?
            .into_iter()
            .map(|rental| (rental.id.clone(), rental))
            .collect();
        let tenant_ids: HashSet<TenantId> = self
            .store
            .tenants()?
            .into_iter()
            .map(|tenant| tenant.id)
            .collect();

        let mut fixes = Vec::new();

        // Pass 1: rented rooms with a broken or missing pointer.
        let mut room_ids: Vec<RoomId> = rooms.keys().cloned().collect();
        room_ids.sort_by(|a, b| a.0.cmp(&b.0));
        for room_id in &room_ids {
            let room = rooms.get(room_id).cloned();
            let Some(room) = room else { continue };
            if room.status != RoomStatus::Rented {
                continue;
            }

            let fix = match &room.current_rental_id {
                None => Some((FixKind::MissingRentalId, None, "房间重置为可租".to_string())),
                Some(rental_id) => match rentals.get(rental_id).cloned() {
                    None => Some((
                        FixKind::InvalidRentalId,
                        Some(rental_id.clone()),
                        "清除无效租赁ID并重置为可租".to_string(),
                    )),
                    Some(rental) if rental.status != RentalStatus::Active => Some((
                        FixKind::InactiveRental,
                        Some(rental_id.clone()),
                        "清除非活跃租赁ID并重置为可租".to_string(),
                    )),
                    Some(rental) if !tenant_ids.contains(&rental.tenant_id) => {
                        let mut rental = rental;
                        if let Err(err) = self.terminate_rental(&mut rental, "tenant missing") {
                            warn!(rental_id = %rental.id, error = %err, "skipping rental termination");
                            continue;
                        }
                        rentals.insert(rental.id.clone(), rental);
                        Some((
                            FixKind::MissingTenant,
                            Some(rental_id.clone()),
                            "终止租户缺失的租赁并重置房间为可租".to_string(),
                        ))
                    }
                    Some(_) => None,
                },
            };

            if let Some((kind, rental_id, action)) = fix {
                let mut updated = room.clone();
                if let Err(err) = self.reset_room(&mut updated) {
                    warn!(room_number = %room.room_number, error = %err, "skipping room repair");
                    continue;
                }
                fixes.push(Fix {
                    kind,
                    room_number: Some(room.room_number.clone()),
                    rental_id,
                    action,
                });
                rooms.insert(updated.id.clone(), updated);
            }
        }

        // Pass 2: active rentals the rooms no longer acknowledge.
        let mut rental_ids: Vec<RentalId> = rentals.keys().cloned().collect();
        rental_ids.sort_by(|a, b| a.0.cmp(&b.0));
        for rental_id in &rental_ids {
            let rental = rentals.get(rental_id).cloned();
            let Some(rental) = rental else { continue };
            if rental.status != RentalStatus::Active {
                continue;
            }

            match rooms.get(&rental.room_id).cloned() {
                None => {
                    let mut rental = rental;
                    if let Err(err) = self.terminate_rental(&mut rental, "room missing") {
                        warn!(rental_id = %rental.id, error = %err, "skipping orphan termination");
                        continue;
                    }
                    fixes.push(Fix {
                        kind: FixKind::OrphanedRental,
                        room_number: None,
                        rental_id: Some(rental.id.clone()),
                        action: "终止房间已不存在的租赁".to_string(),
                    });
                    rentals.insert(rental.id.clone(), rental);
                }
                Some(room) if room.current_rental_id.as_ref() == Some(&rental.id) => {}
                Some(mut room) => {
                    // Tie-break: a room that already points at a
                    // different rental and is rented stays authoritative;
                    // the rental under inspection is the duplicate.
                    if room.current_rental_id.is_some() && room.status == RoomStatus::Rented {
                        let mut rental = rental;
                        if let Err(err) = self.terminate_rental(&mut rental, "duplicate rental") {
                            warn!(rental_id = %rental.id, error = %err, "skipping duplicate termination");
                            continue;
                        }
                        fixes.push(Fix {
                            kind: FixKind::DuplicateRental,
                            room_number: Some(room.room_number.clone()),
                            rental_id: Some(rental.id.clone()),
                            action: "终止重复的租赁记录".to_string(),
                        });
                        rentals.insert(rental.id.clone(), rental);
                    } else {
                        room.current_rental_id = Some(rental.id.clone());
                        room.status = RoomStatus::Rented;
                        room.update_date = Utc::now();
                        if let Err(err) = self.store.update_room(&room) {
                            warn!(room_number = %room.room_number, error = %err, "skipping back-reference repair");
                            continue;
                        }
                        fixes.push(Fix {
                            kind: FixKind::MissingBackReference,
                            room_number: Some(room.room_number.clone()),
                            rental_id: Some(rental.id.clone()),
                            action: "修复房间指向其活跃租赁".to_string(),
                        });
                        rooms.insert(room.id.clone(), room);
                    }
                }
            }
        }

        if !fixes.is_empty() {
            info!(fixes_applied = fixes.len(), "repaired room-rental drift");
        }

        Ok(RepairReport {
            fixes_applied: fixes.len(),
            fixes,
        })
    }

    fn reset_room(&self, room: &mut Room) -> Result<(), ServiceError> {
        room.status = RoomStatus::Available;
        room.current_rental_id = None;
        room.update_date = Utc::now();
        self.store.update_room(room)?;
        Ok(())
    }

    fn terminate_rental(&self, rental: &mut Rental, reason: &str) -> Result<(), ServiceError> {
        rental.status = RentalStatus::Terminated;
        rental.termination_reason = Some(reason.to_string());
        rental.termination_date = Some(Utc::now());
        rental.update_date = Utc::now();
        self.store.update_rental(rental)?;
        Ok(())
    }
}
