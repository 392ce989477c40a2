use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    Application, ApplicationId, AuditLogEntry, Lease, LeaseId, LeaseOffer, LeaseOfferId,
    Organization, OrganizationId, Property, PropertyId, Prospect, ProspectId, Screening,
    ScreeningId, SecurityDeposit, SecurityDepositId, Tenant, TenantId,
};

/// A persisted record with an optimistic-concurrency version.
///
/// Version `0` marks a record that has never been committed. The store bumps the
/// version on every successful write and rejects writes whose version is stale.
pub trait Entity: Clone + fmt::Debug + Send + 'static {
    type Id: Clone + Ord + fmt::Display + fmt::Debug + Send;

    const NAME: &'static str;

    fn id(&self) -> &Self::Id;
    fn organization_id(&self) -> &OrganizationId;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);

    fn table(tables: &Tables) -> &BTreeMap<Self::Id, Self>;
    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Id, Self>;
}

/// Every entity table plus the append-only audit log.
///
/// Used both as the committed dataset and as a unit of work's staging area.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub organizations: BTreeMap<OrganizationId, Organization>,
    pub prospects: BTreeMap<ProspectId, Prospect>,
    pub properties: BTreeMap<PropertyId, Property>,
    pub applications: BTreeMap<ApplicationId, Application>,
    pub screenings: BTreeMap<ScreeningId, Screening>,
    pub lease_offers: BTreeMap<LeaseOfferId, LeaseOffer>,
    pub leases: BTreeMap<LeaseId, Lease>,
    pub tenants: BTreeMap<TenantId, Tenant>,
    pub deposits: BTreeMap<SecurityDepositId, SecurityDeposit>,
    pub audit_log: Vec<AuditLogEntry>,
}

impl Tables {
    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty()
            && self.prospects.is_empty()
            && self.properties.is_empty()
            && self.applications.is_empty()
            && self.screenings.is_empty()
            && self.lease_offers.is_empty()
            && self.leases.is_empty()
            && self.tenants.is_empty()
            && self.deposits.is_empty()
            && self.audit_log.is_empty()
    }

    /// Validate every staged record against the committed versions, then apply them.
    /// Nothing is written unless every record passes.
    pub fn apply(&mut self, staged: Tables) -> Result<(), StoreError> {
        check::<Organization>(self, &staged)?;
        check::<Prospect>(self, &staged)?;
        check::<Property>(self, &staged)?;
        check::<Application>(self, &staged)?;
        check::<Screening>(self, &staged)?;
        check::<LeaseOffer>(self, &staged)?;
        check::<Lease>(self, &staged)?;
        check::<Tenant>(self, &staged)?;
        check::<SecurityDeposit>(self, &staged)?;

        let Tables {
            organizations,
            prospects,
            properties,
            applications,
            screenings,
            lease_offers,
            leases,
            tenants,
            deposits,
            audit_log,
        } = staged;

        write(&mut self.organizations, organizations);
        write(&mut self.prospects, prospects);
        write(&mut self.properties, properties);
        write(&mut self.applications, applications);
        write(&mut self.screenings, screenings);
        write(&mut self.lease_offers, lease_offers);
        write(&mut self.leases, leases);
        write(&mut self.tenants, tenants);
        write(&mut self.deposits, deposits);
        self.audit_log.extend(audit_log);
        Ok(())
    }
}

fn check<T: Entity>(committed: &Tables, staged: &Tables) -> Result<(), StoreError> {
    let current = T::table(committed);
    for (id, record) in T::table(staged) {
        let stored_version = current.get(id).map(Entity::version);
        match (record.version(), stored_version) {
            (0, None) => {}
            (0, Some(_)) => {
                return Err(StoreError::Conflict(format!(
                    "{} {} already exists",
                    T::NAME,
                    id
                )))
            }
            (expected, Some(found)) if expected == found => {}
            (expected, found) => {
                return Err(StoreError::Conflict(format!(
                    "{} {} was modified concurrently (expected version {}, found {})",
                    T::NAME,
                    id,
                    expected,
                    found.map_or_else(|| "none".to_string(), |v| v.to_string())
                )))
            }
        }
    }
    Ok(())
}

fn write<T: Entity>(table: &mut BTreeMap<T::Id, T>, staged: BTreeMap<T::Id, T>) {
    for (id, mut record) in staged {
        record.set_version(record.version() + 1);
        table.insert(id, record);
    }
}

/// Transactional store the workflows run against.
pub trait Store: Send + Sync {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

/// An open transaction: a consistent read view plus commit/rollback.
pub trait StoreTransaction {
    fn tables(&self) -> &Tables;
    fn commit(self: Box<Self>, changes: Tables) -> Result<(), StoreError>;
    fn rollback(self: Box<Self>);
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend failure while {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Process-local store. A transaction holds the store lock from `begin` until
/// commit or rollback, so transactions are serialized.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record outside any workflow, as an import or fixture would.
    pub fn seed<T: Entity>(&self, mut record: T) -> Result<T, StoreError> {
        let mut tables = self.lock()?;
        record.set_version(1);
        T::table_mut(&mut tables).insert(record.id().clone(), record.clone());
        Ok(record)
    }

    /// Copy of the committed dataset.
    pub fn snapshot(&self) -> Result<Tables, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            guard: self.lock()?,
        }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn tables(&self) -> &Tables {
        &self.guard
    }

    fn commit(mut self: Box<Self>, changes: Tables) -> Result<(), StoreError> {
        self.guard.apply(changes)
    }

    fn rollback(self: Box<Self>) {}
}

macro_rules! impl_entity {
    ($entity:ty, $id:ty, $name:literal, $table:ident, |$record:ident| $org:expr) => {
        impl Entity for $entity {
            type Id = $id;

            const NAME: &'static str = $name;

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn organization_id(&self) -> &OrganizationId {
                let $record = self;
                $org
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }

            fn table(tables: &Tables) -> &BTreeMap<Self::Id, Self> {
                &tables.$table
            }

            fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Id, Self> {
                &mut tables.$table
            }
        }
    };
}

impl_entity!(Organization, OrganizationId, "organization", organizations, |r| &r.id);
impl_entity!(Prospect, ProspectId, "prospect", prospects, |r| &r.organization_id);
impl_entity!(Property, PropertyId, "property", properties, |r| &r.organization_id);
impl_entity!(Application, ApplicationId, "application", applications, |r| &r.organization_id);
impl_entity!(Screening, ScreeningId, "screening", screenings, |r| &r.organization_id);
impl_entity!(LeaseOffer, LeaseOfferId, "lease offer", lease_offers, |r| &r.organization_id);
impl_entity!(Lease, LeaseId, "lease", leases, |r| &r.organization_id);
impl_entity!(Tenant, TenantId, "tenant", tenants, |r| &r.organization_id);
impl_entity!(SecurityDeposit, SecurityDepositId, "security deposit", deposits, |r| &r.organization_id);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::leasing::domain::PropertyStatus;

    fn property(id: &str) -> Property {
        Property {
            id: PropertyId::new(id),
            organization_id: OrganizationId::new("org-test"),
            name: "Maple Court 2B".to_string(),
            address: "12 Maple Court".to_string(),
            status: PropertyStatus::Available,
            version: 0,
        }
    }

    #[test]
    fn commit_bumps_versions() {
        let store = MemoryStore::new();
        let mut staged = Tables::default();
        staged
            .properties
            .insert(PropertyId::new("p-1"), property("p-1"));

        let tx = store.begin().expect("begin");
        tx.commit(staged).expect("commit");

        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(snapshot.properties[&PropertyId::new("p-1")].version, 1);
    }

    #[test]
    fn stale_version_is_rejected_without_partial_writes() {
        let store = MemoryStore::new();
        let seeded = store.seed(property("p-1")).expect("seed");

        let mut stale = seeded.clone();
        stale.version = 7;
        stale.status = PropertyStatus::Occupied;
        let mut staged = Tables::default();
        staged.properties.insert(stale.id.clone(), stale);
        staged
            .properties
            .insert(PropertyId::new("p-2"), property("p-2"));

        let tx = store.begin().expect("begin");
        match tx.commit(staged) {
            Err(StoreError::Conflict(message)) => assert!(message.contains("p-1")),
            other => panic!("expected conflict, got {other:?}"),
        }

        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(snapshot.properties.len(), 1);
        assert_eq!(
            snapshot.properties[&seeded.id].status,
            PropertyStatus::Available
        );
    }

    #[test]
    fn inserting_an_existing_id_conflicts() {
        let store = MemoryStore::new();
        store.seed(property("p-1")).expect("seed");

        let mut staged = Tables::default();
        staged
            .properties
            .insert(PropertyId::new("p-1"), property("p-1"));

        let tx = store.begin().expect("begin");
        assert!(matches!(tx.commit(staged), Err(StoreError::Conflict(_))));
    }
}
