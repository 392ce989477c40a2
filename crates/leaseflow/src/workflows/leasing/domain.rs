use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

static ENTITY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence(prefix: &str) -> String {
    let id = ENTITY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub(crate) fn generate() -> Self {
                Self(next_sequence($prefix))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Tenant boundary every record is scoped to.
    OrganizationId,
    "org"
);
entity_id!(ProspectId, "prospect");
entity_id!(PropertyId, "property");
entity_id!(
    /// Identifier wrapper for submitted applications.
    ApplicationId,
    "app"
);
entity_id!(ScreeningId, "screening");
entity_id!(LeaseOfferId, "offer");
entity_id!(LeaseId, "lease");
entity_id!(TenantId, "tenant");
entity_id!(SecurityDepositId, "deposit");
entity_id!(AuditEntryId, "audit");

/// Entity kinds that carry a workflow status or appear in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Application,
    Prospect,
    Property,
    Screening,
    LeaseOffer,
    Lease,
    Tenant,
    SecurityDeposit,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Prospect => "Prospect",
            Self::Property => "Property",
            Self::Screening => "Screening",
            Self::LeaseOffer => "LeaseOffer",
            Self::Lease => "Lease",
            Self::Tenant => "Tenant",
            Self::SecurityDeposit => "SecurityDeposit",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        [
            Self::Application,
            Self::Prospect,
            Self::Property,
            Self::Screening,
            Self::LeaseOffer,
            Self::Lease,
            Self::Tenant,
            Self::SecurityDeposit,
        ]
        .into_iter()
        .find(|kind| kind.label().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Screening,
    Approved,
    Denied,
    LeaseOffered,
    LeaseAccepted,
    LeaseDeclined,
    Expired,
    Withdrawn,
}

/// Prospect status mirrors the state of the prospect's active application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProspectStatus {
    Lead,
    Applied,
    Screening,
    Approved,
    Denied,
    LeaseOffered,
    LeaseDeclined,
    Withdrawn,
    ConvertedToTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyStatus {
    Available,
    ApplicationPending,
    LeasePending,
    Occupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreeningResult {
    Pending,
    Passed,
    Failed,
    ConditionalPass,
}

impl ScreeningResult {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::ConditionalPass => "ConditionalPass",
        }
    }

    pub const fn permits_approval(self) -> bool {
        matches!(self, Self::Passed | Self::ConditionalPass)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseOfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatus {
    Pending,
    Active,
    Renewed,
    MonthToMonth,
    NoticeGiven,
    Expired,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    Held,
    PendingReturn,
    Forfeited,
    Refunded,
}

/// Organization-level settings consulted by the workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub application_expiration_days: Option<i64>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub organization_id: OrganizationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: ProspectStatus,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub address: String,
    pub status: PropertyStatus,
    #[serde(default)]
    pub version: u64,
}

/// Government identification captured at submission; duplicate detection keys on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub number: String,
    pub state: String,
}

impl Identification {
    pub fn matches(&self, other: &Identification) -> bool {
        self.number.trim().eq_ignore_ascii_case(other.number.trim())
            && self.state.trim().eq_ignore_ascii_case(other.state.trim())
    }
}

/// Who decided an application, when, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub organization_id: OrganizationId,
    pub prospect_id: ProspectId,
    pub property_id: PropertyId,
    pub status: ApplicationStatus,
    pub identification: Identification,
    pub monthly_income: Option<u32>,
    pub desired_move_in: Option<NaiveDate>,
    pub application_fee_paid: bool,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision: Option<DecisionRecord>,
    pub is_deleted: bool,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    pub id: ScreeningId,
    pub organization_id: OrganizationId,
    pub application_id: ApplicationId,
    pub background_check_requested: bool,
    pub credit_check_requested: bool,
    pub background_result: Option<ScreeningResult>,
    pub credit_result: Option<ScreeningResult>,
    pub credit_score: Option<u16>,
    pub overall_result: ScreeningResult,
    pub notes: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseOffer {
    pub id: LeaseOfferId,
    pub organization_id: OrganizationId,
    pub application_id: ApplicationId,
    pub property_id: PropertyId,
    pub prospect_id: ProspectId,
    pub status: LeaseOfferStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: u32,
    pub security_deposit: u32,
    pub special_terms: Option<String>,
    pub offered_at: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub lease_id: Option<LeaseId>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeType {
    TenantInitiated,
    LandlordInitiated,
    MutualAgreement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationNotice {
    pub notice_date: NaiveDate,
    pub move_out_date: NaiveDate,
    pub notice_type: NoticeType,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationType {
    MutualAgreement,
    TenantBreach,
    LandlordBreach,
    Eviction,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseTermination {
    pub termination_type: TerminationType,
    pub reason: String,
    pub effective_date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveOutDetails {
    pub forwarding_address: Option<String>,
    pub condition_notes: Option<String>,
    #[serde(default)]
    pub keys_returned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutRecord {
    pub actual_move_out_date: NaiveDate,
    pub details: MoveOutDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub organization_id: OrganizationId,
    pub property_id: PropertyId,
    pub tenant_id: TenantId,
    pub lease_offer_id: Option<LeaseOfferId>,
    pub previous_lease_id: Option<LeaseId>,
    pub renewal_number: u32,
    pub status: LeaseStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: u32,
    pub security_deposit: u32,
    pub move_in_date: Option<NaiveDate>,
    pub notice: Option<TerminationNotice>,
    pub termination: Option<LeaseTermination>,
    pub move_out: Option<MoveOutRecord>,
    #[serde(default)]
    pub version: u64,
}

/// Created once from a prospect when a lease offer is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub organization_id: OrganizationId,
    pub prospect_id: ProspectId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositDeduction {
    pub description: String,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRefund {
    pub amount: u32,
    pub method: String,
    pub reference: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityDeposit {
    pub id: SecurityDepositId,
    pub organization_id: OrganizationId,
    pub lease_id: LeaseId,
    pub amount: u32,
    pub status: DepositStatus,
    pub payment_method: String,
    pub received_on: NaiveDate,
    pub deductions: Vec<DepositDeduction>,
    pub refund_amount: Option<u32>,
    pub amount_owed: Option<u32>,
    pub settlement_initiated_at: Option<DateTime<Utc>>,
    pub refund: Option<DepositRefund>,
    #[serde(default)]
    pub version: u64,
}

/// Split of a deposit against its deductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSettlement {
    pub total_deductions: u32,
    pub refund_amount: u32,
    pub amount_owed: u32,
}

impl DepositSettlement {
    /// `None` when the deductions add up to more than a `u32` can hold.
    pub fn compute(deposit: u32, deductions: &[DepositDeduction]) -> Option<Self> {
        let total: u64 = deductions
            .iter()
            .map(|deduction| u64::from(deduction.amount))
            .sum();
        let total_deductions = u32::try_from(total).ok()?;

        Some(Self {
            total_deductions,
            refund_amount: deposit.saturating_sub(total_deductions),
            amount_owed: total_deductions.saturating_sub(deposit),
        })
    }
}

/// Append-only transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub organization_id: OrganizationId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub action: String,
    pub reason: Option<String>,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}
