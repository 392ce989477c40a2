//! Transition tables for every status-bearing entity.
//!
//! Tables are pure lookups: workflow operations consult them before staging a
//! mutation and they never touch the store. Terminal states map to an empty slice.

use std::fmt;

use super::domain::{
    ApplicationStatus, DepositStatus, EntityKind, LeaseOfferStatus, LeaseStatus, ProspectStatus,
    PropertyStatus,
};

/// A status enum with a declared transition table.
pub trait WorkflowState: Copy + Eq + fmt::Debug + 'static {
    const KIND: EntityKind;
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    fn valid_next_states(self) -> &'static [Self];

    fn from_label(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.label().eq_ignore_ascii_case(value.trim()))
    }

    fn is_terminal(self) -> bool {
        self.valid_next_states().is_empty()
    }

    fn is_valid_transition(self, to: Self) -> bool {
        self.valid_next_states().contains(&to)
    }

    fn invalid_transition_reason(self, to: Self) -> String {
        let allowed = self.valid_next_states();
        if allowed.is_empty() {
            format!(
                "Cannot transition {} from {} to {}: {} is a terminal state",
                Self::KIND.label(),
                self.label(),
                to.label(),
                self.label()
            )
        } else {
            let labels: Vec<&str> = allowed.iter().map(|state| state.label()).collect();
            format!(
                "Cannot transition {} from {} to {}. Valid transitions: {}",
                Self::KIND.label(),
                self.label(),
                to.label(),
                labels.join(", ")
            )
        }
    }
}

impl WorkflowState for ApplicationStatus {
    const KIND: EntityKind = EntityKind::Application;
    const ALL: &'static [Self] = &[
        Self::Submitted,
        Self::UnderReview,
        Self::Screening,
        Self::Approved,
        Self::Denied,
        Self::LeaseOffered,
        Self::LeaseAccepted,
        Self::LeaseDeclined,
        Self::Expired,
        Self::Withdrawn,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "UnderReview",
            Self::Screening => "Screening",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::LeaseOffered => "LeaseOffered",
            Self::LeaseAccepted => "LeaseAccepted",
            Self::LeaseDeclined => "LeaseDeclined",
            Self::Expired => "Expired",
            Self::Withdrawn => "Withdrawn",
        }
    }

    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Submitted => &[Self::UnderReview, Self::Denied, Self::Withdrawn],
            Self::UnderReview => &[Self::Screening, Self::Denied, Self::Withdrawn],
            Self::Screening => &[Self::Approved, Self::Denied, Self::Withdrawn],
            Self::Approved => &[Self::LeaseOffered, Self::Denied, Self::Withdrawn],
            Self::LeaseOffered => &[
                Self::LeaseAccepted,
                Self::LeaseDeclined,
                Self::Expired,
                Self::Denied,
                Self::Withdrawn,
            ],
            Self::Denied
            | Self::LeaseAccepted
            | Self::LeaseDeclined
            | Self::Expired
            | Self::Withdrawn => &[],
        }
    }
}

impl WorkflowState for ProspectStatus {
    const KIND: EntityKind = EntityKind::Prospect;
    const ALL: &'static [Self] = &[
        Self::Lead,
        Self::Applied,
        Self::Screening,
        Self::Approved,
        Self::Denied,
        Self::LeaseOffered,
        Self::LeaseDeclined,
        Self::Withdrawn,
        Self::ConvertedToTenant,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Applied => "Applied",
            Self::Screening => "Screening",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::LeaseOffered => "LeaseOffered",
            Self::LeaseDeclined => "LeaseDeclined",
            Self::Withdrawn => "Withdrawn",
            Self::ConvertedToTenant => "ConvertedToTenant",
        }
    }

    // A closed application returns the prospect to a state from which a new
    // application may be submitted.
    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Lead => &[Self::Applied, Self::Withdrawn],
            Self::Applied => &[Self::Screening, Self::Denied, Self::Withdrawn],
            Self::Screening => &[Self::Approved, Self::Denied, Self::Withdrawn],
            Self::Approved => &[Self::LeaseOffered, Self::Denied, Self::Withdrawn],
            Self::LeaseOffered => &[
                Self::ConvertedToTenant,
                Self::LeaseDeclined,
                Self::Withdrawn,
            ],
            Self::Denied | Self::LeaseDeclined | Self::Withdrawn => &[Self::Applied],
            Self::ConvertedToTenant => &[],
        }
    }
}

impl WorkflowState for PropertyStatus {
    const KIND: EntityKind = EntityKind::Property;
    const ALL: &'static [Self] = &[
        Self::Available,
        Self::ApplicationPending,
        Self::LeasePending,
        Self::Occupied,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::ApplicationPending => "ApplicationPending",
            Self::LeasePending => "LeasePending",
            Self::Occupied => "Occupied",
        }
    }

    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Available => &[Self::ApplicationPending, Self::LeasePending, Self::Occupied],
            Self::ApplicationPending => &[Self::Available, Self::LeasePending, Self::Occupied],
            Self::LeasePending => &[Self::Available, Self::ApplicationPending, Self::Occupied],
            Self::Occupied => &[Self::Available],
        }
    }
}

impl WorkflowState for LeaseOfferStatus {
    const KIND: EntityKind = EntityKind::LeaseOffer;
    const ALL: &'static [Self] = &[Self::Pending, Self::Accepted, Self::Declined, Self::Expired];

    fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Expired => "Expired",
        }
    }

    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Declined, Self::Expired],
            Self::Accepted | Self::Declined | Self::Expired => &[],
        }
    }
}

impl WorkflowState for LeaseStatus {
    const KIND: EntityKind = EntityKind::Lease;
    const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Active,
        Self::Renewed,
        Self::MonthToMonth,
        Self::NoticeGiven,
        Self::Expired,
        Self::Terminated,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Renewed => "Renewed",
            Self::MonthToMonth => "MonthToMonth",
            Self::NoticeGiven => "NoticeGiven",
            Self::Expired => "Expired",
            Self::Terminated => "Terminated",
        }
    }

    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Active, Self::Terminated],
            Self::Active => &[
                Self::Renewed,
                Self::MonthToMonth,
                Self::NoticeGiven,
                Self::Expired,
                Self::Terminated,
            ],
            Self::Renewed => &[Self::Active, Self::NoticeGiven, Self::Terminated],
            Self::MonthToMonth => &[Self::NoticeGiven, Self::Renewed, Self::Terminated],
            Self::NoticeGiven => &[Self::Expired, Self::Terminated],
            Self::Expired | Self::Terminated => &[],
        }
    }
}

impl WorkflowState for DepositStatus {
    const KIND: EntityKind = EntityKind::SecurityDeposit;
    const ALL: &'static [Self] = &[
        Self::Held,
        Self::PendingReturn,
        Self::Forfeited,
        Self::Refunded,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Held => "Held",
            Self::PendingReturn => "PendingReturn",
            Self::Forfeited => "Forfeited",
            Self::Refunded => "Refunded",
        }
    }

    fn valid_next_states(self) -> &'static [Self] {
        match self {
            Self::Held => &[Self::PendingReturn, Self::Forfeited, Self::Refunded],
            Self::PendingReturn | Self::Forfeited => &[Self::Refunded],
            Self::Refunded => &[],
        }
    }
}

/// String-boundary lookup. Unknown kinds or labels yield an empty set.
pub fn valid_next_labels(kind: EntityKind, current: &str) -> Vec<&'static str> {
    fn labels<S: WorkflowState>(current: &str) -> Vec<&'static str> {
        S::from_label(current)
            .map(|state| {
                state
                    .valid_next_states()
                    .iter()
                    .map(|next| next.label())
                    .collect()
            })
            .unwrap_or_default()
    }

    match kind {
        EntityKind::Application => labels::<ApplicationStatus>(current),
        EntityKind::Prospect => labels::<ProspectStatus>(current),
        EntityKind::Property => labels::<PropertyStatus>(current),
        EntityKind::LeaseOffer => labels::<LeaseOfferStatus>(current),
        EntityKind::Lease => labels::<LeaseStatus>(current),
        EntityKind::SecurityDeposit => labels::<DepositStatus>(current),
        EntityKind::Screening | EntityKind::Tenant => Vec::new(),
    }
}

/// String-boundary membership test.
pub fn is_valid_label_transition(kind: EntityKind, from: &str, to: &str) -> bool {
    valid_next_labels(kind, from)
        .iter()
        .any(|label| label.eq_ignore_ascii_case(to.trim()))
}
