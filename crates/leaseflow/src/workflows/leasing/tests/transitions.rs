use crate::workflows::leasing::domain::{
    ApplicationStatus, DepositStatus, EntityKind, LeaseOfferStatus, LeaseStatus, PropertyStatus,
    ProspectStatus,
};
use crate::workflows::leasing::transitions::{
    is_valid_label_transition, valid_next_labels, WorkflowState,
};

fn terminal_states_have_no_successors<S: WorkflowState>() {
    for state in S::ALL {
        if state.is_terminal() {
            assert!(
                state.valid_next_states().is_empty(),
                "{:?} is terminal but lists successors",
                state
            );
            for target in S::ALL {
                assert!(!state.is_valid_transition(*target));
            }
        }
    }
}

#[test]
fn terminal_states_never_transition() {
    terminal_states_have_no_successors::<ApplicationStatus>();
    terminal_states_have_no_successors::<ProspectStatus>();
    terminal_states_have_no_successors::<PropertyStatus>();
    terminal_states_have_no_successors::<LeaseOfferStatus>();
    terminal_states_have_no_successors::<LeaseStatus>();
    terminal_states_have_no_successors::<DepositStatus>();
}

#[test]
fn application_terminal_states_match_lifecycle() {
    let terminal: Vec<ApplicationStatus> = ApplicationStatus::ALL
        .iter()
        .copied()
        .filter(|state| state.is_terminal())
        .collect();

    assert_eq!(
        terminal,
        vec![
            ApplicationStatus::Denied,
            ApplicationStatus::LeaseAccepted,
            ApplicationStatus::LeaseDeclined,
            ApplicationStatus::Expired,
            ApplicationStatus::Withdrawn,
        ]
    );
}

#[test]
fn offered_applications_can_still_be_denied() {
    assert!(ApplicationStatus::LeaseOffered.is_valid_transition(ApplicationStatus::Denied));
    assert!(!ApplicationStatus::LeaseAccepted.is_valid_transition(ApplicationStatus::Denied));
}

#[test]
fn lease_table_follows_lifecycle() {
    assert!(LeaseStatus::Pending.is_valid_transition(LeaseStatus::Active));
    assert!(LeaseStatus::Active.is_valid_transition(LeaseStatus::Renewed));
    assert!(LeaseStatus::MonthToMonth.is_valid_transition(LeaseStatus::Renewed));
    assert!(LeaseStatus::NoticeGiven.is_valid_transition(LeaseStatus::Terminated));
    assert!(!LeaseStatus::Pending.is_valid_transition(LeaseStatus::Expired));
    assert!(LeaseStatus::Expired.is_terminal());
    assert!(LeaseStatus::Terminated.is_terminal());
}

#[test]
fn labels_round_trip_for_every_state() {
    for state in LeaseStatus::ALL {
        assert_eq!(LeaseStatus::from_label(state.label()), Some(*state));
    }
    assert_eq!(
        ApplicationStatus::from_label(" underreview "),
        Some(ApplicationStatus::UnderReview)
    );
    assert_eq!(ApplicationStatus::from_label("Archived"), None);
}

#[test]
fn invalid_transition_reason_lists_alternatives() {
    let reason = ApplicationStatus::Submitted.invalid_transition_reason(ApplicationStatus::Approved);
    assert!(reason.contains("Cannot transition Application from Submitted to Approved"));
    assert!(reason.contains("UnderReview, Denied, Withdrawn"));

    let terminal = ApplicationStatus::Denied.invalid_transition_reason(ApplicationStatus::Approved);
    assert!(terminal.contains("terminal"));
}

#[test]
fn unknown_labels_map_to_empty_set() {
    assert!(valid_next_labels(EntityKind::Lease, "Archived").is_empty());
    assert!(valid_next_labels(EntityKind::Screening, "Pending").is_empty());
    assert_eq!(
        valid_next_labels(EntityKind::SecurityDeposit, "Held"),
        vec!["PendingReturn", "Forfeited", "Refunded"]
    );
    assert!(is_valid_label_transition(
        EntityKind::LeaseOffer,
        "Pending",
        "accepted"
    ));
    assert!(!is_valid_label_transition(
        EntityKind::LeaseOffer,
        "Accepted",
        "Declined"
    ));
}

#[test]
fn property_availability_is_never_terminal() {
    for state in PropertyStatus::ALL {
        assert!(!state.is_terminal(), "{state:?} should allow a way out");
    }
}
