pub mod applications;
pub mod audit;
pub mod domain;
pub mod leases;
pub mod ports;
mod reconcile;
pub mod router;
pub mod store;
pub mod transitions;
pub mod unit_of_work;

#[cfg(test)]
mod tests;

use crate::config::LeasingConfig;

pub use applications::{
    AcceptedOffer, ApplicationSubmission, ApplicationWorkflow, DepositPayment, GeneratedOffer,
    LeaseOfferTerms, ScreeningRequest, ScreeningResults, COMPETITOR_DENIAL_REASON,
};
pub use leases::{
    DepositRefundRequest, EarlyTermination, LeaseRenewal, LeaseWorkflow, RenewedLease,
    TerminationNoticeRequest,
};
pub use router::leasing_router;
pub use store::{MemoryStore, Store, StoreError, StoreTransaction};
pub use transitions::WorkflowState;
pub use unit_of_work::{OperationResult, UnitOfWork, UnitOfWorkExecutor, WorkflowError};

/// Both workflows sharing one executor, as mounted by the HTTP layer.
pub struct LeasingServices<S> {
    pub applications: ApplicationWorkflow<S>,
    pub leases: LeaseWorkflow<S>,
}

impl<S> LeasingServices<S>
where
    S: Store + 'static,
{
    pub fn new(executor: UnitOfWorkExecutor<S>, config: LeasingConfig) -> Self {
        Self {
            applications: ApplicationWorkflow::new(executor.clone(), config),
            leases: LeaseWorkflow::new(executor, config),
        }
    }
}
