use tracing::debug;

use super::audit;
use super::domain::{
    Application, ApplicationId, LeaseOffer, LeaseOfferId, LeaseOfferStatus, Property, PropertyId,
    PropertyStatus,
};
use super::transitions::WorkflowState;
use super::unit_of_work::{UnitOfWork, WorkflowError};

/// Recompute a property's availability after an application or offer closes.
///
/// Reads go through the unit of work, so the closing mutation is already visible.
/// Only pending statuses are touched; an occupied or available property is left alone.
pub fn reconcile_property(
    uow: &mut UnitOfWork<'_>,
    property_id: &PropertyId,
    exclude_application: Option<&ApplicationId>,
    exclude_offer: Option<&LeaseOfferId>,
) -> Result<PropertyStatus, WorkflowError> {
    let mut property = uow.require::<Property>(property_id)?;

    let open_applications = uow
        .find::<Application>(|application| {
            application.property_id == *property_id
                && !application.is_deleted
                && !application.status.is_terminal()
                && Some(&application.id) != exclude_application
        })
        .len();
    let pending_offers = uow
        .find::<LeaseOffer>(|offer| {
            offer.property_id == *property_id
                && offer.status == LeaseOfferStatus::Pending
                && Some(&offer.id) != exclude_offer
        })
        .len();

    let target = match property.status {
        PropertyStatus::ApplicationPending | PropertyStatus::LeasePending
            if open_applications == 0 && pending_offers == 0 =>
        {
            Some(PropertyStatus::Available)
        }
        PropertyStatus::LeasePending if pending_offers == 0 => {
            Some(PropertyStatus::ApplicationPending)
        }
        _ => None,
    };

    debug!(
        property_id = %property.id,
        open_applications,
        pending_offers,
        current = property.status.label(),
        "reconciled property availability"
    );

    if let Some(target) = target {
        let id = property.id.clone();
        audit::mirror(uow, &id, &mut property.status, target, "Reconcile");
        let status = property.status;
        uow.stage(property);
        return Ok(status);
    }

    Ok(property.status)
}
