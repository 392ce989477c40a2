use crate::infra::{seed_portfolio, InMemoryAlertPublisher, InMemoryNoteService, SeededPortfolio};
use chrono::{Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use leaseflow::config::LeasingConfig;
use leaseflow::error::AppError;
use leaseflow::workflows::leasing::domain::{
    Application, DepositDeduction, EntityKind, Identification, LeaseId, NoticeType,
    OrganizationId, PropertyId, ProspectId, ScreeningResult,
};
use leaseflow::workflows::leasing::ports::{FixedClock, StaticActor};
use leaseflow::workflows::leasing::{
    ApplicationSubmission, DepositPayment, DepositRefundRequest, LeaseOfferTerms,
    LeasingServices, MemoryStore, ScreeningRequest, ScreeningResults, TerminationNoticeRequest,
    UnitOfWorkExecutor, WorkflowState,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Stop once the lease is signed instead of following it through move-out.
    #[arg(long)]
    pub(crate) skip_move_out: bool,
}

struct Demo {
    services: LeasingServices<MemoryStore>,
    clock: Arc<FixedClock>,
    alerts: InMemoryAlertPublisher,
    notes: InMemoryNoteService,
    portfolio: SeededPortfolio,
    today: NaiveDate,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        skip_move_out,
    } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let demo = Demo::start(today)?;

    println!("Leasing workflow demo ({today})");

    let property = demo.property(0)?;
    let avery = demo.apply(demo.prospect(0)?, &property, "S1042233")?;
    let blake = demo.apply(demo.prospect(1)?, &property, "S7781020")?;
    println!(
        "- {} and {} applied for {}",
        avery.prospect_id, blake.prospect_id, property
    );

    let second_unit = demo.property(1)?;
    let casey = demo.apply(demo.prospect(2)?, &second_unit, "S5512094")?;
    demo.services
        .applications
        .withdraw(&casey.id, "Signed elsewhere")?;
    println!(
        "- {} applied for {} and withdrew; unit is {}",
        casey.prospect_id,
        second_unit,
        demo.services.applications.property(&second_unit)?.status.label()
    );

    demo.screen_and_approve(&avery)?;
    println!("- {} passed screening and was approved", avery.id);

    let generated = demo.services.applications.generate_lease_offer(
        &avery.id,
        LeaseOfferTerms {
            start_date: today + Duration::days(14),
            end_date: today + Duration::days(14 + 365),
            monthly_rent: 1725,
            security_deposit: 1725,
            special_terms: Some("Tenant pays electric".to_string()),
        },
    )?;
    println!(
        "- Offer {} generated (expires {}); {} competing application(s) denied",
        generated.offer.id,
        generated.offer.expires_on.date_naive(),
        generated.competitors_denied
    );
    println!(
        "  {} is now {}",
        blake.id,
        demo.services.applications.application(&blake.id)?.status.label()
    );

    let accepted = demo.services.applications.accept_lease_offer(
        &generated.offer.id,
        DepositPayment {
            payment_method: "ACH".to_string(),
            received_on: today,
            move_in_date: Some(today + Duration::days(14)),
        },
    )?;
    println!(
        "- Offer accepted: lease {} ({}), tenant {}, deposit {} held",
        accepted.lease.id,
        accepted.lease.status.label(),
        accepted.tenant.id,
        accepted.deposit.amount
    );

    if !skip_move_out {
        demo.move_out(&accepted.lease.id)?;
    }

    println!(
        "\nProperty {} is {}",
        property,
        demo.services.applications.property(&property)?.status.label()
    );
    println!("Audit trail for {property}:");
    for entry in demo
        .services
        .applications
        .audit_trail(EntityKind::Property, property.as_str())?
    {
        println!(
            "  - {} -> {} via {}",
            entry.from_status.as_deref().unwrap_or("(new)"),
            entry.to_status,
            entry.action
        );
    }

    let alerts = demo.alerts.events();
    println!("Alerts dispatched: {}", alerts.len());
    for alert in alerts {
        println!("  - {} -> {} {}", alert.template, alert.entity, alert.entity_id);
    }
    let notes = demo.notes.notes();
    println!("Notes recorded: {}", notes.len());
    for note in notes {
        println!("  - {} {}: {}", note.entity, note.entity_id, note.text);
    }

    Ok(())
}

impl Demo {
    fn start(today: NaiveDate) -> Result<Self, AppError> {
        let organization_id = OrganizationId::new("org-cedar");
        let store = Arc::new(MemoryStore::new());
        let portfolio = seed_portfolio(&store, &organization_id)?;

        let clock = Arc::new(FixedClock::new(
            Utc.from_utc_datetime(&today.and_time(NaiveTime::MIN)) + Duration::hours(16),
        ));
        let alerts = InMemoryAlertPublisher::default();
        let notes = InMemoryNoteService::default();
        let executor = UnitOfWorkExecutor::new(
            store,
            Arc::new(StaticActor::new("demo-agent", organization_id)),
            clock.clone(),
            Arc::new(alerts.clone()),
            Arc::new(notes.clone()),
        );

        Ok(Self {
            services: LeasingServices::new(executor, LeasingConfig::default()),
            clock,
            alerts,
            notes,
            portfolio,
            today,
        })
    }

    fn property(&self, index: usize) -> Result<PropertyId, AppError> {
        self.portfolio
            .properties
            .get(index)
            .cloned()
            .ok_or_else(|| missing_fixture("property"))
    }

    fn prospect(&self, index: usize) -> Result<ProspectId, AppError> {
        self.portfolio
            .prospects
            .get(index)
            .cloned()
            .ok_or_else(|| missing_fixture("prospect"))
    }

    fn apply(
        &self,
        prospect: ProspectId,
        property: &PropertyId,
        license: &str,
    ) -> Result<Application, AppError> {
        let application = self.services.applications.submit(
            &prospect,
            property,
            ApplicationSubmission {
                identification: Identification {
                    number: license.to_string(),
                    state: "OR".to_string(),
                },
                monthly_income: Some(5800),
                desired_move_in: Some(self.today + Duration::days(14)),
                application_fee_paid: true,
            },
        )?;
        Ok(application)
    }

    fn screen_and_approve(&self, application: &Application) -> Result<(), AppError> {
        let applications = &self.services.applications;
        applications.mark_under_review(&application.id)?;
        applications.initiate_screening(
            &application.id,
            ScreeningRequest {
                background_check: true,
                credit_check: true,
            },
        )?;
        applications.complete_screening(
            &application.id,
            ScreeningResults {
                background_result: Some(ScreeningResult::Passed),
                credit_result: Some(ScreeningResult::Passed),
                credit_score: Some(741),
                overall_result: ScreeningResult::Passed,
                notes: None,
            },
        )?;
        applications.approve(&application.id)?;
        Ok(())
    }

    fn move_out(&self, lease_id: &LeaseId) -> Result<(), AppError> {
        let leases = &self.services.leases;

        self.clock.advance(Duration::days(200));
        let notice_date = self.today + Duration::days(200);
        let move_out_date = notice_date + Duration::days(45);
        leases.record_termination_notice(
            lease_id,
            TerminationNoticeRequest {
                notice_date,
                move_out_date,
                notice_type: NoticeType::TenantInitiated,
                reason: "Buying a house".to_string(),
            },
        )?;
        println!("- Notice recorded on {notice_date}; move-out planned for {move_out_date}");

        let deposit = leases.initiate_deposit_settlement(
            lease_id,
            vec![
                DepositDeduction {
                    description: "Wall repair".to_string(),
                    amount: 180,
                },
                DepositDeduction {
                    description: "Final cleaning".to_string(),
                    amount: 220,
                },
            ],
        )?;
        let refund = deposit.refund_amount.unwrap_or_default();
        println!(
            "- Deposit settlement: {} -> refund {} / owed {}",
            deposit.status.label(),
            refund,
            deposit.amount_owed.unwrap_or_default()
        );

        self.clock.advance(Duration::days(45));
        let lease = leases.complete_move_out(lease_id, move_out_date, None)?;
        println!("- Move-out completed; lease is {}", lease.status.label());

        let deposit = leases.record_deposit_refund(
            lease_id,
            DepositRefundRequest {
                amount: refund,
                method: "Check".to_string(),
                reference: Some("CHK-1188".to_string()),
            },
        )?;
        println!("- Deposit {} ({refund} refunded)", deposit.status.label());
        Ok(())
    }
}

fn missing_fixture(kind: &str) -> AppError {
    AppError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("demo portfolio has no {kind} fixture"),
    ))
}
