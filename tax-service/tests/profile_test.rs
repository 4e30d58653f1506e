//! Tax profile and summary integration tests.

mod common;

use common::{d, TestContext};
use service_core::error::AppError;
use tax_service::models::{BusinessSize, PlanTier, UpdateRegistration};
use tax_service::services::Alert;
use uuid::Uuid;

#[tokio::test]
async fn crossing_threshold_reclassifies_and_alerts() {
    let ctx = TestContext::new();
    let subject = ctx.subject(PlanTier::Business, "90000000", "200000000").await;
    assert!(ctx.alerts.alerts().await.is_empty());

    let update = ctx
        .engine
        .update_financials(subject, d("150000000"), d("200000000"))
        .await
        .unwrap();

    assert_eq!(
        update.transition,
        Some((BusinessSize::Small, BusinessSize::Medium))
    );
    assert_eq!(update.profile.business_size, "medium");
    assert_eq!(
        ctx.alerts.alerts().await,
        vec![Alert::BusinessSizeChanged {
            subject_id: subject,
            from: BusinessSize::Small,
            to: BusinessSize::Medium,
        }]
    );

    // Same class again: no further alert
    let update = ctx
        .engine
        .update_financials(subject, d("160000000"), d("200000000"))
        .await
        .unwrap();
    assert!(update.transition.is_none());
    assert_eq!(ctx.alerts.alerts().await.len(), 1);
}

#[tokio::test]
async fn assets_alone_can_make_business_medium() {
    let ctx = TestContext::new();
    let subject = ctx.subject(PlanTier::Business, "10000000", "0").await;

    let update = ctx
        .engine
        .update_financials(subject, d("10000000"), d("250000001"))
        .await
        .unwrap();

    assert_eq!(update.profile.parsed_size(), BusinessSize::Medium);
}

#[tokio::test]
async fn negative_financials_are_rejected() {
    let ctx = TestContext::new();
    let subject = ctx.subject(PlanTier::Starter, "1000", "0").await;

    let err = ctx
        .engine
        .update_financials(subject, d("-1"), d("0"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "annual_turnover"));

    let err = ctx
        .engine
        .update_financials(subject, d("0"), d("-5"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "fixed_assets"));

    let err = ctx.engine.compute_levy(subject, d("-1")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "profit"));
}

#[tokio::test]
async fn summary_reflects_tier_and_size() {
    let ctx = TestContext::new();
    let subject = ctx
        .subject(PlanTier::Business, "500000000", "300000000")
        .await;

    let summary = ctx.engine.get_tax_summary(subject).await.unwrap();

    assert_eq!(summary.plan_tier, PlanTier::Business);
    assert!(summary.capabilities.runs_cit);
    assert!(summary.capabilities.runs_vat);
    assert_eq!(summary.business_size, BusinessSize::Medium);
    assert!(!summary.is_small_business);
    assert_eq!(summary.cit_rate, d("0.30"));
    assert_eq!(summary.levy_rate, d("0.04"));
    assert_eq!(summary.vat_rate, d("0.075"));

    ctx.engine
        .set_plan_tier(subject, PlanTier::Free)
        .await
        .unwrap();
    let summary = ctx.engine.get_tax_summary(subject).await.unwrap();
    assert_eq!(summary.cit_rate, d("0"));
    assert_eq!(summary.vat_rate, d("0"));
    assert_eq!(summary.levy_rate, d("0.04"));
}

#[tokio::test]
async fn registration_readiness_tracks_identifiers() {
    let ctx = TestContext::new();
    let subject = ctx.subject(PlanTier::Starter, "1000000", "0").await;

    let summary = ctx.engine.get_tax_summary(subject).await.unwrap();
    assert!(!summary.registration.fiscalization_ready);
    assert_eq!(
        summary.registration.missing,
        vec!["tax_id", "vat_number", "fiscal_merchant_id"]
    );

    ctx.engine
        .update_registration(
            subject,
            UpdateRegistration {
                tax_id: Some("12345678-0001".to_string()),
                fiscal_merchant_id: Some("MRC-889".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let summary = ctx.engine.get_tax_summary(subject).await.unwrap();
    assert!(summary.registration.fiscalization_ready);
    assert_eq!(summary.registration.missing, vec!["vat_number"]);
}

#[tokio::test]
async fn operations_on_unknown_subject_are_not_found() {
    let ctx = TestContext::new();
    let stranger = Uuid::new_v4();

    assert!(matches!(
        ctx.engine.get_tax_summary(stranger).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.engine
            .update_financials(stranger, d("1"), d("1"))
            .await,
        Err(AppError::NotFound(_))
    ));
}
