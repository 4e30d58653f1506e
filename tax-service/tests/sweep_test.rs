//! Month-end sweep integration tests.

mod common;

use common::{at, d, revenue, TestContext};
use service_core::error::AppError;
use tax_service::config::SweepConfig;
use tax_service::engine::Sweeper;
use tax_service::models::{Basis, PeriodParts, PeriodType, PlanTier, ReportKey};
use tax_service::services::{Alert, ReportStore};
use uuid::Uuid;

fn sweep_config(page_size: i64) -> SweepConfig {
    SweepConfig {
        enabled: true,
        page_size,
        progress_every: 1,
        max_retries: 0,
    }
}

async fn monthly_revenue(ctx: &TestContext, subject: Uuid) -> Option<rust_decimal::Decimal> {
    let range = ctx
        .engine
        .resolve_period(PeriodType::Month, &PeriodParts::month(2025, 5))
        .unwrap();
    ctx.store
        .find_report(&ReportKey {
            subject_id: subject,
            period_type: PeriodType::Month,
            start_date: range.start,
            end_date: range.end,
        })
        .await
        .unwrap()
        .map(|r| r.total_revenue)
}

#[tokio::test]
async fn sweep_walks_every_subject_across_pages() {
    let ctx = TestContext::new();
    let mut subjects = Vec::new();
    for i in 0..5 {
        let subject = ctx.subject(PlanTier::Starter, "1000000", "0").await;
        ctx.store
            .insert_entry(revenue(
                subject,
                &format!("{}000", i + 1),
                None,
                "0",
                "paid",
                at(2025, 5, 10),
            ))
            .await;
        subjects.push(subject);
    }

    let summary = Sweeper::new(ctx.engine.clone(), sweep_config(2))
        .run_month(2025, 5)
        .await
        .unwrap();

    assert_eq!(summary.period, "2025-05");
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(ctx.store.report_count().await, 5);
    for (i, subject) in subjects.iter().enumerate() {
        assert_eq!(
            monthly_revenue(&ctx, *subject).await,
            Some(d(&format!("{}000", i + 1)))
        );
    }
}

#[tokio::test]
async fn sweep_refreshes_stale_cached_reports() {
    let ctx = TestContext::new();
    let subject = ctx.subject(PlanTier::Starter, "1000000", "0").await;
    ctx.engine
        .generate_report(
            subject,
            PeriodType::Month,
            &PeriodParts::month(2025, 5),
            Basis::Paid,
            false,
        )
        .await
        .unwrap();
    ctx.store
        .insert_entry(revenue(subject, "7000", None, "0", "paid", at(2025, 5, 10)))
        .await;

    Sweeper::new(ctx.engine.clone(), sweep_config(10))
        .run_month(2025, 5)
        .await
        .unwrap();

    assert_eq!(monthly_revenue(&ctx, subject).await, Some(d("7000")));
}

#[tokio::test]
async fn one_failing_subject_does_not_abort_sweep() {
    let broken = Uuid::new_v4();
    let ctx = TestContext::builder().ledger_fails_for(broken).build();
    ctx.engine
        .set_plan_tier(broken, PlanTier::Business)
        .await
        .unwrap();
    let healthy_a = ctx.subject(PlanTier::Starter, "1000000", "0").await;
    let healthy_b = ctx.subject(PlanTier::Business, "1000000", "0").await;

    let summary = Sweeper::new(ctx.engine.clone(), sweep_config(1))
        .run_month(2025, 5)
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_subjects, vec![broken]);
    assert!(monthly_revenue(&ctx, healthy_a).await.is_some());
    assert!(monthly_revenue(&ctx, healthy_b).await.is_some());
    assert!(monthly_revenue(&ctx, broken).await.is_none());

    let alerts = ctx.alerts.alerts().await;
    assert!(alerts.iter().any(|a| matches!(
        a,
        Alert::SweepSubjectFailed { subject_id, .. } if *subject_id == broken
    )));
    assert!(alerts.iter().any(|a| matches!(
        a,
        Alert::SweepSummary { processed: 3, failed: 1, .. }
    )));
}

#[tokio::test]
async fn sweep_with_no_subjects_still_reports_summary() {
    let ctx = TestContext::new();

    let summary = Sweeper::new(ctx.engine.clone(), sweep_config(50))
        .run_month_with_retry(2025, 5)
        .await
        .unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(
        ctx.alerts.alerts().await,
        vec![Alert::SweepSummary {
            period: "2025-05".to_string(),
            processed: 0,
            succeeded: 0,
            failed: 0,
        }]
    );
}

#[tokio::test]
async fn invalid_month_is_rejected_before_sweeping() {
    let ctx = TestContext::new();
    ctx.subject(PlanTier::Starter, "1000000", "0").await;

    let result = Sweeper::new(ctx.engine.clone(), sweep_config(10))
        .run_month(2025, 13)
        .await;

    assert!(matches!(result, Err(AppError::Validation { .. })));
    assert_eq!(ctx.store.report_count().await, 0);
}
