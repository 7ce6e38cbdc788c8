mod common;

use common::{header, line, TestContext};
use emmo_ingest::{
    models::ProductUpsert,
    repositories::{LineRepository, ProductMasterRepository},
};
use rust_decimal_macros::dec;

/// Two tasks ingest the same new code at once. The test pool has a single
/// connection, so the two transactions queue and run one after the other;
/// the lost-insert path is covered by `losing_insert_falls_back_to_merge`.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_ingests_share_one_master_row() {
    let ctx = TestContext::new().await;

    let first = ctx.service.clone();
    let second = ctx.service.clone();
    let a = tokio::spawn(async move {
        first
            .ingest_invoice(header("C-001"), vec![line(Some("XYZ"), 1, dec!(10))])
            .await
    });
    let b = tokio::spawn(async move {
        second
            .ingest_invoice(header("C-002"), vec![line(Some("XYZ"), 2, dec!(10))])
            .await
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(ctx.master_rows("PRO_XYZ").await, 1);
    assert_eq!(a.masters_created + b.masters_created, 1);

    for outcome in [&a, &b] {
        let lines = LineRepository::list_for_invoice(&*ctx.db, outcome.invoice.id)
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].reference_code.as_deref(), Some("PRO_XYZ"));
        assert_eq!(ctx.observations_for_invoice(outcome.invoice.id).await.len(), 1);
    }
}

#[tokio::test]
async fn losing_insert_falls_back_to_merge() {
    let ctx = TestContext::new().await;
    let incoming = ProductUpsert {
        unit_cost: Some(dec!(10)),
        ..ProductUpsert::new("PRO_RACE")
    };

    assert!(ProductMasterRepository::insert_if_absent(&*ctx.db, &incoming)
        .await
        .unwrap());
    assert!(!ProductMasterRepository::insert_if_absent(&*ctx.db, &incoming)
        .await
        .unwrap());

    let outcome = ProductMasterRepository::upsert_expecting_new(
        &*ctx.db,
        &ProductUpsert {
            description: Some("Bolso".into()),
            ..ProductUpsert::new("PRO_RACE")
        },
    )
    .await
    .unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.product.unit_cost, Some(dec!(10)));
    assert_eq!(outcome.product.description.as_deref(), Some("Bolso"));
    assert_eq!(ctx.master_rows("PRO_RACE").await, 1);
}
