//! End-to-end aggregation scenarios: the matching decisions the engine is
//! built around, driven through the background pass against the in-memory
//! store.

mod helpers;

use helpers::*;
use kindred_core::{ContactStore, ExceptionType};
use kindred_store::NewRawContact;

#[tokio::test]
async fn test_identical_names_aggregate() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r2, "+14155552222").await;

    let outcome = aggregator.run_pass().await.unwrap();
    assert_eq!(outcome.total, 2);
    assert!(!outcome.interrupted);

    let agg_id = aggregate_id_of(&store, r1).await.unwrap();
    assert_eq!(aggregate_id_of(&store, r2).await, Some(agg_id));
    assert_eq!(store.aggregate_count().await, 1);
    assert_eq!(store.aggregate(agg_id).await.unwrap().display_name, "John Doe");
}

#[tokio::test]
async fn test_shared_phone_with_close_name_aggregates() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = add_person(&store, "Jon", "Doe").await;
    add_phone(&store, r2, "+14155551111").await;

    aggregator.run_pass().await.unwrap();

    assert_eq!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
    assert_eq!(store.aggregate_count().await, 1);
}

#[tokio::test]
async fn test_close_name_without_shared_identifier_stays_apart() {
    // The counterpart of the secondary-pass join: a near-miss name alone is
    // not enough without the phone bridging it.
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = add_person(&store, "Jon", "Doe").await;
    add_phone(&store, r2, "+14155552222").await;

    aggregator.run_pass().await.unwrap();

    assert_ne!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
}

#[tokio::test]
async fn test_shared_phone_with_different_name_stays_apart() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = add_person(&store, "Deborah", "Doe").await;
    add_phone(&store, r2, "+14155551111").await;

    aggregator.run_pass().await.unwrap();

    assert_ne!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
    assert_eq!(store.aggregate_count().await, 2);
}

#[tokio::test]
async fn test_keep_out_overrides_identical_data() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = add_person(&store, "John", "Doe").await;
    add_phone(&store, r2, "+14155551111").await;
    store.insert_exception(r1, r2, ExceptionType::KeepOut).await;

    aggregator.run_pass().await.unwrap();

    assert_ne!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
    assert_eq!(store.aggregate_count().await, 2);
}

#[tokio::test]
async fn test_keep_in_overrides_name_mismatch() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "Alice", "Smith").await;
    let r2 = add_person(&store, "Bob", "Jones").await;
    store.insert_exception(r1, r2, ExceptionType::KeepIn).await;

    aggregator.run_pass().await.unwrap();

    let agg_id = aggregate_id_of(&store, r1).await.unwrap();
    assert_eq!(aggregate_id_of(&store, r2).await, Some(agg_id));
    // The more complex of the two member names wins.
    assert_eq!(store.aggregate(agg_id).await.unwrap().display_name, "Alice Smith");
}

#[tokio::test]
async fn test_nickname_cluster_bridges_names() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "Robert", "Miller").await;
    let r2 = add_person(&store, "Bob", "Miller").await;

    aggregator.run_pass().await.unwrap();

    assert_eq!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
}

#[tokio::test]
async fn test_email_local_part_bridges_to_structured_name() {
    let (store, aggregator) = engine();
    // The structured name aggregates first; the email-only contact reaches
    // it through the local-part nickname candidate.
    let named = add_person(&store, "John", "Doe").await;
    let email_only = store.insert_raw_contact(NewRawContact::new()).await;
    add_email(&store, email_only, "johndoe@example.org").await;

    aggregator.run_pass().await.unwrap();

    let agg_id = aggregate_id_of(&store, named).await.unwrap();
    assert_eq!(aggregate_id_of(&store, email_only).await, Some(agg_id));
    assert_eq!(store.aggregate(agg_id).await.unwrap().display_name, "John Doe");
}

#[tokio::test]
async fn test_free_form_nickname_rows_match_exactly() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "Alexander", "Petrov").await;
    add_nickname(&store, r1, "Lex").await;
    add_phone(&store, r1, "+14155551111").await;
    let r2 = store
        .insert_raw_contact(NewRawContact::new().with_display_name("Lex"))
        .await;
    add_nickname(&store, r2, "Lex").await;
    add_phone(&store, r2, "+14155551111").await;

    aggregator.run_pass().await.unwrap();

    // Nickname rows score against each other through the lookup index.
    assert_eq!(
        aggregate_id_of(&store, r1).await,
        aggregate_id_of(&store, r2).await
    );
}

#[tokio::test]
async fn test_rerunning_the_pass_is_idempotent() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    let r2 = add_person(&store, "John", "Doe").await;

    aggregator.run_pass().await.unwrap();
    let before_r1 = store.raw_contact(r1).await.unwrap().aggregate_id;
    let before_r2 = store.raw_contact(r2).await.unwrap().aggregate_id;
    let count_before = store.aggregate_count().await;

    let second = aggregator.run_pass().await.unwrap();
    assert_eq!(second.total, 0);
    assert_eq!(store.raw_contact(r1).await.unwrap().aggregate_id, before_r1);
    assert_eq!(store.raw_contact(r2).await.unwrap().aggregate_id, before_r2);
    assert_eq!(store.aggregate_count().await, count_before);
}

#[tokio::test]
async fn test_mark_and_reaggregate_rejoins_the_same_cluster() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    let r2 = add_person(&store, "John", "Doe").await;

    aggregator.run_pass().await.unwrap();
    let agg_id = aggregate_id_of(&store, r1).await.unwrap();

    let mode = aggregator.mark_contact_for_aggregation(r2).await.unwrap();
    assert_eq!(mode, kindred_core::AggregationMode::Default);
    assert_eq!(aggregate_id_of(&store, r2).await, None);
    assert!(store.name_lookup_entries(r2).await.is_empty());
    // The aggregate keeps living through its other member.
    assert!(store.aggregate(agg_id).await.is_some());

    aggregator.run_pass().await.unwrap();
    assert_eq!(aggregate_id_of(&store, r2).await, Some(agg_id));
}

#[tokio::test]
async fn test_mark_last_member_deletes_orphaned_aggregate() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "Solo", "Person").await;

    aggregator.run_pass().await.unwrap();
    let agg_id = aggregate_id_of(&store, r1).await.unwrap();

    aggregator.mark_contact_for_aggregation(r1).await.unwrap();
    assert!(store.aggregate(agg_id).await.is_none());
    assert_eq!(store.aggregate_count().await, 0);

    aggregator.run_pass().await.unwrap();
    assert!(aggregate_id_of(&store, r1).await.is_some());
}

#[tokio::test]
async fn test_mark_without_aggregate_reports_disabled() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;

    // Never aggregated: nothing to mark.
    let mode = aggregator.mark_contact_for_aggregation(r1).await.unwrap();
    assert_eq!(mode, kindred_core::AggregationMode::Disabled);
}

#[tokio::test]
async fn test_disabled_contacts_are_not_picked_up() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    let disabled = store
        .insert_raw_contact(
            NewRawContact::new()
                .with_display_name("John Doe")
                .with_aggregation_mode(kindred_core::AggregationMode::Disabled),
        )
        .await;

    let outcome = aggregator.run_pass().await.unwrap();
    assert_eq!(outcome.total, 1);
    assert!(aggregate_id_of(&store, r1).await.is_some());
    assert_eq!(aggregate_id_of(&store, disabled).await, None);
}

#[tokio::test]
async fn test_immediate_mode_joins_the_callers_transaction() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;

    // Dropping the ingest transaction unwinds the aggregation too.
    {
        let mut txn = store.begin().await.unwrap();
        let agg_id = aggregator
            .aggregate_contact_in_txn(txn.as_mut(), r1)
            .await
            .unwrap();
        assert!(agg_id > 0);
    }
    assert_eq!(aggregate_id_of(&store, r1).await, None);
    assert_eq!(store.aggregate_count().await, 0);

    // Committing publishes it.
    let mut txn = store.begin().await.unwrap();
    let agg_id = aggregator
        .aggregate_contact_in_txn(txn.as_mut(), r1)
        .await
        .unwrap();
    txn.commit().await.unwrap();
    assert_eq!(aggregate_id_of(&store, r1).await, Some(agg_id));
}

#[tokio::test]
async fn test_synchronous_single_contact_entry_point() {
    let (store, aggregator) = engine();
    let r1 = add_person(&store, "John", "Doe").await;
    let r2 = add_person(&store, "John", "Doe").await;

    let first = aggregator.aggregate_contact(r1).await.unwrap();
    let second = aggregator.aggregate_contact(r2).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(aggregate_id_of(&store, r2).await, Some(first));
}

#[tokio::test]
async fn test_aggregating_unknown_contact_is_an_integrity_error() {
    let (_store, aggregator) = engine();
    let err = aggregator.aggregate_contact(999).await.unwrap_err();
    assert!(err.is_integrity_violation());
}
