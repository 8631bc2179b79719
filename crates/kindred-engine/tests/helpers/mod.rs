//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use kindred_core::DataKind;
use kindred_engine::ContactAggregator;
use kindred_store::{MemoryStore, NewRawContact};

pub fn engine() -> (Arc<MemoryStore>, Arc<ContactAggregator<MemoryStore>>) {
    let store = Arc::new(MemoryStore::new());
    let aggregator = Arc::new(ContactAggregator::new(store.clone()));
    (store, aggregator)
}

/// Insert a raw contact with a structured name and matching display name.
pub async fn add_person(store: &MemoryStore, given: &str, family: &str) -> i64 {
    let raw_id = store
        .insert_raw_contact(NewRawContact::new().with_display_name(&format!("{given} {family}")))
        .await;
    store
        .insert_data_row(raw_id, DataKind::StructuredName, Some(given), Some(family), false)
        .await;
    raw_id
}

pub async fn add_phone(store: &MemoryStore, raw_id: i64, number: &str) -> i64 {
    store
        .insert_data_row(raw_id, DataKind::Phone, None, Some(number), false)
        .await
}

pub async fn add_email(store: &MemoryStore, raw_id: i64, address: &str) -> i64 {
    store
        .insert_data_row(raw_id, DataKind::Email, None, Some(address), false)
        .await
}

pub async fn add_nickname(store: &MemoryStore, raw_id: i64, nick: &str) -> i64 {
    store
        .insert_data_row(raw_id, DataKind::Nickname, None, Some(nick), false)
        .await
}

pub async fn aggregate_id_of(store: &MemoryStore, raw_id: i64) -> Option<i64> {
    store.raw_contact(raw_id).await.unwrap().aggregate_id
}
