//! Database operations fed with provider-shaped payloads

use pretty_assertions::assert_eq;
use symbol_etl::models::{DealRecord, PriceRecord, Symbol};

use crate::common::{init_fresh_test_database, logging, test_data};

#[tokio::test]
async fn test_full_price_payload_roundtrips_through_store() {
    logging::init_test_logging();
    logging::log_test_step("Storing a complete provider price object");

    let db = init_fresh_test_database().await.expect("Failed to create test database");
    db.manager.upsert_symbol(&Symbol::new(42, "فملی")).await.unwrap();

    let record = PriceRecord::from_value(&test_data::price_json("1404-06-01", "12:29:59", 1000)).unwrap();
    db.manager.replace_symbol_data(42, &[record.clone()], &[]).await.unwrap();

    let stored = db.manager.get_price(42, "1404-06-01", "12:29:59").await.unwrap();
    assert_eq!(stored, Some(record));
}

#[tokio::test]
async fn test_deal_upsert_keyed_by_date() {
    let db = init_fresh_test_database().await.unwrap();

    let deals: Vec<DealRecord> = [120, 130]
        .iter()
        .map(|count| DealRecord::from_value(&test_data::deal_json("1404-06-01", *count)).unwrap())
        .collect();

    db.manager.replace_symbol_data(3, &[], &deals[..1]).await.unwrap();
    db.manager.replace_symbol_data(3, &[], &deals[1..]).await.unwrap();

    let stored = db.manager.get_deal(3, "1404-06-01").await.unwrap().unwrap();
    assert_eq!(stored.buy_count_i, Some(130));
    assert_eq!(stored.sell_n_value, Some(500_000_000));
    assert_eq!(db.manager.count_rows(3).await.unwrap(), (0, 1));
}

#[tokio::test]
async fn test_symbol_upsert_renames_in_place() {
    let db = init_fresh_test_database().await.unwrap();
    db.manager.upsert_symbol(&Symbol::new(20, "B")).await.unwrap();
    db.manager.upsert_symbol(&Symbol::new(20, "B2")).await.unwrap();

    assert_eq!(db.manager.get_symbols_ordered().await.unwrap(), vec![Symbol::new(20, "B2")]);
}
