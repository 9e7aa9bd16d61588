//! Period filtering and numeric coercion over provider-shaped payloads

use pretty_assertions::assert_eq;
use serde_json::json;
use symbol_etl::models::{PeriodSpec, PriceRecord};
use symbol_etl::utils::filter_records;

use crate::common::test_data;

#[test]
fn test_year_prefix_filter_drops_other_years() {
    let kept = filter_records(test_data::mixed_year_prices(), &PeriodSpec::YearPrefix("1404".into()));

    let dates: Vec<&str> = kept.iter().filter_map(|r| r["date"].as_str()).collect();
    assert_eq!(dates, vec!["1404-01-05", "1404-06-01", "1404-06-02"]);
}

#[test]
fn test_month_filter_keeps_listed_months() {
    let period = PeriodSpec::year_months("1404", ["6"]).unwrap();
    let kept = filter_records(test_data::mixed_year_prices(), &period);

    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|r| r["date"].as_str().unwrap().starts_with("1404-06")));
}

#[test]
fn test_records_without_usable_date_are_dropped() {
    let records = vec![
        json!({"time": "12:00"}),
        json!({"date": null}),
        json!({"date": 14040601}),
        json!({"date": "1404-06-01"}),
    ];

    let kept = filter_records(records, &PeriodSpec::YearPrefix("1404".into()));
    assert_eq!(kept, vec![json!({"date": "1404-06-01"})]);
}

#[test]
fn test_price_record_from_provider_payload() {
    let record = PriceRecord::from_value(&json!({
        "date": "1404-06-01",
        "time": "12:29:59",
        "tno": 152,
        "tvol": "1250000",
        "pmin": "",
        "pmax": null,
        "py": "990.0",
        "plp": "-1.25",
        "pc": "abc",
        "pcp": 2
    }))
    .unwrap();

    assert_eq!(record.tno, Some(152));
    assert_eq!(record.tvol, Some(1_250_000));
    assert_eq!(record.pmin, None);
    assert_eq!(record.pmax, None);
    assert_eq!(record.py, Some(990));
    assert_eq!(record.plp, Some(-1.25));
    assert_eq!(record.pc, None);
    assert_eq!(record.pcp, Some(2.0));
    assert_eq!(record.tval, None);
}
