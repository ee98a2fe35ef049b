//! End-to-end: DT (domain-tag) identifier encoding through the public API.

use cascadedp::{CdpError, Dt, Id};

#[test]
fn word_and_acronym_round_trip_through_the_public_api() {
    let word = Id::word("hello world").unwrap();
    assert_eq!(word.decode_word().unwrap(), "hello world");

    let acronym = Id::acronym("NASA").unwrap();
    assert_eq!(acronym.decode_acronym().unwrap(), "NASA");
}

#[test]
fn word_encoding_rejects_too_long_or_all_uppercase_free_text() {
    assert_eq!(Id::word("this text is definitely too long"), Err(CdpError::InvalidName));
    assert_eq!(Id::word("ALL-CAPS-AND-DASHES"), Err(CdpError::InvalidName));
}

#[test]
fn numeric_ids_reject_values_past_the_payload_width() {
    let max = Id::numeric(cascadedp::ident::AUTOID_MAX).unwrap();
    assert!(max.payload() <= cascadedp::ident::AUTOID_MAX_VAL);
    assert_eq!(Id::numeric(u64::MAX), Err(CdpError::InvalidName));
}

#[test]
fn dt_compares_domain_first_then_tag() {
    let a = Dt::words("network", "zzz").unwrap();
    let b = Dt::words("system", "aaa").unwrap();
    assert_eq!(a.compare(&b), std::cmp::Ordering::Less);

    let same_domain_low = Dt::words("network", "aaa").unwrap();
    let same_domain_high = Dt::words("network", "zzz").unwrap();
    assert_eq!(same_domain_low.compare(&same_domain_high), std::cmp::Ordering::Less);
}

#[test]
fn autoid_sentinel_is_distinct_from_any_assignable_numeric_id() {
    assert!(Id::AUTOID.is_auto());
    let assigned = Id::numeric(cascadedp::ident::AUTOID_MAX).unwrap();
    assert!(!assigned.is_auto());
}
