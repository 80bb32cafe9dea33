//! Property tests for the truthfulness contract.
//!
//! Whatever combination of fields a caller supplies, `Attribute::verified`
//! either rejects it or returns an attribute whose value is backed by a
//! source URL and an evidence hash that matches its content.

use chrono::{TimeZone, Utc};
use parostok_provenance::{Attribute, AttributeValue, EvidenceHash, ProvenanceError};
use proptest::prelude::*;

fn value_strategy() -> impl Strategy<Value = Option<AttributeValue>> {
    prop_oneof![
        Just(None),
        any::<i64>().prop_map(|i| Some(AttributeValue::Integer(i))),
        "[a-zа-я0-9 ]{0,12}".prop_map(|s| Some(AttributeValue::Text(s))),
    ]
}

fn opt_text() -> impl Strategy<Value = Option<String>> {
    prop_oneof![Just(None), "[ a-z:0-9]{0,16}".prop_map(Some)]
}

fn attribute_strategy() -> impl Strategy<Value = Attribute> {
    (
        "[a-z_.]{0,8}",
        value_strategy(),
        opt_text(),
        opt_text(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(key, value, source_url, evidence, with_hash, honest)| {
            let evidence_hash = if with_hash {
                if honest {
                    Some(EvidenceHash::compute(value.as_ref(), evidence.as_deref()))
                } else {
                    Some(EvidenceHash::compute(None, Some("forged")))
                }
            } else {
                None
            };
            Attribute {
                key,
                value,
                source_url,
                evidence,
                evidence_hash,
                selector: None,
                extracted_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            }
        })
}

proptest! {
    #[test]
    fn verified_attributes_are_truthful(attr in attribute_strategy()) {
        if let Ok(ok) = attr.verified() {
            prop_assert!(ok.is_truthful());
            if ok.value.is_some() {
                prop_assert!(ok.source_url.as_deref().is_some_and(|u| !u.trim().is_empty()));
                prop_assert_eq!(
                    ok.evidence_hash,
                    Some(EvidenceHash::compute(ok.value.as_ref(), ok.evidence.as_deref()))
                );
            }
        }
    }

    #[test]
    fn stale_hash_after_mutation_is_rejected(
        original in "[a-z0-9]{1,10}",
        replacement in "[a-z0-9]{1,10}",
    ) {
        prop_assume!(original != replacement);
        let mut attr = Attribute::observed(
            "grain_type",
            original.as_str(),
            "https://example.test/p",
            format!("Тип зерна: {original}"),
            Utc::now(),
        );
        attr.evidence = Some(format!("Тип зерна: {replacement}"));
        let is_mismatch = matches!(
            attr.clone().verified(),
            Err(ProvenanceError::HashMismatch { .. })
        );
        prop_assert!(is_mismatch);

        attr.evidence_hash = attr.recompute_hash();
        prop_assert!(attr.verified().is_ok());
    }
}
