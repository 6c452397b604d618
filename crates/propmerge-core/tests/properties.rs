use std::collections::HashMap;

use chrono::NaiveDate;
use proptest::prelude::*;
use propmerge_core::{
    CodeSet, DateRange, ProposalId, RetainedProposal, SourceProposal, consolidate,
};

fn day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .and_then(|d| d.checked_add_days(chrono::Days::new(u64::from(offset))))
        .expect("offset within calendar")
}

fn range() -> impl Strategy<Value = DateRange> {
    (0u32..2000, proptest::option::of(0u32..1000))
        .prop_map(|(start, len)| DateRange::new(day(start), len.map(|l| day(start + l))))
}

fn codes(alphabet: &'static [&'static str]) -> impl Strategy<Value = CodeSet> {
    prop_oneof![
        1 => Just(CodeSet::MatchAll),
        6 => proptest::sample::subsequence(alphabet, 0..=alphabet.len())
            .prop_map(|picked| CodeSet::from_codes(picked)),
    ]
}

/// Snapshot with unique ids, a handful of groups and fingerprints.
fn snapshot(
    plans: impl Strategy<Value = CodeSet>,
) -> impl Strategy<Value = Vec<SourceProposal>> {
    proptest::collection::vec(
        (
            0u8..3,
            proptest::option::of(0u8..3),
            range(),
            range(),
            codes(&["DENTAL", "VISION", "LIFE"]),
            plans,
        ),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (group, fp, date_range, effective, products, plans))| {
                let fp = fp.map(|f| format!("fp-{f}"));
                SourceProposal::new(
                    format!("p-{i:03}"),
                    format!("G{group}"),
                    fp.as_deref(),
                    date_range,
                )
                .with_effective_range(effective)
                .with_product_codes(products)
                .with_plan_codes(plans)
            })
            .collect()
    })
}

fn any_plans() -> impl Strategy<Value = CodeSet> {
    codes(&["PLAN1", "PLAN2", "PLAN3"])
}

/// Plans that can never partially overlap, so runs only split on group and
/// fingerprint changes.
fn conflict_free_plans() -> impl Strategy<Value = CodeSet> {
    prop_oneof![Just(CodeSet::MatchAll), Just(CodeSet::default())]
}

proptest! {
    #[test]
    fn every_source_is_retained_or_consumed(input in snapshot(any_plans())) {
        let ids: Vec<ProposalId> = input.iter().map(|p| p.id.clone()).collect();
        let outcome = consolidate(input).unwrap();
        prop_assert!(outcome.check_partition(&ids).is_ok());
        prop_assert_eq!(outcome.retained.len() + outcome.consumed.len(), ids.len());
    }

    #[test]
    fn consumption_edges_are_flat(input in snapshot(any_plans())) {
        let outcome = consolidate(input).unwrap();
        for record in outcome.consumed.values() {
            prop_assert!(outcome.is_retained(&record.retained_id));
            prop_assert!(!outcome.consumed.contains_key(&record.retained_id));
        }
    }

    #[test]
    fn survivors_cover_what_they_absorbed(input in snapshot(any_plans())) {
        let by_id: HashMap<ProposalId, SourceProposal> =
            input.iter().map(|p| (p.id.clone(), p.clone())).collect();
        let outcome = consolidate(input).unwrap();
        let survivors: HashMap<&ProposalId, &RetainedProposal> =
            outcome.retained.iter().map(|r| (r.id(), r)).collect();

        for record in outcome.consumed.values() {
            let source = &by_id[&record.consumed_id];
            let survivor = &survivors[&record.retained_id].proposal;
            prop_assert_eq!(&source.group_id, &survivor.group_id);
            prop_assert_eq!(&source.split_config_fingerprint, &survivor.split_config_fingerprint);
            prop_assert!(survivor.date_range.covers(&source.date_range));
            prop_assert!(survivor.effective_date_range.covers(&source.effective_date_range));
        }
        for survivor in &outcome.retained {
            let seed = &by_id[survivor.id()];
            prop_assert!(survivor.proposal.date_range.covers(&seed.date_range));
            prop_assert_eq!(&survivor.proposal.attributes, &seed.attributes);
        }
    }

    #[test]
    fn rerun_without_conflicts_is_idempotent(input in snapshot(conflict_free_plans())) {
        let first = consolidate(input).unwrap();
        let again = consolidate(
            first.retained.iter().cloned().map(RetainedProposal::into_source).collect(),
        )
        .unwrap();
        prop_assert_eq!(&again.retained, &first.retained);
        prop_assert!(again.consumed.is_empty());
    }

    #[test]
    fn input_order_does_not_matter(input in snapshot(any_plans())) {
        let mut reversed = input.clone();
        reversed.reverse();
        let a = consolidate(input).unwrap();
        let b = consolidate(reversed).unwrap();
        prop_assert_eq!(a.retained, b.retained);
        prop_assert_eq!(a.consumed, b.consumed);
    }
}
