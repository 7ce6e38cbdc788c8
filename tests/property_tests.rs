use emmo_ingest::{
    config::{CorrectionMode, IngestConfig},
    services::{PriceEvaluator, ReferenceCodeResolver},
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn money() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn positive_money() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn mode() -> impl Strategy<Value = CorrectionMode> {
    prop_oneof![
        Just(CorrectionMode::FlagOnly),
        Just(CorrectionMode::FloorToCost),
        Just(CorrectionMode::FloorToReferenceMedian),
    ]
}

proptest! {
    #[test]
    fn normalizing_twice_changes_nothing(
        raw in "\\PC{0,24}",
        supplier in proptest::option::of("\\PC{0,16}"),
        other in proptest::option::of("\\PC{0,16}"),
        k in 1usize..=8,
    ) {
        let mut config = IngestConfig::default();
        config.reference_code_prefix_len = k;
        let resolver = ReferenceCodeResolver::new(&config);

        let once = resolver.normalize(Some(&raw), supplier.as_deref());
        let twice = resolver.normalize(once.as_deref(), other.as_deref());
        prop_assert_eq!(&once, &twice);
        if let Some(code) = once {
            prop_assert!(resolver.is_canonical(&code));
        }
    }

    #[test]
    fn prefix_is_always_k_uppercase_letters(
        supplier in proptest::option::of("\\PC{0,32}"),
        k in 1usize..=8,
    ) {
        let mut config = IngestConfig::default();
        config.reference_code_prefix_len = k;
        let prefix = ReferenceCodeResolver::new(&config).supplier_prefix(supplier.as_deref());

        prop_assert_eq!(prefix.len(), k);
        prop_assert!(prefix.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_codes_are_deterministic_and_input_sensitive(
        supplier in "[A-Za-z ]{1,20}",
        first in "[a-z0-9 ]{1,30}",
        second in "[a-z0-9 ]{1,30}",
    ) {
        let resolver = ReferenceCodeResolver::new(&IngestConfig::default());
        let a = resolver.generate(Some(&supplier), Some(&first), Some("F-1"));
        let again = resolver.generate(Some(&supplier), Some(&first), Some("F-1"));
        prop_assert!(a.is_some());
        prop_assert_eq!(&a, &again);

        let b = resolver.generate(Some(&supplier), Some(&second), Some("F-1"));
        if first != second {
            prop_assert_ne!(a, b);
        }
    }

    #[test]
    fn corrections_never_lower_a_price(
        price in money(),
        cost in positive_money(),
        samples in proptest::collection::vec(positive_money(), 3..12),
        mode in mode(),
    ) {
        let evaluator = PriceEvaluator::new(&IngestConfig::default().with_correction_mode(mode));

        for decision in [
            evaluator.against_cost(price, cost),
            evaluator.against_history(price, &samples),
        ] {
            if let Some(adjusted) = decision.adjusted_price {
                prop_assert!(adjusted > price);
            }
        }
    }

    #[test]
    fn prices_at_or_above_the_floor_are_left_alone(
        cost in positive_money(),
        extra in money(),
        mode in mode(),
    ) {
        let evaluator = PriceEvaluator::new(&IngestConfig::default().with_correction_mode(mode));
        let floor = cost * Decimal::new(7, 1);

        prop_assert!(evaluator.against_cost(floor + extra, cost).is_noop());
        prop_assert!(evaluator
            .against_history(floor + extra, &[cost, cost, cost])
            .is_noop());
    }
}
