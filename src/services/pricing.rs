//! Price plausibility evaluation.
//!
//! A price is judged against the master's unit cost when one is known, and
//! otherwise against the median of recent observations for the same code.
//! The first applicable rule wins; missing data yields a no-op decision.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::{CorrectionMode, IngestConfig};
use crate::entities::{invoice_line, product_master, PriceFlag};
use crate::errors::ServiceError;

const COST_BASELINE: &str = "coste_unitario";
const MEDIAN_BASELINE: &str = "reference_median";

/// Read-only access to the price-observation ledger.
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Up to `limit` most recent observed prices for `reference_code`, newest first.
    async fn recent_prices(
        &self,
        reference_code: &str,
        limit: u64,
    ) -> Result<Vec<Decimal>, ServiceError>;
}

/// What the evaluator decided for one line. All-`None` means leave it alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PriceDecision {
    pub flag: Option<PriceFlag>,
    pub reason: Option<String>,
    pub adjusted_price: Option<Decimal>,
}

impl PriceDecision {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.flag.is_none() && self.adjusted_price.is_none()
    }

    /// Price that should feed the master's cost: the corrected value, nothing
    /// when the price was only flagged, otherwise the observed one.
    pub fn effective_price(&self, observed: Option<Decimal>) -> Option<Decimal> {
        match self.flag {
            Some(PriceFlag::TooLow) => None,
            Some(_) => self.adjusted_price.or(observed),
            None => observed,
        }
    }
}

/// The price-relevant slice of an invoice line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PricedLine {
    pub reference_code: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub price_flag: Option<PriceFlag>,
    pub price_flag_reason: Option<String>,
}

impl From<&invoice_line::Model> for PricedLine {
    fn from(line: &invoice_line::Model) -> Self {
        Self {
            reference_code: line.reference_code.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
            price_flag: line.price_flag,
            price_flag_reason: line.price_flag_reason.clone(),
        }
    }
}

/// Applies the plausibility rules for one [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct PriceEvaluator {
    min_ratio: Decimal,
    ratio_label: String,
    mode: CorrectionMode,
    history_min_samples: usize,
    history_lookback: u64,
}

impl PriceEvaluator {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            min_ratio: Decimal::from_f64(config.min_ratio).unwrap_or(dec!(0.7)),
            ratio_label: ratio_label(config.min_ratio),
            mode: config.correction_mode,
            history_min_samples: config.history_min_samples,
            history_lookback: config.history_lookback,
        }
    }

    /// Runs the cost rule, then the history rule. History is only fetched
    /// when the cost rule does not apply.
    #[instrument(skip(self, line, master, history), fields(reference_code = ?line.reference_code))]
    pub async fn evaluate(
        &self,
        line: &PricedLine,
        master: Option<&product_master::Model>,
        history: &dyn PriceHistory,
    ) -> Result<PriceDecision, ServiceError> {
        let (Some(price), Some(code)) = (line.unit_price, line.reference_code.as_deref()) else {
            return Ok(PriceDecision::noop());
        };

        if let Some(cost) = master.and_then(|m| m.unit_cost) {
            return Ok(self.against_cost(price, cost));
        }

        let samples = history.recent_prices(code, self.history_lookback).await?;
        debug!(samples = samples.len(), "Loaded price history");
        Ok(self.against_history(price, &samples))
    }

    /// Rule 2: judge `price` against an authoritative unit cost.
    pub fn against_cost(&self, price: Decimal, cost: Decimal) -> PriceDecision {
        let floor = cost * self.min_ratio;
        if price >= floor {
            return PriceDecision::noop();
        }

        let reason = Some(self.reason(COST_BASELINE));
        match self.mode {
            CorrectionMode::FloorToCost => PriceDecision {
                flag: Some(PriceFlag::CorrectedToCost),
                reason,
                adjusted_price: Some(cost),
            },
            _ => PriceDecision {
                flag: Some(PriceFlag::TooLow),
                reason,
                adjusted_price: None,
            },
        }
    }

    /// Rule 3: judge `price` against the median of `samples`.
    pub fn against_history(&self, price: Decimal, samples: &[Decimal]) -> PriceDecision {
        if samples.len() < self.history_min_samples {
            return PriceDecision::noop();
        }
        let Some(reference) = median(samples) else {
            return PriceDecision::noop();
        };

        let floor = reference * self.min_ratio;
        if price >= floor {
            return PriceDecision::noop();
        }

        let reason = Some(self.reason(MEDIAN_BASELINE));
        match self.mode {
            CorrectionMode::FloorToReferenceMedian => PriceDecision {
                flag: Some(PriceFlag::CorrectedToReferenceMedian),
                reason,
                adjusted_price: Some(reference),
            },
            _ => PriceDecision {
                flag: Some(PriceFlag::TooLow),
                reason,
                adjusted_price: None,
            },
        }
    }

    fn reason(&self, baseline: &str) -> String {
        format!("below_{}_of_{}", self.ratio_label, baseline)
    }
}

/// Renders the ratio the way it appears in flag reasons: `0.7`, `1.0`.
fn ratio_label(ratio: f64) -> String {
    if ratio.fract() == 0.0 {
        format!("{:.1}", ratio)
    } else {
        ratio.to_string()
    }
}

/// Median of `values`; the mean of the two middle values for even counts.
pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let (low, high) = (sorted[mid - 1], sorted[mid]);
        Some(match low.checked_add(high) {
            Some(sum) => sum / Decimal::TWO,
            None => low + (high - low) / Decimal::TWO,
        })
    }
}

/// Writes a decision onto a line. A flag overwrites flag and reason; an
/// adjusted price overwrites the price and, with a known quantity, the total.
/// A total that would overflow is cleared.
pub fn apply_price_decision(line: &mut PricedLine, decision: &PriceDecision) {
    if let Some(flag) = decision.flag {
        line.price_flag = Some(flag);
        line.price_flag_reason = decision.reason.clone();
    }
    if let Some(adjusted) = decision.adjusted_price {
        line.unit_price = Some(adjusted);
        if let Some(quantity) = line.quantity {
            line.line_total = adjusted.checked_mul(quantity);
        }
    }
}

/// Evaluates `line` and applies the outcome to it in one step.
pub async fn evaluate_and_apply_price(
    line: &mut PricedLine,
    master: Option<&product_master::Model>,
    history: &dyn PriceHistory,
    config: &IngestConfig,
) -> Result<PriceDecision, ServiceError> {
    let decision = PriceEvaluator::new(config)
        .evaluate(line, master, history)
        .await?;
    apply_price_decision(line, &decision);
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedHistory {
        prices: Vec<Decimal>,
        calls: AtomicUsize,
    }

    impl FixedHistory {
        fn new(prices: Vec<Decimal>) -> Self {
            Self {
                prices,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceHistory for FixedHistory {
        async fn recent_prices(
            &self,
            _reference_code: &str,
            limit: u64,
        ) -> Result<Vec<Decimal>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.prices.iter().copied().take(limit as usize).collect())
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl PriceHistory for BrokenHistory {
        async fn recent_prices(&self, _: &str, _: u64) -> Result<Vec<Decimal>, ServiceError> {
            Err(ServiceError::database_error_message("ledger offline"))
        }
    }

    fn master_with_cost(cost: Option<Decimal>) -> product_master::Model {
        let now = Utc::now();
        product_master::Model {
            reference_code: "PRO_XYZ".into(),
            ean: None,
            description: None,
            size: None,
            colour: None,
            family: None,
            brand: None,
            season: None,
            material: None,
            quantity_on_hand: None,
            unit_cost: cost,
            retail_price: None,
            outlet_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(price: Option<Decimal>, quantity: Option<Decimal>) -> PricedLine {
        PricedLine {
            reference_code: Some("PRO_XYZ".into()),
            quantity,
            unit_price: price,
            line_total: match (price, quantity) {
                (Some(p), Some(q)) => Some(p * q),
                _ => None,
            },
            ..Default::default()
        }
    }

    fn config(mode: CorrectionMode) -> IngestConfig {
        IngestConfig::default().with_correction_mode(mode)
    }

    #[tokio::test]
    async fn cost_floor_correction() {
        let cfg = config(CorrectionMode::FloorToCost);
        let master = master_with_cost(Some(dec!(10.0)));
        let history = FixedHistory::new(vec![]);
        let mut l = line(Some(dec!(1.0)), Some(dec!(1)));

        let decision = evaluate_and_apply_price(&mut l, Some(&master), &history, &cfg)
            .await
            .unwrap();

        assert_eq!(decision.flag, Some(PriceFlag::CorrectedToCost));
        assert_eq!(decision.reason.as_deref(), Some("below_0.7_of_coste_unitario"));
        assert_eq!(decision.adjusted_price, Some(dec!(10.0)));
        assert_eq!(l.unit_price, Some(dec!(10.0)));
        assert_eq!(l.line_total, Some(dec!(10.0)));
        assert_eq!(l.price_flag, Some(PriceFlag::CorrectedToCost));
        assert_eq!(history.calls(), 0);
    }

    #[tokio::test]
    async fn history_flag_only() {
        let cfg = config(CorrectionMode::FlagOnly);
        let history = FixedHistory::new(vec![dec!(9.0), dec!(10.0), dec!(11.0)]);
        let mut l = line(Some(dec!(5.0)), Some(dec!(2)));

        let decision = evaluate_and_apply_price(&mut l, None, &history, &cfg)
            .await
            .unwrap();

        assert_eq!(decision.flag, Some(PriceFlag::TooLow));
        assert_eq!(
            decision.reason.as_deref(),
            Some("below_0.7_of_reference_median")
        );
        assert_eq!(decision.adjusted_price, None);
        assert_eq!(l.unit_price, Some(dec!(5.0)));
        assert_eq!(l.line_total, Some(dec!(10.0)));
        assert_eq!(l.price_flag, Some(PriceFlag::TooLow));
    }

    #[tokio::test]
    async fn history_correction_recomputes_total() {
        let cfg = config(CorrectionMode::FloorToReferenceMedian);
        let history = FixedHistory::new(vec![dec!(9.0), dec!(10.0), dec!(11.0)]);
        let mut l = line(Some(dec!(5.0)), Some(dec!(3)));

        let decision = evaluate_and_apply_price(&mut l, None, &history, &cfg)
            .await
            .unwrap();

        assert_eq!(decision.flag, Some(PriceFlag::CorrectedToReferenceMedian));
        assert_eq!(l.unit_price, Some(dec!(10.0)));
        assert_eq!(l.line_total, Some(dec!(30.0)));
    }

    #[tokio::test]
    async fn master_without_cost_falls_through_to_history() {
        let cfg = config(CorrectionMode::FlagOnly);
        let master = master_with_cost(None);
        let history = FixedHistory::new(vec![dec!(10), dec!(10), dec!(10)]);
        let l = line(Some(dec!(1)), None);

        let decision = PriceEvaluator::new(&cfg)
            .evaluate(&l, Some(&master), &history)
            .await
            .unwrap();

        assert_eq!(decision.flag, Some(PriceFlag::TooLow));
        assert_eq!(history.calls(), 1);
    }

    #[tokio::test]
    async fn insufficient_samples_are_silent() {
        let cfg = config(CorrectionMode::FloorToReferenceMedian);
        let history = FixedHistory::new(vec![dec!(100), dec!(100)]);
        let mut l = line(Some(dec!(1)), Some(dec!(1)));
        let before = l.clone();

        let decision = evaluate_and_apply_price(&mut l, None, &history, &cfg)
            .await
            .unwrap();

        assert!(decision.is_noop());
        assert_eq!(l, before);
    }

    #[tokio::test]
    async fn missing_price_or_code_is_noop() {
        let cfg = config(CorrectionMode::FloorToCost);
        let master = master_with_cost(Some(dec!(10)));
        let history = FixedHistory::new(vec![]);
        let evaluator = PriceEvaluator::new(&cfg);

        let no_price = line(None, Some(dec!(1)));
        assert!(evaluator
            .evaluate(&no_price, Some(&master), &history)
            .await
            .unwrap()
            .is_noop());

        let mut no_code = line(Some(dec!(1)), Some(dec!(1)));
        no_code.reference_code = None;
        assert!(evaluator
            .evaluate(&no_code, Some(&master), &history)
            .await
            .unwrap()
            .is_noop());
        assert_eq!(history.calls(), 0);
    }

    #[tokio::test]
    async fn lookback_limits_history_window() {
        let mut cfg = config(CorrectionMode::FlagOnly);
        cfg.history_lookback = 3;
        // Newest three are cheap; older samples would push the median up.
        let history = FixedHistory::new(vec![
            dec!(4),
            dec!(4),
            dec!(4),
            dec!(100),
            dec!(100),
            dec!(100),
            dec!(100),
        ]);
        let l = line(Some(dec!(3)), None);

        let decision = PriceEvaluator::new(&cfg)
            .evaluate(&l, None, &history)
            .await
            .unwrap();
        assert!(decision.is_noop());
    }

    #[tokio::test]
    async fn history_errors_propagate() {
        let cfg = IngestConfig::default();
        let l = line(Some(dec!(3)), None);
        let result = PriceEvaluator::new(&cfg)
            .evaluate(&l, None, &BrokenHistory)
            .await;
        assert!(matches!(result, Err(ServiceError::DatabaseError(_))));
    }

    #[rstest]
    #[case(CorrectionMode::FlagOnly, dec!(6.99), Some(PriceFlag::TooLow), None)]
    #[case(CorrectionMode::FlagOnly, dec!(7.00), None, None)]
    #[case(CorrectionMode::FloorToCost, dec!(6.99), Some(PriceFlag::CorrectedToCost), Some(dec!(10)))]
    #[case(CorrectionMode::FloorToCost, dec!(25), None, None)]
    #[case(CorrectionMode::FloorToReferenceMedian, dec!(1), Some(PriceFlag::TooLow), None)]
    fn cost_rule_matrix(
        #[case] mode: CorrectionMode,
        #[case] price: Decimal,
        #[case] flag: Option<PriceFlag>,
        #[case] adjusted: Option<Decimal>,
    ) {
        let decision = PriceEvaluator::new(&config(mode)).against_cost(price, dec!(10));
        assert_eq!(decision.flag, flag);
        assert_eq!(decision.adjusted_price, adjusted);
    }

    #[rstest]
    #[case(vec![dec!(9), dec!(10), dec!(11)], Some(dec!(10)))]
    #[case(vec![dec!(10), dec!(9)], Some(dec!(9.5)))]
    #[case(vec![dec!(11), dec!(3), dec!(7), dec!(5)], Some(dec!(6)))]
    #[case(vec![dec!(4.2)], Some(dec!(4.2)))]
    #[case(vec![], None)]
    #[case(vec![Decimal::MAX, Decimal::MAX], Some(Decimal::MAX))]
    #[case(vec![Decimal::MAX - dec!(2), Decimal::MAX], Some(Decimal::MAX - dec!(1)))]
    fn median_cases(#[case] values: Vec<Decimal>, #[case] expected: Option<Decimal>) {
        assert_eq!(median(&values), expected);
    }

    #[test]
    fn reason_uses_configured_ratio() {
        let mut cfg = config(CorrectionMode::FlagOnly);
        cfg.min_ratio = 1.0;
        let decision = PriceEvaluator::new(&cfg).against_cost(dec!(9), dec!(10));
        assert_eq!(decision.reason.as_deref(), Some("below_1.0_of_coste_unitario"));

        cfg.min_ratio = 0.55;
        let decision = PriceEvaluator::new(&cfg).against_cost(dec!(1), dec!(10));
        assert_eq!(decision.reason.as_deref(), Some("below_0.55_of_coste_unitario"));
    }

    #[test]
    fn overflowing_total_is_cleared() {
        let mut priced = line(Some(dec!(1)), Some(Decimal::MAX));
        let decision = PriceDecision {
            flag: Some(PriceFlag::CorrectedToCost),
            reason: Some("x".into()),
            adjusted_price: Some(dec!(10)),
        };
        apply_price_decision(&mut priced, &decision);
        assert_eq!(priced.unit_price, Some(dec!(10)));
        assert_eq!(priced.line_total, None);
    }

    #[test]
    fn effective_price_follows_decision() {
        let observed = Some(dec!(2));
        assert_eq!(PriceDecision::noop().effective_price(observed), observed);

        let flagged = PriceDecision {
            flag: Some(PriceFlag::TooLow),
            reason: Some("x".into()),
            adjusted_price: None,
        };
        assert_eq!(flagged.effective_price(observed), None);

        let corrected = PriceDecision {
            flag: Some(PriceFlag::CorrectedToCost),
            reason: Some("x".into()),
            adjusted_price: Some(dec!(10)),
        };
        assert_eq!(corrected.effective_price(observed), Some(dec!(10)));
    }
}
