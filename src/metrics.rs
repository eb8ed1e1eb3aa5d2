use crate::narrative::NarrativeFields;
use crate::overrides::{keys, Overrides};
use crate::schema::{rent_gap_pct, MetricsResult, RentRollSummary, T12Summary};
use crate::utils::safe_div;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const IRR_TOLERANCE: f64 = 1e-10;
const IRR_MAX_NEWTON_STEPS: usize = 100;
const IRR_MAX_BISECTION_STEPS: usize = 200;
const IRR_LOWER_BOUND: f64 = -0.9999;
const IRR_UPPER_BOUND: f64 = 10.0;

/// Longest holding period the IRR projection accepts.
pub const MAX_HOLD_YEARS: u32 = 50;

/// Stand-ins used when the caller does not supply deal terms.
///
/// They keep the metrics computable from partial inputs; they are not a
/// valuation. Supply real values through [`Overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Assumptions {
    #[schemars(description = "Purchase price assumed when NOI is known but no price was supplied (roughly a 7.5% cap).")]
    pub placeholder_purchase_price: f64,
    #[schemars(description = "Annual debt service as a fraction of purchase price.")]
    pub debt_service_ratio: f64,
    #[schemars(description = "Equity invested as a fraction of purchase price.")]
    pub equity_ratio: f64,
    pub noi_growth_rate: f64,
    pub hold_years: u32,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            placeholder_purchase_price: 5_000_000.0,
            debt_service_ratio: 0.05,
            equity_ratio: 0.25,
            noi_growth_rate: 0.02,
            hold_years: 5,
        }
    }
}

/// Computes underwriting metrics with the default [`Assumptions`].
pub fn compute_metrics(
    t12: &T12Summary,
    rent_roll: &RentRollSummary,
    narrative: &NarrativeFields,
    overrides: &Overrides,
) -> MetricsResult {
    compute_metrics_with(t12, rent_roll, narrative, overrides, &Assumptions::default())
}

/// Every input resolves as `override > extracted`; every ratio goes through
/// [`safe_div`], so the result never carries NaN or infinity.
pub fn compute_metrics_with(
    t12: &T12Summary,
    rent_roll: &RentRollSummary,
    narrative: &NarrativeFields,
    overrides: &Overrides,
    assumptions: &Assumptions,
) -> MetricsResult {
    let noi = overrides.resolve(keys::NET_OPERATING_INCOME, t12.net_operating_income);
    let egi = overrides.resolve(keys::EFFECTIVE_GROSS_INCOME, t12.effective_gross_income);
    let opex = overrides.resolve(keys::OPERATING_EXPENSES, t12.operating_expenses);

    let current_rent_total = overrides.resolve(keys::CURRENT_RENT_TOTAL, rent_roll.current_rent_total);
    let market_rent_total = overrides.resolve(keys::MARKET_RENT_TOTAL, rent_roll.market_rent_total);

    let rent_gap = overrides
        .resolve(keys::RENT_GAP_PCT, rent_roll.rent_gap_pct)
        .or_else(|| match (current_rent_total, market_rent_total) {
            (Some(current), Some(market)) => rent_gap_pct(current, market),
            _ => None,
        });

    let sqft = overrides.resolve(keys::TOTAL_BUILDING_SQFT, narrative.total_building_sqft);
    let units = overrides.resolve(
        keys::TOTAL_UNITS,
        narrative
            .total_units_or_suites
            .or(rent_roll.total_units.map(|u| u as f64)),
    );

    let purchase_price = overrides.number(keys::PURCHASE_PRICE).or_else(|| {
        noi.map(|_| {
            debug!(
                "No purchase price supplied; assuming {}",
                assumptions.placeholder_purchase_price
            );
            assumptions.placeholder_purchase_price
        })
    });
    let annual_debt_service = overrides
        .number(keys::ANNUAL_DEBT_SERVICE)
        .or_else(|| purchase_price.map(|p| p * assumptions.debt_service_ratio));
    let equity_invested = overrides
        .number(keys::EQUITY_INVESTED)
        .or_else(|| purchase_price.map(|p| p * assumptions.equity_ratio));

    let levered_cash_flow = match (noi, annual_debt_service) {
        (Some(noi), Some(debt)) => Some(noi - debt),
        _ => None,
    };

    let break_even_occupancy = if opex.is_none() && annual_debt_service.is_none() {
        None
    } else {
        safe_div(
            Some(opex.unwrap_or(0.0) + annual_debt_service.unwrap_or(0.0)),
            egi,
        )
    };

    let irr_5yr = levered_cash_flow.and_then(|base| {
        if !(1..=MAX_HOLD_YEARS).contains(&assumptions.hold_years) {
            debug!("Skipping IRR for hold of {} years", assumptions.hold_years);
            return None;
        }
        let outlay = equity_invested.or(purchase_price)?;
        let flows = projected_cash_flows(outlay, base, assumptions);
        compute_irr(&flows).map(|irr| irr * 100.0)
    });

    MetricsResult {
        cap_rate: safe_div(noi, purchase_price),
        dscr: safe_div(noi, annual_debt_service),
        coc_return: safe_div(levered_cash_flow, equity_invested),
        irr_5yr,
        rent_gap_pct: rent_gap,
        price_per_sqft: safe_div(purchase_price, sqft),
        price_per_unit: safe_div(purchase_price, units),
        break_even_occupancy,
        current_rent_total,
        market_rent_total,
        purchase_price,
    }
    .sanitized()
}

/// Year 0 is the equity outlay; years 1..=hold grow the base cash flow.
fn projected_cash_flows(outlay: f64, base: f64, assumptions: &Assumptions) -> Vec<f64> {
    let growth = 1.0 + assumptions.noi_growth_rate;
    std::iter::once(-outlay)
        .chain((1..=assumptions.hold_years).map(|year| base * growth.powi(year as i32)))
        .collect()
}

fn npv(rate: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / (1.0 + rate).powi(t as i32))
        .sum()
}

fn npv_derivative(rate: f64, flows: &[f64]) -> f64 {
    flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(t, cf)| -(t as f64) * cf / (1.0 + rate).powi(t as i32 + 1))
        .sum()
}

/// Internal rate of return as a fraction (0.1 == 10%).
///
/// Newton's method from 10%, falling back to bisection over
/// `(-99.99%, 1000%]`. `None` when the flows never change sign or no root
/// is found.
pub fn compute_irr(flows: &[f64]) -> Option<f64> {
    if flows.len() < 2 || flows.iter().any(|cf| !cf.is_finite()) {
        return None;
    }
    let has_outflow = flows.iter().any(|cf| *cf < 0.0);
    let has_inflow = flows.iter().any(|cf| *cf > 0.0);
    if !(has_outflow && has_inflow) {
        return None;
    }

    let mut rate = 0.1;
    for _ in 0..IRR_MAX_NEWTON_STEPS {
        let value = npv(rate, flows);
        if value.abs() < IRR_TOLERANCE {
            return Some(rate);
        }
        let slope = npv_derivative(rate, flows);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            break;
        }
        if (next - rate).abs() < IRR_TOLERANCE {
            return Some(next);
        }
        rate = next;
    }

    debug!("IRR Newton iteration did not converge, bisecting");
    bisect_irr(flows)
}

fn bisect_irr(flows: &[f64]) -> Option<f64> {
    let (mut lo, mut hi) = (IRR_LOWER_BOUND, IRR_UPPER_BOUND);
    let mut npv_lo = npv(lo, flows);
    let npv_hi = npv(hi, flows);
    if !npv_lo.is_finite() || !npv_hi.is_finite() || npv_lo.signum() == npv_hi.signum() {
        return None;
    }

    for _ in 0..IRR_MAX_BISECTION_STEPS {
        let mid = (lo + hi) / 2.0;
        let npv_mid = npv(mid, flows);
        if npv_mid.abs() < IRR_TOLERANCE || (hi - lo) / 2.0 < IRR_TOLERANCE {
            return Some(mid);
        }
        if npv_mid.signum() == npv_lo.signum() {
            lo = mid;
            npv_lo = npv_mid;
        } else {
            hi = mid;
        }
    }
    None
}
