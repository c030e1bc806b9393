//! Management fee computation. The fee is assessed on a DOP-equivalent
//! revenue base and only ever deducted from DOP cash receipts. Transfers
//! settle separately, and USD receipts are never skimmed directly. Any
//! shortfall is carried as a standing balance owed by the revenue recipient.

use rust_decimal::Decimal;

use crate::error::Warning;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeBreakdown {
    /// DOP-equivalent revenue the fee percentage applies to.
    pub fee_base: Decimal,
    pub fee_owed: Decimal,
    /// Capped at the available DOP cash.
    pub fee_deducted: Decimal,
    /// `fee_owed - fee_deducted`, informational, not auto-collected.
    pub balance_due: Decimal,
}

/// One formula for both the whole-agency report and each owner statement;
/// the two agree when summed, modulo per-owner rounding.
///
/// An unknown rate makes the USD revenue contribute zero to the base, which
/// is a warning condition, not an error.
pub fn compute_fee(
    usd_total: Decimal,
    dop_total: Decimal,
    rate: Option<Decimal>,
    fee_percent: Decimal,
    available_cash_dop: Decimal,
) -> (FeeBreakdown, Option<Warning>) {
    let (usd_in_dop, warning) = match rate {
        Some(rate) if rate > Decimal::ZERO => (usd_total * rate, None),
        _ if usd_total.is_zero() => (Decimal::ZERO, None),
        _ => (
            Decimal::ZERO,
            Some(Warning::unknown_rate(
                "USD revenue excluded from fee base: no usable period rate",
            )),
        ),
    };

    let fee_base = usd_in_dop + dop_total;
    let fee_owed = fee_base * fee_percent / Decimal::ONE_HUNDRED;
    let fee_deducted = fee_owed.min(available_cash_dop).max(Decimal::ZERO);
    let balance_due = (fee_owed - fee_deducted).max(Decimal::ZERO);

    (
        FeeBreakdown {
            fee_base,
            fee_owed,
            fee_deducted,
            balance_due,
        },
        warning,
    )
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn mixed_currency_base_with_cash_shortfall() {
        // 10,000 DOP + 100 USD at 58 => base 15,800; 5% => 790 owed;
        // only 500 DOP cash available => 500 deducted, 290 carried.
        let (fee, warning) = compute_fee(
            dec!(100.00),
            dec!(10000.00),
            Some(dec!(58)),
            dec!(5),
            dec!(500.00),
        );
        assert!(warning.is_none());
        assert_eq!(fee.fee_base, dec!(15800.00));
        assert_eq!(fee.fee_owed, dec!(790.0000));
        assert_eq!(fee.fee_deducted, dec!(500.00));
        assert_eq!(fee.balance_due, dec!(290.0000));
    }

    #[test]
    fn unknown_rate_drops_usd_leg_with_warning() {
        let (fee, warning) = compute_fee(dec!(100), dec!(10000), None, dec!(5), dec!(10000));
        assert!(warning.is_some());
        assert_eq!(fee.fee_base, dec!(10000));
        assert_eq!(fee.fee_owed, dec!(500));
        assert_eq!(fee.fee_deducted, dec!(500));
        assert_eq!(fee.balance_due, dec!(0));
    }

    #[test]
    fn no_usd_revenue_needs_no_rate() {
        let (fee, warning) = compute_fee(dec!(0), dec!(2000), None, dec!(10), dec!(2000));
        assert!(warning.is_none());
        assert_eq!(fee.fee_base, dec!(2000));
        assert_eq!(fee.fee_owed, dec!(200.0));
    }

    #[test]
    fn deduction_never_exceeds_cash_or_owed() {
        for (cash, owed_cap) in [(dec!(0), dec!(0)), (dec!(100), dec!(100)), (dec!(10000), dec!(500))] {
            let (fee, _) = compute_fee(dec!(0), dec!(10000), None, dec!(5), cash);
            assert!(fee.fee_deducted <= cash);
            assert!(fee.fee_deducted <= fee.fee_owed);
            assert_eq!(fee.balance_due, fee.fee_owed - fee.fee_deducted);
            assert_eq!(fee.fee_deducted, owed_cap);
        }
    }

    #[test]
    fn per_owner_fees_sum_to_aggregate() {
        // 60/40 owner bases recombine to the aggregate fee exactly when no
        // rounding is applied mid-computation.
        let rate = Some(dec!(58));
        let (aggregate, _) = compute_fee(dec!(100), dec!(10000), rate, dec!(5), dec!(100000));
        let (owner_a, _) = compute_fee(dec!(60), dec!(6000), rate, dec!(5), dec!(100000));
        let (owner_b, _) = compute_fee(dec!(40), dec!(4000), rate, dec!(5), dec!(100000));
        assert_eq!(owner_a.fee_owed + owner_b.fee_owed, aggregate.fee_owed);
        assert_eq!(owner_a.fee_base + owner_b.fee_base, aggregate.fee_base);
    }
}
