//! Pro-rata allocation of revenue to property owners, and the per-owner
//! revenue grouping the fee pipeline consumes. Shares are computed
//! independently per owner and deliberately never renormalized; percentages
//! that do not sum to ~100 surface as a warning, not an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;

use crate::domain::{Money, Payment, PropertyOwnership, RevenueTotals};
use crate::error::Warning;

/// Allocation target: a real owner or the sentinel bucket for properties
/// with no recorded ownership rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OwnerKey {
    Owner(String),
    Unassigned,
}

impl OwnerKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner(id) => id.as_str(),
            Self::Unassigned => "unassigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    pub shares: BTreeMap<OwnerKey, Money>,
    pub warnings: Vec<Warning>,
}

/// Split `amount` across the owners of `property_id`. A `None` percent is
/// treated as 100. Shares may sum to more or less than the amount; that is
/// the caller's signal to reconcile, carried as `InconsistentOwnership`.
pub fn allocate(
    amount: Money,
    property_id: &str,
    ownerships: &[PropertyOwnership],
    tolerance: Decimal,
) -> AllocationResult {
    let rows = ownerships
        .iter()
        .filter(|row| row.property_id == property_id)
        .collect::<Vec<_>>();

    let mut shares: BTreeMap<OwnerKey, Money> = BTreeMap::new();
    let mut warnings = Vec::new();

    if rows.is_empty() {
        shares.insert(OwnerKey::Unassigned, amount);
        return AllocationResult { shares, warnings };
    }

    let mut percent_sum = Decimal::ZERO;
    for row in &rows {
        let percent = row.ownership_percent.unwrap_or(Decimal::ONE_HUNDRED);
        percent_sum += percent;
        let share = amount.amount * percent / Decimal::ONE_HUNDRED;
        let entry = shares
            .entry(OwnerKey::Owner(row.owner_id.clone()))
            .or_insert_with(|| Money::zero(amount.currency));
        entry.amount += share;
    }

    if (percent_sum - Decimal::ONE_HUNDRED).abs() > tolerance {
        warnings.push(Warning::InconsistentOwnership {
            property_id: property_id.to_string(),
            percent_sum,
        });
    }

    AllocationResult { shares, warnings }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevenueBreakdown {
    pub aggregate: RevenueTotals,
    pub per_owner: BTreeMap<OwnerKey, RevenueTotals>,
    pub warnings: Vec<Warning>,
}

/// Group window payments into aggregate and per-owner totals, split by
/// method class and currency. The aggregate counts each payment once at
/// face value; owner buckets hold allocated shares.
pub fn group_revenue(
    payments: &[Payment],
    ownerships: &[PropertyOwnership],
    tolerance: Decimal,
) -> RevenueBreakdown {
    let mut by_property: HashMap<&str, Vec<PropertyOwnership>> = HashMap::new();
    for row in ownerships {
        by_property
            .entry(row.property_id.as_str())
            .or_default()
            .push(row.clone());
    }

    let mut breakdown = RevenueBreakdown::default();
    let mut warned_properties: HashSet<String> = HashSet::new();
    let empty: Vec<PropertyOwnership> = Vec::new();

    for payment in payments {
        let class = payment.method.class();
        breakdown
            .aggregate
            .add(payment.amount, payment.currency, class);

        let rows = by_property
            .get(payment.property_id.as_str())
            .unwrap_or(&empty);
        let allocation = allocate(
            Money::new(payment.amount, payment.currency),
            &payment.property_id,
            rows,
            tolerance,
        );
        for (owner, share) in allocation.shares {
            breakdown
                .per_owner
                .entry(owner)
                .or_default()
                .add(share.amount, share.currency, class);
        }
        if !allocation.warnings.is_empty() && warned_properties.insert(payment.property_id.clone())
        {
            breakdown.warnings.extend(allocation.warnings);
        }
    }

    breakdown
}
