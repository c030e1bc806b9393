//! Period report snapshots: the agency-wide manager report and one statement
//! per owner, persisted as immutable rows. Regeneration for the same period
//! is delete-then-insert; ids derive from the period key so a re-run over
//! identical source data reproduces identical rows.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{
    require_role, round2, CallerContext, CallerRole, ReportSnapshot, RevenueTotals,
};
use crate::error::{EngineError, EngineResult, Warning};
use crate::services::audit;
use crate::services::fees::compute_fee;
use crate::services::ownership::{group_revenue, OwnerKey};
use crate::services::rates::RateResolver;
use crate::storage::FinanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn validate(&self) -> EngineResult<()> {
        if self.start > self.end {
            return Err(EngineError::BadRequest(format!(
                "Invalid period: start {} is after end {}.",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Label the period by the month its start date falls in.
    pub fn month_label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReports {
    pub manager: ReportSnapshot,
    pub owners: Vec<ReportSnapshot>,
    pub warnings: Vec<Warning>,
}

pub struct ReportSnapshotService {
    store: Arc<dyn FinanceStore>,
    config: EngineConfig,
    rates: RateResolver,
}

impl ReportSnapshotService {
    pub fn new(store: Arc<dyn FinanceStore>, config: EngineConfig) -> Self {
        let rates = RateResolver::new(store.clone(), &config);
        Self {
            store,
            config,
            rates,
        }
    }

    /// Regenerate the full snapshot set for a period. Owners with no revenue
    /// in the window get no statement; the unassigned remainder only shows in
    /// the manager aggregate.
    pub async fn generate(
        &self,
        agency_id: &str,
        period: ReportPeriod,
        fee_percent: Option<Decimal>,
        caller: &CallerContext,
    ) -> EngineResult<GeneratedReports> {
        require_role(caller, &[CallerRole::Admin, CallerRole::Accountant])?;
        period.validate()?;
        let fee_percent = fee_percent.unwrap_or(self.config.default_fee_percent);
        if fee_percent < Decimal::ZERO || fee_percent > Decimal::ONE_HUNDRED {
            return Err(EngineError::BadRequest(format!(
                "Fee percent must be within 0..=100, got {fee_percent}."
            )));
        }

        let payments = self
            .store
            .list_payments_in_window(agency_id, period.start, period.end)
            .await?;
        let ownerships = self.store.list_ownerships(agency_id).await?;
        let rate = self
            .rates
            .resolve_period(agency_id, period.start, period.end, &payments)
            .await?;

        let breakdown = group_revenue(
            &payments,
            &ownerships,
            self.config.ownership_percent_tolerance,
        );
        let mut warnings = breakdown.warnings.clone();

        let (aggregate_fee, aggregate_warning) = compute_fee(
            breakdown.aggregate.usd_total(),
            breakdown.aggregate.dop_total(),
            rate,
            fee_percent,
            breakdown.aggregate.cash_dop,
        );
        warnings.extend(aggregate_warning);

        let manager = build_snapshot(
            agency_id,
            None,
            period,
            rate,
            fee_percent,
            &breakdown.aggregate,
            &aggregate_fee,
        );

        let mut owners = Vec::new();
        for (owner, totals) in &breakdown.per_owner {
            let OwnerKey::Owner(owner_id) = owner else {
                continue;
            };
            if totals.is_zero() {
                continue;
            }
            // The owner statement's fee can only be deducted from that
            // owner's own cash receipts.
            let (fee, _) = compute_fee(
                totals.usd_total(),
                totals.dop_total(),
                rate,
                fee_percent,
                totals.cash_dop,
            );
            owners.push(build_snapshot(
                agency_id,
                Some(owner_id.as_str()),
                period,
                rate,
                fee_percent,
                totals,
                &fee,
            ));
        }

        let deleted = self
            .store
            .delete_report_snapshots(agency_id, period.start, period.end)
            .await?;
        for stale in &deleted {
            self.store
                .append_activity(&audit::snapshot_activity("snapshot_deleted", stale))
                .await?;
        }

        let mut rows = Vec::with_capacity(owners.len() + 1);
        rows.push(manager.clone());
        rows.extend(owners.iter().cloned());
        self.store
            .insert_report_snapshots(&rows)
            .await
            .map_err(|err| {
                EngineError::Dependency(format!(
                    "Snapshot insert failed after prior rows were removed; regenerate the period to recover: {err}"
                ))
            })?;
        for row in &rows {
            self.store
                .append_activity(&audit::snapshot_activity("snapshot_created", row))
                .await?;
        }

        tracing::info!(
            agency_id,
            month = %period.month_label(),
            owners = owners.len(),
            replaced = deleted.len(),
            rate_missing = manager.rate_missing,
            "Report snapshots generated"
        );

        Ok(GeneratedReports {
            manager,
            owners,
            warnings,
        })
    }

    pub async fn list(
        &self,
        agency_id: &str,
        period: ReportPeriod,
    ) -> EngineResult<Vec<ReportSnapshot>> {
        period.validate()?;
        self.store
            .list_report_snapshots(agency_id, period.start, period.end)
            .await
    }

    pub async fn get(&self, agency_id: &str, snapshot_id: &str) -> EngineResult<ReportSnapshot> {
        self.store.get_report_snapshot(agency_id, snapshot_id).await
    }
}

/// Id derived from the snapshot key, so regenerating an unchanged period
/// yields rows that compare equal to the ones they replace.
fn snapshot_id(agency_id: &str, period: ReportPeriod, owner_id: Option<&str>) -> String {
    let key = format!(
        "{agency_id}:{}:{}:{}",
        period.start,
        period.end,
        owner_id.unwrap_or("manager")
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

fn build_snapshot(
    agency_id: &str,
    owner_id: Option<&str>,
    period: ReportPeriod,
    rate: Option<Decimal>,
    fee_percent: Decimal,
    totals: &RevenueTotals,
    fee: &crate::services::fees::FeeBreakdown,
) -> ReportSnapshot {
    let rounded = totals.rounded();
    ReportSnapshot {
        id: snapshot_id(agency_id, period, owner_id),
        agency_id: agency_id.to_string(),
        owner_id: owner_id.map(ToOwned::to_owned),
        month: period.month_label(),
        start_date: period.start,
        end_date: period.end,
        avg_rate: rate,
        fee_percent,
        cash_usd: rounded.cash_usd,
        cash_dop: rounded.cash_dop,
        transfer_usd: rounded.transfer_usd,
        transfer_dop: rounded.transfer_dop,
        usd_total: round2(totals.usd_total()),
        dop_total: round2(totals.dop_total()),
        fee_base: round2(fee.fee_base),
        fee_amount: round2(fee.fee_owed),
        fee_deducted: round2(fee.fee_deducted),
        balance_due: round2(fee.balance_due),
        rate_missing: rate.is_none(),
    }
}
