//! Rate resolution. A rate is DOP per USD; zero or absent means "unknown",
//! never "free", and an unknown rate propagates as "cannot convert". The
//! engine never silently assumes a rate of 1.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::domain::{Currency, ExchangeRateRecord, Payment};
use crate::error::EngineResult;
use crate::storage::FinanceStore;

/// The explicit rate a payment was entered with, if usable. Never overridden.
pub fn transaction_rate(payment: &Payment) -> Option<Decimal> {
    payment.exchange_rate.filter(|rate| *rate > Decimal::ZERO)
}

/// Convert between the two currencies at the given DOP-per-USD rate.
pub fn convert(amount: Decimal, from: Currency, to: Currency, rate: Decimal) -> Decimal {
    if from == to {
        return amount;
    }
    match from {
        Currency::Usd => amount * rate,
        Currency::Dop => amount / rate,
    }
}

/// Period rate: average of the explicit per-transaction rates observed in
/// the window, falling back to the historical-rate table average for the
/// same window, else unknown.
pub fn period_rate(payments: &[Payment], history: &[ExchangeRateRecord]) -> Option<Decimal> {
    let explicit = payments
        .iter()
        .filter_map(transaction_rate)
        .collect::<Vec<_>>();
    if let Some(avg) = average(&explicit) {
        return Some(avg);
    }
    let historical = history
        .iter()
        .map(|record| record.rate)
        .filter(|rate| *rate > Decimal::ZERO)
        .collect::<Vec<_>>();
    average(&historical)
}

fn average(rates: &[Decimal]) -> Option<Decimal> {
    if rates.is_empty() {
        return None;
    }
    let sum: Decimal = rates.iter().copied().sum();
    Some(sum / Decimal::from(rates.len() as u64))
}

/// Caches per-period resolution so repeated report reads within the TTL do
/// not refetch the historical table.
pub struct RateResolver {
    store: Arc<dyn FinanceStore>,
    cache: Cache<(String, NaiveDate, NaiveDate), Option<Decimal>>,
}

impl RateResolver {
    pub fn new(store: Arc<dyn FinanceStore>, config: &EngineConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.period_rate_cache_max_entries)
            .time_to_live(Duration::from_secs(config.period_rate_cache_ttl_seconds))
            .build();
        Self { store, cache }
    }

    /// Resolve the effective rate for a window. `payments` are the already
    /// fetched window payments; explicit rates found there always win and are
    /// never served from cache, so a re-run sees fresh source data. Only the
    /// history-table fallback (the one path that hits storage) is cached.
    pub async fn resolve_period(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        payments: &[Payment],
    ) -> EngineResult<Option<Decimal>> {
        let explicit = payments
            .iter()
            .filter_map(transaction_rate)
            .collect::<Vec<_>>();
        if let Some(avg) = average(&explicit) {
            return Ok(Some(avg));
        }

        let key = (agency_id.to_string(), start, end);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let history = self.store.list_rate_history(agency_id, start, end).await?;
        let historical = history
            .iter()
            .map(|record| record.rate)
            .filter(|rate| *rate > Decimal::ZERO)
            .collect::<Vec<_>>();
        let resolved = average(&historical);

        if resolved.is_none() {
            tracing::warn!(agency_id, %start, %end, "No usable exchange rate for period");
        }
        self.cache.insert(key, resolved).await;
        Ok(resolved)
    }
}
