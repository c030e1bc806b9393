//! In-memory [`FinanceStore`] used by the test suite and by embedders that
//! supply records directly instead of wiring a database.

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::domain::{
    ActivityLogEntry, ExchangeRateRecord, Invoice, InvoiceStatus, Payment, PropertyOwnership,
    ReportSnapshot,
};
use crate::error::{EngineError, EngineResult};
use crate::storage::FinanceStore;

#[derive(Debug, Default)]
struct Inner {
    invoices: Vec<Invoice>,
    payments: Vec<Payment>,
    ownerships: Vec<PropertyOwnership>,
    rates: Vec<ExchangeRateRecord>,
    snapshots: Vec<ReportSnapshot>,
    activity: Vec<ActivityLogEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an invoice. Nested payments are moved into the shared payment
    /// pool so reads stitch them back consistently.
    pub async fn seed_invoice(&self, mut invoice: Invoice) {
        let mut inner = self.inner.write().await;
        inner.payments.append(&mut invoice.payments);
        inner.invoices.push(invoice);
    }

    pub async fn seed_payment(&self, payment: Payment) {
        self.inner.write().await.payments.push(payment);
    }

    pub async fn seed_ownership(&self, ownership: PropertyOwnership) {
        self.inner.write().await.ownerships.push(ownership);
    }

    pub async fn seed_rate(&self, rate: ExchangeRateRecord) {
        self.inner.write().await.rates.push(rate);
    }

    pub async fn activity_entries(&self) -> Vec<ActivityLogEntry> {
        self.inner.read().await.activity.clone()
    }

    pub async fn payment_rows(&self) -> Vec<Payment> {
        self.inner.read().await.payments.clone()
    }

    fn stitch(inner: &Inner, invoice: &Invoice) -> Invoice {
        let mut stitched = invoice.clone();
        stitched.payments = inner
            .payments
            .iter()
            .filter(|payment| payment.invoice_id.as_deref() == Some(invoice.id.as_str()))
            .cloned()
            .collect();
        stitched
    }
}

#[async_trait]
impl FinanceStore for MemoryStore {
    async fn find_invoices(
        &self,
        agency_id: &str,
        invoice_ids: &[String],
    ) -> EngineResult<Vec<Invoice>> {
        let inner = self.inner.read().await;
        Ok(inner
            .invoices
            .iter()
            .filter(|invoice| invoice.agency_id == agency_id && invoice_ids.contains(&invoice.id))
            .map(|invoice| Self::stitch(&inner, invoice))
            .collect())
    }

    async fn list_invoices(&self, agency_id: &str) -> EngineResult<Vec<Invoice>> {
        let inner = self.inner.read().await;
        Ok(inner
            .invoices
            .iter()
            .filter(|invoice| invoice.agency_id == agency_id)
            .map(|invoice| Self::stitch(&inner, invoice))
            .collect())
    }

    async fn list_payments_in_window(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .iter()
            .filter(|payment| {
                payment.agency_id == agency_id
                    && payment.received_date >= start
                    && payment.received_date <= end
            })
            .cloned()
            .collect())
    }

    async fn list_ownerships(&self, agency_id: &str) -> EngineResult<Vec<PropertyOwnership>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ownerships
            .iter()
            .filter(|row| row.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn list_rate_history(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ExchangeRateRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rates
            .iter()
            .filter(|record| {
                record.agency_id == agency_id
                    && record.rate_date >= start
                    && record.rate_date <= end
            })
            .cloned()
            .collect())
    }

    async fn insert_payments(&self, agency_id: &str, rows: &[Payment]) -> EngineResult<()> {
        if rows.is_empty() {
            return Err(EngineError::BadRequest(
                "No payment rows to insert.".to_string(),
            ));
        }
        if rows.iter().any(|row| row.agency_id != agency_id) {
            return Err(EngineError::BadRequest(
                "Payment rows must belong to the submitting agency.".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        inner.payments.extend(rows.iter().cloned());
        Ok(())
    }

    async fn update_invoice_status(
        &self,
        agency_id: &str,
        invoice_id: &str,
        status: InvoiceStatus,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let invoice = inner
            .invoices
            .iter_mut()
            .find(|invoice| invoice.agency_id == agency_id && invoice.id == invoice_id)
            .ok_or_else(|| EngineError::NotFound(format!("Invoice '{invoice_id}' not found.")))?;
        invoice.status = status;
        Ok(())
    }

    async fn delete_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>> {
        let mut inner = self.inner.write().await;
        let (deleted, kept): (Vec<_>, Vec<_>) =
            inner.snapshots.drain(..).partition(|snapshot| {
                snapshot.agency_id == agency_id
                    && snapshot.start_date == start
                    && snapshot.end_date == end
            });
        inner.snapshots = kept;
        Ok(deleted)
    }

    async fn insert_report_snapshots(&self, rows: &[ReportSnapshot]) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner.snapshots.extend(rows.iter().cloned());
        Ok(())
    }

    async fn list_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|snapshot| {
                snapshot.agency_id == agency_id
                    && snapshot.start_date == start
                    && snapshot.end_date == end
            })
            .cloned()
            .collect())
    }

    async fn get_report_snapshot(
        &self,
        agency_id: &str,
        snapshot_id: &str,
    ) -> EngineResult<ReportSnapshot> {
        let inner = self.inner.read().await;
        inner
            .snapshots
            .iter()
            .find(|snapshot| snapshot.agency_id == agency_id && snapshot.id == snapshot_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Snapshot '{snapshot_id}' not found.")))
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> EngineResult<()> {
        self.inner.write().await.activity.push(entry.clone());
        Ok(())
    }
}
