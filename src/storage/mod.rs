//! The storage boundary. The engine operates on an already-fetched,
//! immutable-for-the-duration snapshot of records; everything it reads and
//! writes crosses this trait. `insert_payments` is a transactional batch:
//! all rows for one call are committed or none are.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{
    ActivityLogEntry, ExchangeRateRecord, Invoice, InvoiceStatus, Payment, PropertyOwnership,
    ReportSnapshot,
};
use crate::error::EngineResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait FinanceStore: Send + Sync {
    /// Fetch the candidate invoices referenced by a payment submission,
    /// with their matched payments nested.
    async fn find_invoices(
        &self,
        agency_id: &str,
        invoice_ids: &[String],
    ) -> EngineResult<Vec<Invoice>>;

    async fn list_invoices(&self, agency_id: &str) -> EngineResult<Vec<Invoice>>;

    /// Payments with `start <= received_date <= end`, linked and unlinked.
    async fn list_payments_in_window(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<Payment>>;

    async fn list_ownerships(&self, agency_id: &str) -> EngineResult<Vec<PropertyOwnership>>;

    async fn list_rate_history(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ExchangeRateRecord>>;

    /// Transactional batch insert: all rows or none.
    async fn insert_payments(&self, agency_id: &str, rows: &[Payment]) -> EngineResult<()>;

    /// Update the stored status hint on one invoice.
    async fn update_invoice_status(
        &self,
        agency_id: &str,
        invoice_id: &str,
        status: InvoiceStatus,
    ) -> EngineResult<()>;

    /// Delete every snapshot for the exact `(agency, period)` key, returning
    /// the deleted rows so the caller can audit-log them.
    async fn delete_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>>;

    async fn insert_report_snapshots(&self, rows: &[ReportSnapshot]) -> EngineResult<()>;

    async fn list_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>>;

    async fn get_report_snapshot(
        &self,
        agency_id: &str,
        snapshot_id: &str,
    ) -> EngineResult<ReportSnapshot>;

    /// Append-only; activity entries are never updated or deleted.
    async fn append_activity(&self, entry: &ActivityLogEntry) -> EngineResult<()>;
}
