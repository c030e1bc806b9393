//! Postgres [`FinanceStore`] backed by sqlx. Queries are built at runtime
//! and bound positionally; ids are stored as text and enums as their
//! snake_case string forms.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::{
    ActivityLogEntry, ExchangeRateRecord, Invoice, InvoiceStatus, Payment, PropertyOwnership,
    ReportSnapshot,
};
use crate::error::{EngineError, EngineResult};
use crate::storage::FinanceStore;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    /// Upper bound on rows fetched for one reporting window.
    window_limit: i64,
}

impl PgStore {
    pub fn new(pool: PgPool, window_limit: i64) -> Self {
        Self { pool, window_limit }
    }

    async fn fetch_payments_for_invoices(
        &self,
        agency_id: &str,
        invoice_ids: &[String],
    ) -> EngineResult<Vec<Payment>> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, agency_id, lease_id, tenant_id, property_id, amount, currency,
                    method, received_date, reference, invoice_id, exchange_rate
             FROM payments
             WHERE agency_id = $1 AND invoice_id = ANY($2)",
        )
        .bind(agency_id)
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(payment_from_row).collect()
    }

    fn stitch(invoices: Vec<Invoice>, payments: Vec<Payment>) -> Vec<Invoice> {
        invoices
            .into_iter()
            .map(|mut invoice| {
                invoice.payments = payments
                    .iter()
                    .filter(|payment| {
                        payment.invoice_id.as_deref() == Some(invoice.id.as_str())
                    })
                    .cloned()
                    .collect();
                invoice
            })
            .collect()
    }
}

#[async_trait]
impl FinanceStore for PgStore {
    async fn find_invoices(
        &self,
        agency_id: &str,
        invoice_ids: &[String],
    ) -> EngineResult<Vec<Invoice>> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, agency_id, lease_id, tenant_id, property_id, currency, total_amount,
                    issue_date, due_date, status
             FROM invoices
             WHERE agency_id = $1 AND id = ANY($2)",
        )
        .bind(agency_id)
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        let invoices = rows
            .iter()
            .map(invoice_from_row)
            .collect::<EngineResult<Vec<_>>>()?;
        let payments = self
            .fetch_payments_for_invoices(agency_id, invoice_ids)
            .await?;
        Ok(Self::stitch(invoices, payments))
    }

    async fn list_invoices(&self, agency_id: &str) -> EngineResult<Vec<Invoice>> {
        let rows = sqlx::query(
            "SELECT id, agency_id, lease_id, tenant_id, property_id, currency, total_amount,
                    issue_date, due_date, status
             FROM invoices
             WHERE agency_id = $1
             ORDER BY issue_date ASC
             LIMIT $2",
        )
        .bind(agency_id)
        .bind(self.window_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        let invoices = rows
            .iter()
            .map(invoice_from_row)
            .collect::<EngineResult<Vec<_>>>()?;
        let ids = invoices
            .iter()
            .map(|invoice| invoice.id.clone())
            .collect::<Vec<_>>();
        let payments = self.fetch_payments_for_invoices(agency_id, &ids).await?;
        Ok(Self::stitch(invoices, payments))
    }

    async fn list_payments_in_window(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT id, agency_id, lease_id, tenant_id, property_id, amount, currency,
                    method, received_date, reference, invoice_id, exchange_rate
             FROM payments
             WHERE agency_id = $1 AND received_date >= $2 AND received_date <= $3
             ORDER BY received_date ASC, id ASC
             LIMIT $4",
        )
        .bind(agency_id)
        .bind(start)
        .bind(end)
        .bind(self.window_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn list_ownerships(&self, agency_id: &str) -> EngineResult<Vec<PropertyOwnership>> {
        let rows = sqlx::query(
            "SELECT agency_id, property_id, owner_id, ownership_percent
             FROM property_ownerships
             WHERE agency_id = $1",
        )
        .bind(agency_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter()
            .map(|row| {
                Ok(PropertyOwnership {
                    agency_id: get(row, "agency_id")?,
                    property_id: get(row, "property_id")?,
                    owner_id: get(row, "owner_id")?,
                    ownership_percent: row
                        .try_get::<Option<Decimal>, _>("ownership_percent")
                        .map_err(map_db_error)?,
                })
            })
            .collect()
    }

    async fn list_rate_history(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ExchangeRateRecord>> {
        let rows = sqlx::query(
            "SELECT agency_id, rate, rate_date, payment_id
             FROM exchange_rates
             WHERE agency_id = $1 AND rate_date >= $2 AND rate_date <= $3
             ORDER BY rate_date ASC",
        )
        .bind(agency_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter()
            .map(|row| {
                Ok(ExchangeRateRecord {
                    agency_id: get(row, "agency_id")?,
                    rate: row.try_get("rate").map_err(map_db_error)?,
                    rate_date: row.try_get("rate_date").map_err(map_db_error)?,
                    payment_id: row
                        .try_get::<Option<String>, _>("payment_id")
                        .map_err(map_db_error)?,
                })
            })
            .collect()
    }

    async fn insert_payments(&self, agency_id: &str, rows: &[Payment]) -> EngineResult<()> {
        if rows.is_empty() {
            return Err(EngineError::BadRequest(
                "No payment rows to insert.".to_string(),
            ));
        }
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for payment in rows {
            if payment.agency_id != agency_id {
                return Err(EngineError::BadRequest(
                    "Payment rows must belong to the submitting agency.".to_string(),
                ));
            }
            sqlx::query(
                "INSERT INTO payments (id, agency_id, lease_id, tenant_id, property_id, amount,
                                       currency, method, received_date, reference, invoice_id,
                                       exchange_rate)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(&payment.id)
            .bind(&payment.agency_id)
            .bind(&payment.lease_id)
            .bind(&payment.tenant_id)
            .bind(&payment.property_id)
            .bind(payment.amount)
            .bind(payment.currency.as_str())
            .bind(payment.method.as_str())
            .bind(payment.received_date)
            .bind(&payment.reference)
            .bind(&payment.invoice_id)
            .bind(payment.exchange_rate)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)
    }

    async fn update_invoice_status(
        &self,
        agency_id: &str,
        invoice_id: &str,
        status: InvoiceStatus,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE invoices SET status = $3 WHERE agency_id = $1 AND id = $2",
        )
        .bind(agency_id)
        .bind(invoice_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Invoice '{invoice_id}' not found."
            )));
        }
        Ok(())
    }

    async fn delete_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>> {
        let rows = sqlx::query(
            "DELETE FROM report_snapshots
             WHERE agency_id = $1 AND start_date = $2 AND end_date = $3
             RETURNING id, agency_id, owner_id, month, start_date, end_date, avg_rate,
                       fee_percent, cash_usd, cash_dop, transfer_usd, transfer_dop,
                       usd_total, dop_total, fee_base, fee_amount, fee_deducted,
                       balance_due, rate_missing",
        )
        .bind(agency_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn insert_report_snapshots(&self, rows: &[ReportSnapshot]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for snapshot in rows {
            sqlx::query(
                "INSERT INTO report_snapshots (id, agency_id, owner_id, month, start_date,
                     end_date, avg_rate, fee_percent, cash_usd, cash_dop, transfer_usd,
                     transfer_dop, usd_total, dop_total, fee_base, fee_amount, fee_deducted,
                     balance_due, rate_missing)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                         $16, $17, $18, $19)",
            )
            .bind(&snapshot.id)
            .bind(&snapshot.agency_id)
            .bind(&snapshot.owner_id)
            .bind(&snapshot.month)
            .bind(snapshot.start_date)
            .bind(snapshot.end_date)
            .bind(snapshot.avg_rate)
            .bind(snapshot.fee_percent)
            .bind(snapshot.cash_usd)
            .bind(snapshot.cash_dop)
            .bind(snapshot.transfer_usd)
            .bind(snapshot.transfer_dop)
            .bind(snapshot.usd_total)
            .bind(snapshot.dop_total)
            .bind(snapshot.fee_base)
            .bind(snapshot.fee_amount)
            .bind(snapshot.fee_deducted)
            .bind(snapshot.balance_due)
            .bind(snapshot.rate_missing)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)
    }

    async fn list_report_snapshots(
        &self,
        agency_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ReportSnapshot>> {
        let rows = sqlx::query(
            "SELECT id, agency_id, owner_id, month, start_date, end_date, avg_rate,
                    fee_percent, cash_usd, cash_dop, transfer_usd, transfer_dop,
                    usd_total, dop_total, fee_base, fee_amount, fee_deducted,
                    balance_due, rate_missing
             FROM report_snapshots
             WHERE agency_id = $1 AND start_date = $2 AND end_date = $3
             ORDER BY owner_id NULLS FIRST",
        )
        .bind(agency_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn get_report_snapshot(
        &self,
        agency_id: &str,
        snapshot_id: &str,
    ) -> EngineResult<ReportSnapshot> {
        let row = sqlx::query(
            "SELECT id, agency_id, owner_id, month, start_date, end_date, avg_rate,
                    fee_percent, cash_usd, cash_dop, transfer_usd, transfer_dop,
                    usd_total, dop_total, fee_base, fee_amount, fee_deducted,
                    balance_due, rate_missing
             FROM report_snapshots
             WHERE agency_id = $1 AND id = $2
             LIMIT 1",
        )
        .bind(agency_id)
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        let row = row.ok_or_else(|| {
            EngineError::NotFound(format!("Snapshot '{snapshot_id}' not found."))
        })?;
        snapshot_from_row(&row)
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO activity_log (id, agency_id, action, entity, entity_id, detail)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&entry.id)
        .bind(&entry.agency_id)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}

fn get(row: &PgRow, column: &str) -> EngineResult<String> {
    row.try_get::<String, _>(column).map_err(map_db_error)
}

fn invoice_from_row(row: &PgRow) -> EngineResult<Invoice> {
    Ok(Invoice {
        id: get(row, "id")?,
        agency_id: get(row, "agency_id")?,
        lease_id: get(row, "lease_id")?,
        tenant_id: get(row, "tenant_id")?,
        property_id: get(row, "property_id")?,
        currency: get(row, "currency")?.parse()?,
        total_amount: row.try_get("total_amount").map_err(map_db_error)?,
        issue_date: row.try_get("issue_date").map_err(map_db_error)?,
        due_date: row.try_get("due_date").map_err(map_db_error)?,
        status: get(row, "status")?.parse()?,
        payments: Vec::new(),
    })
}

fn payment_from_row(row: &PgRow) -> EngineResult<Payment> {
    Ok(Payment {
        id: get(row, "id")?,
        agency_id: get(row, "agency_id")?,
        lease_id: get(row, "lease_id")?,
        tenant_id: get(row, "tenant_id")?,
        property_id: get(row, "property_id")?,
        amount: row.try_get("amount").map_err(map_db_error)?,
        currency: get(row, "currency")?.parse()?,
        method: get(row, "method")?.parse()?,
        received_date: row.try_get("received_date").map_err(map_db_error)?,
        reference: row
            .try_get::<Option<String>, _>("reference")
            .map_err(map_db_error)?,
        invoice_id: row
            .try_get::<Option<String>, _>("invoice_id")
            .map_err(map_db_error)?,
        exchange_rate: row
            .try_get::<Option<Decimal>, _>("exchange_rate")
            .map_err(map_db_error)?,
    })
}

fn snapshot_from_row(row: &PgRow) -> EngineResult<ReportSnapshot> {
    Ok(ReportSnapshot {
        id: get(row, "id")?,
        agency_id: get(row, "agency_id")?,
        owner_id: row
            .try_get::<Option<String>, _>("owner_id")
            .map_err(map_db_error)?,
        month: get(row, "month")?,
        start_date: row.try_get("start_date").map_err(map_db_error)?,
        end_date: row.try_get("end_date").map_err(map_db_error)?,
        avg_rate: row
            .try_get::<Option<Decimal>, _>("avg_rate")
            .map_err(map_db_error)?,
        fee_percent: row.try_get("fee_percent").map_err(map_db_error)?,
        cash_usd: row.try_get("cash_usd").map_err(map_db_error)?,
        cash_dop: row.try_get("cash_dop").map_err(map_db_error)?,
        transfer_usd: row.try_get("transfer_usd").map_err(map_db_error)?,
        transfer_dop: row.try_get("transfer_dop").map_err(map_db_error)?,
        usd_total: row.try_get("usd_total").map_err(map_db_error)?,
        dop_total: row.try_get("dop_total").map_err(map_db_error)?,
        fee_base: row.try_get("fee_base").map_err(map_db_error)?,
        fee_amount: row.try_get("fee_amount").map_err(map_db_error)?,
        fee_deducted: row.try_get("fee_deducted").map_err(map_db_error)?,
        balance_due: row.try_get("balance_due").map_err(map_db_error)?,
        rate_missing: row.try_get("rate_missing").map_err(map_db_error)?,
    })
}

fn map_db_error(error: sqlx::Error) -> EngineError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return EngineError::Dependency(
            "Duplicate value violates a unique constraint.".to_string(),
        );
    }
    EngineError::Dependency("Database operation failed.".to_string())
}
