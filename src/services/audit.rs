//! Activity-log entry construction. Persistence is the store's job; these
//! builders just shape the append-only records.

use serde_json::json;
use uuid::Uuid;

use crate::domain::{ActivityLogEntry, ReportSnapshot};

/// Audit record for a snapshot lifecycle event. The detail carries the
/// snapshot's key figures so the log is readable without a join.
pub fn snapshot_activity(action: &str, snapshot: &ReportSnapshot) -> ActivityLogEntry {
    ActivityLogEntry {
        id: Uuid::new_v4().to_string(),
        agency_id: snapshot.agency_id.clone(),
        action: action.to_string(),
        entity: "report_snapshots".to_string(),
        entity_id: snapshot.id.clone(),
        detail: json!({
            "owner_id": snapshot.owner_id,
            "month": snapshot.month,
            "start_date": snapshot.start_date,
            "end_date": snapshot.end_date,
            "avg_rate": snapshot.avg_rate,
            "fee_percent": snapshot.fee_percent,
            "fee_base": snapshot.fee_base,
            "fee_amount": snapshot.fee_amount,
            "fee_deducted": snapshot.fee_deducted,
            "balance_due": snapshot.balance_due,
            "rate_missing": snapshot.rate_missing,
        }),
    }
}

pub fn invoice_activity(
    agency_id: &str,
    action: &str,
    invoice_id: &str,
    detail: serde_json::Value,
) -> ActivityLogEntry {
    ActivityLogEntry {
        id: Uuid::new_v4().to_string(),
        agency_id: agency_id.to_string(),
        action: action.to_string(),
        entity: "invoices".to_string(),
        entity_id: invoice_id.to_string(),
        detail,
    }
}
