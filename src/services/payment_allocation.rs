//! Payment intake. A submission is first planned into concrete payment rows
//! with every validation applied, then the rows are written in one atomic
//! batch. Any failed check aborts before a single row is persisted.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::domain::{
    validate_input, Currency, Invoice, InvoiceStatus, Payment, PaymentDetails, PaymentDraft,
    PaymentSubmission,
};
use crate::error::{EngineError, EngineResult, Warning};
use crate::services::invoice_status::derive_status;
use crate::services::rates::convert;
use crate::storage::FinanceStore;

/// Status transition persisted (or observed) for one touched invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceStatusChange {
    pub invoice_id: String,
    pub status: InvoiceStatus,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPayments {
    pub rows: Vec<Payment>,
    pub statuses: Vec<InvoiceStatusChange>,
    pub warnings: Vec<Warning>,
}

/// Turn a submission into the payment rows it implies. Pure: storage is only
/// represented by the candidate invoice set the caller already fetched.
pub fn plan_payment(
    submission: &PaymentSubmission,
    agency_id: &str,
    invoices: &[Invoice],
) -> EngineResult<Vec<Payment>> {
    match submission {
        PaymentSubmission::Unlinked { draft } => {
            validate_input(&draft.details)?;
            require_positive(draft.amount, "payment amount")?;
            Ok(vec![row_from_draft(agency_id, draft, None)])
        }
        PaymentSubmission::SingleInvoice { invoice_id, draft } => {
            validate_input(&draft.details)?;
            require_positive(draft.amount, "payment amount")?;
            let invoice = find_invoice(invoices, invoice_id)?;
            if draft.currency != invoice.currency {
                require_rate(draft.exchange_rate, invoice_id)?;
            }
            Ok(vec![row_from_draft(agency_id, draft, Some(invoice_id))])
        }
        PaymentSubmission::CurrencySplit {
            invoice_id,
            details,
            usd_amount,
            usd_rate,
            dop_amount,
            dop_rate,
        } => {
            validate_input(details)?;
            let invoice = find_invoice(invoices, invoice_id)?;
            let mut rows = Vec::new();
            for (amount, currency, rate) in [
                (*usd_amount, Currency::Usd, *usd_rate),
                (*dop_amount, Currency::Dop, *dop_rate),
            ] {
                if amount.is_zero() {
                    continue;
                }
                require_positive(amount, "split leg amount")?;
                if currency != invoice.currency {
                    require_rate(rate, invoice_id)?;
                }
                rows.push(row(agency_id, details, amount, currency, rate, Some(invoice_id)));
            }
            if rows.is_empty() {
                return Err(EngineError::InvalidAmount(
                    "Split payment needs at least one positive leg.".to_string(),
                ));
            }
            Ok(rows)
        }
        PaymentSubmission::SettleInFull {
            invoice_ids,
            details,
            pay_currency,
            exchange_rate,
        } => {
            validate_input(details)?;
            if invoice_ids.is_empty() {
                return Err(EngineError::BadRequest(
                    "Settle-in-full needs at least one invoice.".to_string(),
                ));
            }
            let mut rows = Vec::new();
            let mut seen = BTreeSet::new();
            for invoice_id in invoice_ids {
                // A repeated id settles the invoice once, not twice.
                if !seen.insert(invoice_id.as_str()) {
                    continue;
                }
                let invoice = find_invoice(invoices, invoice_id)?;
                let (amount, rate) = if *pay_currency == invoice.currency {
                    (invoice.total_amount, *exchange_rate)
                } else {
                    let rate = require_rate(*exchange_rate, invoice_id)?;
                    // Round the converted amount up so converting it back
                    // always clears the invoice total.
                    let converted =
                        convert(invoice.total_amount, invoice.currency, *pay_currency, rate)
                            .round_dp_with_strategy(2, RoundingStrategy::AwayFromZero);
                    (converted, Some(rate))
                };
                require_positive(amount, "invoice total")?;
                rows.push(row(
                    agency_id,
                    details,
                    amount,
                    *pay_currency,
                    rate,
                    Some(invoice_id),
                ));
            }
            Ok(rows)
        }
    }
}

/// Stateful wrapper: fetches candidates, plans, writes the batch, then
/// refreshes stored status hints for the touched invoices.
pub struct PaymentAllocator {
    store: Arc<dyn FinanceStore>,
}

impl PaymentAllocator {
    pub fn new(store: Arc<dyn FinanceStore>) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        agency_id: &str,
        submission: &PaymentSubmission,
        today: NaiveDate,
    ) -> EngineResult<AppliedPayments> {
        let targeted = targeted_invoice_ids(submission);
        let invoices = if targeted.is_empty() {
            Vec::new()
        } else {
            let found = self.store.find_invoices(agency_id, &targeted).await?;
            for wanted in &targeted {
                if !found.iter().any(|invoice| &invoice.id == wanted) {
                    return Err(EngineError::InvoiceNotFound(wanted.clone()));
                }
            }
            found
        };

        let rows = plan_payment(submission, agency_id, &invoices)?;
        self.store.insert_payments(agency_id, &rows).await?;
        tracing::info!(agency_id, rows = rows.len(), "Payments recorded");

        let mut statuses = Vec::new();
        let mut warnings = Vec::new();
        for invoice in &invoices {
            let mut refreshed = invoice.clone();
            refreshed.payments.extend(
                rows.iter()
                    .filter(|row| row.invoice_id.as_deref() == Some(invoice.id.as_str()))
                    .cloned(),
            );
            let derived = derive_status(&refreshed, today);
            warnings.extend(derived.warnings.iter().cloned());

            // Paid and partial hints are persisted eagerly; overdue is the
            // sweep's job and display paths re-derive anyway.
            let persistable = matches!(derived.status, InvoiceStatus::Paid | InvoiceStatus::Partial);
            if persistable && derived.status != invoice.status {
                self.store
                    .update_invoice_status(agency_id, &invoice.id, derived.status)
                    .await?;
            }
            statuses.push(InvoiceStatusChange {
                invoice_id: invoice.id.clone(),
                status: derived.status,
                balance: derived.balance,
            });
        }

        Ok(AppliedPayments {
            rows,
            statuses,
            warnings,
        })
    }
}

fn targeted_invoice_ids(submission: &PaymentSubmission) -> Vec<String> {
    match submission {
        PaymentSubmission::Unlinked { .. } => Vec::new(),
        PaymentSubmission::SingleInvoice { invoice_id, .. }
        | PaymentSubmission::CurrencySplit { invoice_id, .. } => vec![invoice_id.clone()],
        PaymentSubmission::SettleInFull { invoice_ids, .. } => invoice_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

fn find_invoice<'a>(invoices: &'a [Invoice], invoice_id: &str) -> EngineResult<&'a Invoice> {
    let invoice = invoices
        .iter()
        .find(|invoice| invoice.id == invoice_id)
        .ok_or_else(|| EngineError::InvoiceNotFound(invoice_id.to_string()))?;
    if invoice.is_void() {
        return Err(EngineError::BadRequest(format!(
            "Invoice '{invoice_id}' is void and cannot accept payments."
        )));
    }
    Ok(invoice)
}

fn require_positive(amount: Decimal, what: &str) -> EngineResult<()> {
    if amount > Decimal::ZERO {
        return Ok(());
    }
    Err(EngineError::InvalidAmount(format!(
        "{what} must be positive, got {amount}."
    )))
}

fn require_rate(rate: Option<Decimal>, invoice_id: &str) -> EngineResult<Decimal> {
    match rate {
        Some(rate) if rate > Decimal::ZERO => Ok(rate),
        _ => Err(EngineError::RateRequired(format!(
            "cross-currency payment against invoice '{invoice_id}' has no usable rate"
        ))),
    }
}

fn row_from_draft(agency_id: &str, draft: &PaymentDraft, invoice_id: Option<&str>) -> Payment {
    row(
        agency_id,
        &draft.details,
        draft.amount,
        draft.currency,
        draft.exchange_rate,
        invoice_id,
    )
}

fn row(
    agency_id: &str,
    details: &PaymentDetails,
    amount: Decimal,
    currency: Currency,
    rate: Option<Decimal>,
    invoice_id: Option<&str>,
) -> Payment {
    Payment {
        id: Uuid::new_v4().to_string(),
        agency_id: agency_id.to_string(),
        lease_id: details.lease_id.clone(),
        tenant_id: details.tenant_id.clone(),
        property_id: details.property_id.clone(),
        amount,
        currency,
        method: details.method,
        received_date: details.received_date,
        reference: details.reference.clone(),
        invoice_id: invoice_id.map(ToOwned::to_owned),
        exchange_rate: rate,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::PaymentMethod;
    use crate::storage::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn details() -> PaymentDetails {
        PaymentDetails {
            lease_id: "l1".to_string(),
            tenant_id: "t1".to_string(),
            property_id: "pr1".to_string(),
            method: PaymentMethod::Cash,
            received_date: date(2026, 3, 10),
            reference: None,
        }
    }

    fn invoice(id: &str, total: Decimal, currency: Currency) -> Invoice {
        Invoice {
            id: id.to_string(),
            agency_id: "a1".to_string(),
            lease_id: "l1".to_string(),
            tenant_id: "t1".to_string(),
            property_id: "pr1".to_string(),
            currency,
            total_amount: total,
            issue_date: date(2026, 3, 1),
            due_date: date(2026, 3, 31),
            status: InvoiceStatus::Sent,
            payments: Vec::new(),
        }
    }

    #[test]
    fn unlinked_plan_produces_one_free_row() {
        let submission = PaymentSubmission::Unlinked {
            draft: PaymentDraft {
                details: details(),
                amount: dec!(100),
                currency: Currency::Usd,
                exchange_rate: None,
            },
        };
        let rows = plan_payment(&submission, "a1", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].invoice_id, None);
        assert_eq!(rows[0].amount, dec!(100));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let submission = PaymentSubmission::Unlinked {
            draft: PaymentDraft {
                details: details(),
                amount: dec!(0),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        assert!(matches!(
            plan_payment(&submission, "a1", &[]),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn cross_currency_link_without_rate_is_rejected() {
        let invoices = vec![invoice("inv1", dec!(5000), Currency::Dop)];
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(100),
                currency: Currency::Usd,
                exchange_rate: None,
            },
        };
        assert!(matches!(
            plan_payment(&submission, "a1", &invoices),
            Err(EngineError::RateRequired(_))
        ));
    }

    #[test]
    fn unknown_invoice_is_rejected() {
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "ghost".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(100),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        assert!(matches!(
            plan_payment(&submission, "a1", &[]),
            Err(EngineError::InvoiceNotFound(_))
        ));
    }

    #[test]
    fn split_drops_zero_leg_and_keeps_shared_details() {
        let invoices = vec![invoice("inv1", dec!(5000), Currency::Dop)];
        let submission = PaymentSubmission::CurrencySplit {
            invoice_id: "inv1".to_string(),
            details: details(),
            usd_amount: dec!(20),
            usd_rate: Some(dec!(58)),
            dop_amount: dec!(0),
            dop_rate: None,
        };
        let rows = plan_payment(&submission, "a1", &invoices).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].currency, Currency::Usd);
        assert_eq!(rows[0].exchange_rate, Some(dec!(58)));
        assert_eq!(rows[0].invoice_id.as_deref(), Some("inv1"));
    }

    #[test]
    fn split_with_both_legs_zero_is_rejected() {
        let invoices = vec![invoice("inv1", dec!(5000), Currency::Dop)];
        let submission = PaymentSubmission::CurrencySplit {
            invoice_id: "inv1".to_string(),
            details: details(),
            usd_amount: dec!(0),
            usd_rate: None,
            dop_amount: dec!(0),
            dop_rate: None,
        };
        assert!(matches!(
            plan_payment(&submission, "a1", &invoices),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn settle_in_full_converts_each_total_through_the_shared_rate() {
        let invoices = vec![
            invoice("inv1", dec!(5000), Currency::Dop),
            invoice("inv2", dec!(100), Currency::Usd),
        ];
        let submission = PaymentSubmission::SettleInFull {
            invoice_ids: vec!["inv1".to_string(), "inv2".to_string()],
            details: details(),
            pay_currency: Currency::Usd,
            exchange_rate: Some(dec!(58.5)),
        };
        let rows = plan_payment(&submission, "a1", &invoices).unwrap();
        assert_eq!(rows.len(), 2);
        // 5000 / 58.5 = 85.4700..., rounded up so the converted-back credit
        // still covers the 5000 total.
        assert_eq!(rows[0].amount, dec!(85.48));
        assert_eq!(rows[0].exchange_rate, Some(dec!(58.5)));
        assert_eq!(rows[1].amount, dec!(100));
    }

    #[test]
    fn settle_in_full_charges_a_repeated_invoice_once() {
        let invoices = vec![invoice("inv1", dec!(1000), Currency::Dop)];
        let submission = PaymentSubmission::SettleInFull {
            invoice_ids: vec!["inv1".to_string(), "inv1".to_string()],
            details: details(),
            pay_currency: Currency::Dop,
            exchange_rate: None,
        };
        let rows = plan_payment(&submission, "a1", &invoices).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(1000));
    }

    #[test]
    fn void_invoice_cannot_accept_payments() {
        let mut voided = invoice("inv1", dec!(1000), Currency::Dop);
        voided.status = InvoiceStatus::Void;
        let invoices = vec![voided];

        let single = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(1000),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        assert!(matches!(
            plan_payment(&single, "a1", &invoices),
            Err(EngineError::BadRequest(_))
        ));

        let settle = PaymentSubmission::SettleInFull {
            invoice_ids: vec!["inv1".to_string()],
            details: details(),
            pay_currency: Currency::Dop,
            exchange_rate: None,
        };
        assert!(matches!(
            plan_payment(&settle, "a1", &invoices),
            Err(EngineError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn apply_rejects_void_target_before_any_write() {
        let store = Arc::new(MemoryStore::default());
        let mut voided = invoice("inv1", dec!(1000), Currency::Dop);
        voided.status = InvoiceStatus::Void;
        store.seed_invoice(voided).await;

        let allocator = PaymentAllocator::new(store.clone());
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(1000),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        let result = allocator.apply("a1", &submission, date(2026, 3, 15)).await;
        assert!(matches!(result, Err(EngineError::BadRequest(_))));
        assert!(store.payment_rows().await.is_empty());
    }

    #[tokio::test]
    async fn apply_writes_rows_and_persists_paid_hint() {
        let store = Arc::new(MemoryStore::default());
        store.seed_invoice(invoice("inv1", dec!(1000), Currency::Dop)).await;

        let allocator = PaymentAllocator::new(store.clone());
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(1000),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        let applied = allocator
            .apply("a1", &submission, date(2026, 3, 15))
            .await
            .unwrap_or_else(|err| panic!("apply failed: {err}"));

        assert_eq!(applied.rows.len(), 1);
        assert_eq!(applied.statuses.len(), 1);
        assert_eq!(applied.statuses[0].status, InvoiceStatus::Paid);
        assert_eq!(applied.statuses[0].balance, dec!(0));

        let stored = store.find_invoices("a1", &["inv1".to_string()]).await.unwrap();
        assert_eq!(stored[0].status, InvoiceStatus::Paid);
        assert_eq!(store.payment_rows().await.len(), 1);
    }

    #[tokio::test]
    async fn apply_rejects_before_any_write() {
        let store = Arc::new(MemoryStore::default());
        store.seed_invoice(invoice("inv1", dec!(5000), Currency::Dop)).await;

        let allocator = PaymentAllocator::new(store.clone());
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(100),
                currency: Currency::Usd,
                exchange_rate: None,
            },
        };
        let result = allocator.apply("a1", &submission, date(2026, 3, 15)).await;
        assert!(matches!(result, Err(EngineError::RateRequired(_))));
        assert!(store.payment_rows().await.is_empty());
    }

    #[tokio::test]
    async fn apply_reports_partial_without_marking_overdue() {
        let store = Arc::new(MemoryStore::default());
        let mut inv = invoice("inv1", dec!(1000), Currency::Dop);
        inv.due_date = date(2026, 4, 30);
        store.seed_invoice(inv).await;

        let allocator = PaymentAllocator::new(store.clone());
        let submission = PaymentSubmission::SingleInvoice {
            invoice_id: "inv1".to_string(),
            draft: PaymentDraft {
                details: details(),
                amount: dec!(400),
                currency: Currency::Dop,
                exchange_rate: None,
            },
        };
        let applied = allocator
            .apply("a1", &submission, date(2026, 3, 15))
            .await
            .unwrap();
        assert_eq!(applied.statuses[0].status, InvoiceStatus::Partial);
        assert_eq!(applied.statuses[0].balance, dec!(-600));
    }
}
