//! Invoice status derivation. The stored `status` is only a hint; every
//! downstream consumer uses the value derived here from live payment data.
//! The stored hint is mutated only by the payment allocator (paid/partial),
//! the explicit overdue sweep, or a void; the three are never conflated.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use crate::domain::{require_role, CallerContext, CallerRole, Invoice, InvoiceStatus};
use crate::error::{EngineError, EngineResult, Warning};
use crate::services::audit;
use crate::services::rates::{convert, transaction_rate};
use crate::storage::FinanceStore;

/// Outcome of deriving an invoice's effective status.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStatus {
    pub status: InvoiceStatus,
    /// `paid_converted - total`. May be positive: overpayment is allowed and
    /// not truncated.
    pub balance: Decimal,
    pub paid_converted: Decimal,
    pub warnings: Vec<Warning>,
}

/// Sum the invoice's payments in the invoice's currency. A cross-currency
/// payment converts through its own rate; if that rate is unknown it
/// contributes zero and the result carries a warning.
pub fn paid_converted(invoice: &Invoice) -> (Decimal, Vec<Warning>) {
    let mut total = Decimal::ZERO;
    let mut warnings = Vec::new();
    for payment in &invoice.payments {
        if payment.currency == invoice.currency {
            total += payment.amount;
            continue;
        }
        match transaction_rate(payment) {
            Some(rate) => {
                total += convert(payment.amount, payment.currency, invoice.currency, rate);
            }
            None => warnings.push(Warning::unknown_rate(format!(
                "payment {} has no usable rate",
                payment.id
            ))),
        }
    }
    (total, warnings)
}

/// Pure derivation, no side effects. `Void` is absorbing and excluded from
/// balance computations.
pub fn derive_status(invoice: &Invoice, today: NaiveDate) -> DerivedStatus {
    if invoice.is_void() {
        return DerivedStatus {
            status: InvoiceStatus::Void,
            balance: Decimal::ZERO,
            paid_converted: Decimal::ZERO,
            warnings: Vec::new(),
        };
    }

    let (paid, warnings) = paid_converted(invoice);
    let balance = paid - invoice.total_amount;
    let status = if balance >= Decimal::ZERO {
        InvoiceStatus::Paid
    } else if invoice.due_date < today {
        InvoiceStatus::Overdue
    } else if paid > Decimal::ZERO {
        InvoiceStatus::Partial
    } else {
        invoice.status
    };

    DerivedStatus {
        status,
        balance,
        paid_converted: paid,
        warnings,
    }
}

/// The explicit batch that persists `overdue` onto stored hints. Display
/// paths never wait for this; they derive in real time.
pub async fn mark_overdue_sweep(
    store: &dyn FinanceStore,
    agency_id: &str,
    today: NaiveDate,
) -> EngineResult<u64> {
    let invoices = store.list_invoices(agency_id).await?;
    let mut updated = 0u64;
    for invoice in &invoices {
        if invoice.is_void() || invoice.status == InvoiceStatus::Overdue {
            continue;
        }
        if derive_status(invoice, today).status == InvoiceStatus::Overdue {
            store
                .update_invoice_status(agency_id, &invoice.id, InvoiceStatus::Overdue)
                .await?;
            updated += 1;
        }
    }
    if updated > 0 {
        tracing::info!(agency_id, updated, "Marked invoices overdue");
    }
    Ok(updated)
}

/// Void an invoice, permanently excluding it from balance and fee
/// computations. Voiding an already-void invoice is a no-op.
pub async fn void_invoice(
    store: &dyn FinanceStore,
    agency_id: &str,
    invoice_id: &str,
    caller: &CallerContext,
) -> EngineResult<()> {
    require_role(caller, &[CallerRole::Admin])?;

    let invoices = store
        .find_invoices(agency_id, &[invoice_id.to_string()])
        .await?;
    let invoice = invoices
        .first()
        .ok_or_else(|| EngineError::InvoiceNotFound(invoice_id.to_string()))?;
    if invoice.is_void() {
        return Ok(());
    }

    store
        .update_invoice_status(agency_id, invoice_id, InvoiceStatus::Void)
        .await?;
    store
        .append_activity(&audit::invoice_activity(
            agency_id,
            "void",
            invoice_id,
            json!({
                "previous_status": invoice.status.as_str(),
                "total_amount": invoice.total_amount,
                "currency": invoice.currency.as_str(),
                "voided_by": caller.user_id,
            }),
        ))
        .await?;
    tracing::info!(agency_id, invoice_id, "Invoice voided");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{Currency, Payment, PaymentMethod};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(total: Decimal, currency: Currency, due: NaiveDate) -> Invoice {
        Invoice {
            id: "inv1".to_string(),
            agency_id: "a1".to_string(),
            lease_id: "l1".to_string(),
            tenant_id: "t1".to_string(),
            property_id: "pr1".to_string(),
            currency,
            total_amount: total,
            issue_date: date(2026, 3, 1),
            due_date: due,
            status: InvoiceStatus::Sent,
            payments: Vec::new(),
        }
    }

    fn payment(
        id: &str,
        amount: Decimal,
        currency: Currency,
        rate: Option<Decimal>,
    ) -> Payment {
        Payment {
            id: id.to_string(),
            agency_id: "a1".to_string(),
            lease_id: "l1".to_string(),
            tenant_id: "t1".to_string(),
            property_id: "pr1".to_string(),
            amount,
            currency,
            method: PaymentMethod::Cash,
            received_date: date(2026, 3, 10),
            reference: None,
            invoice_id: Some("inv1".to_string()),
            exchange_rate: rate,
        }
    }

    #[test]
    fn exact_payment_marks_paid_with_zero_balance() {
        // Scenario: 1000.00 DOP invoice settled by one 1000.00 DOP payment.
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 4, 1));
        inv.payments.push(payment("p1", dec!(1000.00), Currency::Dop, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.status, InvoiceStatus::Paid);
        assert_eq!(derived.balance, dec!(0.00));
    }

    #[test]
    fn past_due_partial_payment_is_overdue_not_partial() {
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 3, 1));
        inv.payments.push(payment("p1", dec!(400.00), Currency::Dop, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.status, InvoiceStatus::Overdue);
        assert_eq!(derived.balance, dec!(-600.00));
    }

    #[test]
    fn cross_currency_payment_converts_through_its_own_rate() {
        // 100.00 USD at 58.5 against a 5000.00 DOP invoice: 5850 DOP paid.
        let mut inv = invoice(dec!(5000.00), Currency::Dop, date(2026, 4, 1));
        inv.payments
            .push(payment("p1", dec!(100.00), Currency::Usd, Some(dec!(58.5))));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.paid_converted, dec!(5850.0));
        assert_eq!(derived.status, InvoiceStatus::Paid);
        assert_eq!(derived.balance, dec!(850.0));
    }

    #[test]
    fn missing_rate_contributes_zero_and_warns() {
        let mut inv = invoice(dec!(5000.00), Currency::Dop, date(2026, 4, 1));
        inv.payments.push(payment("p1", dec!(100.00), Currency::Usd, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.paid_converted, dec!(0));
        assert_eq!(derived.status, InvoiceStatus::Sent);
        assert_eq!(derived.warnings.len(), 1);
    }

    #[test]
    fn partial_before_due_date() {
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 4, 1));
        inv.payments.push(payment("p1", dec!(400.00), Currency::Dop, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.status, InvoiceStatus::Partial);
    }

    #[test]
    fn overpayment_stays_paid_and_keeps_positive_balance() {
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 3, 1));
        inv.payments.push(payment("p1", dec!(1200.00), Currency::Dop, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.status, InvoiceStatus::Paid);
        assert_eq!(derived.balance, dec!(200.00));
    }

    #[test]
    fn adding_payments_never_regresses_status() {
        // paid stays paid; overdue/partial never falls back to draft.
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 3, 1));
        inv.payments.push(payment("p1", dec!(1000.00), Currency::Dop, None));
        assert_eq!(
            derive_status(&inv, date(2026, 3, 15)).status,
            InvoiceStatus::Paid
        );
        inv.payments.push(payment("p2", dec!(50.00), Currency::Dop, None));
        assert_eq!(
            derive_status(&inv, date(2026, 3, 15)).status,
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn void_is_absorbing() {
        let mut inv = invoice(dec!(1000.00), Currency::Dop, date(2026, 3, 1));
        inv.status = InvoiceStatus::Void;
        inv.payments.push(payment("p1", dec!(1000.00), Currency::Dop, None));
        let derived = derive_status(&inv, date(2026, 3, 15));
        assert_eq!(derived.status, InvoiceStatus::Void);
        assert_eq!(derived.balance, dec!(0));
        assert_eq!(derived.paid_converted, dec!(0));
    }

    #[tokio::test]
    async fn sweep_persists_overdue_hints() {
        use std::sync::Arc;

        use crate::storage::{FinanceStore, MemoryStore};

        let store = Arc::new(MemoryStore::new());
        let mut past_due = invoice(dec!(1000.00), Currency::Dop, date(2026, 3, 1));
        past_due.id = "inv-due".to_string();
        let mut current = invoice(dec!(1000.00), Currency::Dop, date(2026, 4, 20));
        current.id = "inv-current".to_string();
        store.seed_invoice(past_due).await;
        store.seed_invoice(current).await;

        let updated = mark_overdue_sweep(store.as_ref(), "a1", date(2026, 3, 15))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let invoices = store.list_invoices("a1").await.unwrap();
        let hinted = invoices.iter().find(|i| i.id == "inv-due").unwrap();
        assert_eq!(hinted.status, InvoiceStatus::Overdue);
        let untouched = invoices.iter().find(|i| i.id == "inv-current").unwrap();
        assert_eq!(untouched.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn void_requires_admin_and_logs() {
        use std::sync::Arc;

        use crate::storage::{FinanceStore, MemoryStore};

        let store = Arc::new(MemoryStore::new());
        store
            .seed_invoice(invoice(dec!(1000.00), Currency::Dop, date(2026, 4, 1)))
            .await;

        let accountant = CallerContext {
            user_id: "u1".to_string(),
            role: CallerRole::Accountant,
        };
        assert!(matches!(
            void_invoice(store.as_ref(), "a1", "inv1", &accountant).await,
            Err(EngineError::Forbidden(_))
        ));

        let admin = CallerContext {
            user_id: "u2".to_string(),
            role: CallerRole::Admin,
        };
        void_invoice(store.as_ref(), "a1", "inv1", &admin)
            .await
            .unwrap();
        let invoices = store.list_invoices("a1").await.unwrap();
        assert_eq!(invoices[0].status, InvoiceStatus::Void);
        assert_eq!(store.activity_entries().await.len(), 1);

        // Absorbing: a second void changes nothing and logs nothing new.
        void_invoice(store.as_ref(), "a1", "inv1", &admin)
            .await
            .unwrap();
        assert_eq!(store.activity_entries().await.len(), 1);
    }
}
