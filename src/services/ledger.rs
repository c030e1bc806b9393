//! Chronological per-tenant, per-currency ledger of invoice debits and
//! payment credits with a running balance, plus tenant-level outstanding and
//! overdue aggregates.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::{Currency, Invoice, Payment};
use crate::error::Warning;
use crate::services::rates::{convert, transaction_rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntryKind {
    InvoiceDebit,
    PaymentCredit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub kind: LedgerEntryKind,
    pub source_id: String,
    /// Negative for invoice debits, positive for payment credits, already in
    /// the ledger currency.
    pub amount: Decimal,
    pub running_balance: Decimal,
    /// Credit contributed zero because its conversion rate was unknown.
    pub rate_missing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenantLedger {
    pub tenant_id: String,
    pub currency: Currency,
    pub entries: Vec<LedgerEntry>,
    pub running_balance: Decimal,
    /// Sum of unpaid remainders of this currency's non-void invoices.
    pub outstanding: Decimal,
    /// True when any invoice is past due with linked payments short of its
    /// total.
    pub overdue: bool,
    pub warnings: Vec<Warning>,
}

/// Build one tenant's ledger in one currency.
///
/// A payment linked to an invoice appears only in the ledger of that
/// invoice's currency (shown already converted through the payment's own
/// rate); an unlinked payment appears in its native currency's ledger only.
/// Same-day entries order invoice-before-payment so a debit is reflected
/// before its credits.
pub fn build_ledger(
    tenant_id: &str,
    currency: Currency,
    invoices: &[Invoice],
    payments: &[Payment],
    today: NaiveDate,
) -> TenantLedger {
    let tenant_invoices = invoices
        .iter()
        .filter(|invoice| invoice.tenant_id == tenant_id && !invoice.is_void())
        .collect::<Vec<_>>();
    let mut warnings = Vec::new();

    // date, kind rank, source id, amount, rate_missing; sorted before the
    // running balance is accumulated.
    let mut raw: Vec<(NaiveDate, u8, String, Decimal, bool)> = Vec::new();

    for invoice in &tenant_invoices {
        if invoice.currency != currency {
            continue;
        }
        raw.push((
            invoice.issue_date,
            0,
            invoice.id.clone(),
            -invoice.total_amount,
            false,
        ));
    }

    for payment in payments {
        if payment.tenant_id != tenant_id {
            continue;
        }
        match payment.invoice_id.as_deref() {
            Some(invoice_id) => {
                let Some(invoice) = tenant_invoices
                    .iter()
                    .find(|invoice| invoice.id == invoice_id)
                else {
                    // Linked to a void or out-of-set invoice: excluded.
                    continue;
                };
                if invoice.currency != currency {
                    continue;
                }
                let (amount, rate_missing) = if payment.currency == currency {
                    (payment.amount, false)
                } else {
                    match transaction_rate(payment) {
                        Some(rate) => {
                            (convert(payment.amount, payment.currency, currency, rate), false)
                        }
                        None => {
                            warnings.push(Warning::unknown_rate(format!(
                                "payment {} has no usable rate",
                                payment.id
                            )));
                            (Decimal::ZERO, true)
                        }
                    }
                };
                raw.push((payment.received_date, 1, payment.id.clone(), amount, rate_missing));
            }
            None => {
                if payment.currency != currency {
                    continue;
                }
                raw.push((payment.received_date, 1, payment.id.clone(), payment.amount, false));
            }
        }
    }

    raw.sort_by(|a, b| (a.0, a.1, a.2.as_str()).cmp(&(b.0, b.1, b.2.as_str())));

    let mut running = Decimal::ZERO;
    let entries = raw
        .into_iter()
        .map(|(date, rank, source_id, amount, rate_missing)| {
            running += amount;
            LedgerEntry {
                date,
                kind: if rank == 0 {
                    LedgerEntryKind::InvoiceDebit
                } else {
                    LedgerEntryKind::PaymentCredit
                },
                source_id,
                amount,
                running_balance: running,
                rate_missing,
            }
        })
        .collect::<Vec<_>>();

    let mut outstanding = Decimal::ZERO;
    let mut overdue = false;
    for invoice in &tenant_invoices {
        if invoice.currency != currency {
            continue;
        }
        let linked_paid = linked_paid_converted(invoice, payments);
        if linked_paid < invoice.total_amount {
            outstanding += invoice.total_amount - linked_paid;
            if invoice.due_date < today {
                overdue = true;
            }
        }
    }

    TenantLedger {
        tenant_id: tenant_id.to_string(),
        currency,
        entries,
        running_balance: running,
        outstanding,
        overdue,
        warnings,
    }
}

/// Post-conversion paid amount summed only from payments linked to this
/// invoice, not the whole ledger.
fn linked_paid_converted(invoice: &Invoice, payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .filter(|payment| payment.invoice_id.as_deref() == Some(invoice.id.as_str()))
        .map(|payment| {
            if payment.currency == invoice.currency {
                payment.amount
            } else {
                transaction_rate(payment)
                    .map(|rate| convert(payment.amount, payment.currency, invoice.currency, rate))
                    .unwrap_or(Decimal::ZERO)
            }
        })
        .sum()
}
