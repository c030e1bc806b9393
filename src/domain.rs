//! Strongly-typed entities shared by every service, plus the submission
//! inputs accepted at the engine boundary. The stored invoice `status` is a
//! hint; the authoritative display status is always recomputed by
//! `services::invoice_status`.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{EngineError, EngineResult};

/// The two fixed currencies. Rates are expressed as DOP per USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Dop,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Dop => "DOP",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = EngineError;

    fn from_str(raw: &str) -> EngineResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "DOP" => Ok(Self::Dop),
            other => Err(EngineError::BadRequest(format!(
                "Unsupported currency '{other}'."
            ))),
        }
    }
}

/// A monetary amount. Amounts stay in full precision through intermediate
/// math; [`round2`] is applied only at the persistence/formatting edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }
}

/// Round half-up to two decimal places. Output-edge only.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Check,
    BankTransfer,
    Other,
}

/// Fee deduction treats cash-like receipts and bank transfers differently:
/// the management fee is only ever skimmed from cash-like DOP receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodClass {
    CashLike,
    BankTransfer,
}

impl PaymentMethod {
    pub fn class(self) -> MethodClass {
        match self {
            Self::BankTransfer => MethodClass::BankTransfer,
            Self::Cash | Self::Card | Self::Check | Self::Other => MethodClass::CashLike,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Check => "check",
            Self::BankTransfer => "bank_transfer",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = EngineError;

    fn from_str(raw: &str) -> EngineResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "check" => Ok(Self::Check),
            "bank_transfer" => Ok(Self::BankTransfer),
            "other" => Ok(Self::Other),
            other => Err(EngineError::BadRequest(format!(
                "Unsupported payment method '{other}'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Void => "void",
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = EngineError;

    fn from_str(raw: &str) -> EngineResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "void" => Ok(Self::Void),
            other => Err(EngineError::BadRequest(format!(
                "Unsupported invoice status '{other}'."
            ))),
        }
    }
}

/// A payment row. `invoice_id = None` means unlinked: the payment applies to
/// the tenant's balance generally, not a specific invoice. `exchange_rate`
/// (DOP per USD) is mandatory whenever the payment settles an invoice held
/// in the other currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub agency_id: String,
    pub lease_id: String,
    pub tenant_id: String,
    pub property_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub received_date: NaiveDate,
    pub reference: Option<String>,
    pub invoice_id: Option<String>,
    pub exchange_rate: Option<Decimal>,
}

/// An invoice with its matched payments, as read from storage. The `status`
/// field is a stored hint only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub agency_id: String,
    pub lease_id: String,
    pub tenant_id: String,
    pub property_id: String,
    pub currency: Currency,
    pub total_amount: Decimal,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub payments: Vec<Payment>,
}

impl Invoice {
    pub fn is_void(&self) -> bool {
        self.status == InvoiceStatus::Void
    }
}

/// `ownership_percent = None` means "unspecified share", treated as 100% for
/// allocation. Percentages are deliberately not required to sum to 100; the
/// engine surfaces an `InconsistentOwnership` warning and never normalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyOwnership {
    pub agency_id: String,
    pub property_id: String,
    pub owner_id: String,
    pub ownership_percent: Option<Decimal>,
}

/// One historical exchange-rate observation (DOP per USD). A rate of zero or
/// an absent rate means "unknown", never "free".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    pub agency_id: String,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub payment_id: Option<String>,
}

/// Revenue split by method class and currency. Fee computation needs cash
/// and transfer receipts separated per currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueTotals {
    pub cash_usd: Decimal,
    pub cash_dop: Decimal,
    pub transfer_usd: Decimal,
    pub transfer_dop: Decimal,
}

impl RevenueTotals {
    pub fn add(&mut self, amount: Decimal, currency: Currency, class: MethodClass) {
        match (class, currency) {
            (MethodClass::CashLike, Currency::Usd) => self.cash_usd += amount,
            (MethodClass::CashLike, Currency::Dop) => self.cash_dop += amount,
            (MethodClass::BankTransfer, Currency::Usd) => self.transfer_usd += amount,
            (MethodClass::BankTransfer, Currency::Dop) => self.transfer_dop += amount,
        }
    }

    pub fn usd_total(&self) -> Decimal {
        self.cash_usd + self.transfer_usd
    }

    pub fn dop_total(&self) -> Decimal {
        self.cash_dop + self.transfer_dop
    }

    pub fn is_zero(&self) -> bool {
        self.usd_total().is_zero() && self.dop_total().is_zero()
    }

    pub fn rounded(&self) -> Self {
        Self {
            cash_usd: round2(self.cash_usd),
            cash_dop: round2(self.cash_dop),
            transfer_usd: round2(self.transfer_usd),
            transfer_dop: round2(self.transfer_dop),
        }
    }
}

/// An immutable-once-created period snapshot. `owner_id = None` is the
/// agency-wide manager report; `Some(owner)` is one owner's statement.
/// Regeneration for the same `(agency, period)` key is delete-then-insert,
/// never an update; ids are derived from the key so a re-run over identical
/// source data reproduces identical rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub id: String,
    pub agency_id: String,
    pub owner_id: Option<String>,
    pub month: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub avg_rate: Option<Decimal>,
    pub fee_percent: Decimal,
    pub cash_usd: Decimal,
    pub cash_dop: Decimal,
    pub transfer_usd: Decimal,
    pub transfer_dop: Decimal,
    pub usd_total: Decimal,
    pub dop_total: Decimal,
    pub fee_base: Decimal,
    pub fee_amount: Decimal,
    pub fee_deducted: Decimal,
    pub balance_due: Decimal,
    pub rate_missing: bool,
}

/// Append-only audit record. The detail mirrors the snapshot's key fields,
/// not a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: String,
    pub agency_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    Accountant,
    Viewer,
}

/// Explicit caller identity. The engine never inspects ambient session
/// state; every privileged operation takes one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
    pub role: CallerRole,
}

pub fn require_role(caller: &CallerContext, allowed: &[CallerRole]) -> EngineResult<()> {
    if allowed.contains(&caller.role) {
        return Ok(());
    }
    Err(EngineError::Forbidden(format!(
        "Forbidden: role '{:?}' is not allowed for this action.",
        caller.role
    )))
}

/// Fields shared by every payment row produced from one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PaymentDetails {
    #[validate(length(min = 1, max = 255))]
    pub lease_id: String,
    #[validate(length(min = 1, max = 255))]
    pub tenant_id: String,
    #[validate(length(min = 1, max = 255))]
    pub property_id: String,
    pub method: PaymentMethod,
    pub received_date: NaiveDate,
    pub reference: Option<String>,
}

/// A single payment leg as entered by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub details: PaymentDetails,
    pub amount: Decimal,
    pub currency: Currency,
    pub exchange_rate: Option<Decimal>,
}

/// How one submitted payment is applied, selected by the caller based on how
/// many invoices are targeted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentSubmission {
    /// One row, no invoice association. Always legal, no rate requirement.
    Unlinked { draft: PaymentDraft },
    /// One row linked to one invoice, full or partial amount.
    SingleInvoice {
        invoice_id: String,
        draft: PaymentDraft,
    },
    /// Two rows against one invoice, one per currency, sharing date, method
    /// and reference. Each leg is rate-checked independently; a zero leg
    /// produces no row, but at least one leg must be positive.
    CurrencySplit {
        invoice_id: String,
        details: PaymentDetails,
        usd_amount: Decimal,
        usd_rate: Option<Decimal>,
        dop_amount: Decimal,
        dop_rate: Option<Decimal>,
    },
    /// One row per selected invoice, each at that invoice's full total
    /// converted through a single shared rate. No partial amounts.
    SettleInFull {
        invoice_ids: Vec<String>,
        details: PaymentDetails,
        pay_currency: Currency,
        exchange_rate: Option<Decimal>,
    },
}

pub fn validate_input<T: Validate>(input: &T) -> EngineResult<()> {
    input
        .validate()
        .map_err(|errors| EngineError::BadRequest(format!("Validation failed: {errors}")))
}
