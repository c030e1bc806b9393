pub mod audit;
pub mod fees;
pub mod invoice_status;
pub mod ledger;
pub mod ownership;
pub mod payment_allocation;
pub mod rates;
pub mod report_snapshots;
