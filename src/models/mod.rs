pub mod invoice;
pub mod voucher;

pub use invoice::{
    parse_invoice_date, CategorySummary, InvoiceRecord, InvoiceUpdate, RecognizedInvoice,
};
pub use voucher::{VoucherEntry, DIRECTION_CREDIT, DIRECTION_DEBIT};
