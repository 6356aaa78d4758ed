pub mod anomaly;
pub mod classifier;
pub mod export;
pub mod recognizer;
pub mod voucher;

pub use anomaly::{detect_anomalies, AnomalyFlag};
pub use classifier::{classify_expense, resolve_account};
pub use recognizer::GlmClient;
pub use voucher::generate_vouchers;
