/// Search horizon used when advancing a recurring series.
///
/// Long enough to reach yearly-sparse patterns such as "the 31st".
pub const SERIES_HORIZON_DAYS: u32 = 365;

/// Search horizon used when booking a slot on demand: the start day plus one full week.
pub const BOOKING_HORIZON_DAYS: u32 = 8;

/// Default number of recurrence groups processed concurrently by one pass.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Prefix of the payment reference attached to ledger entries for an occurrence.
pub const OCCURRENCE_REFERENCE_PREFIX: &str = "occurrence";

/// Ledger API route components
pub const LEDGER_CHARGES_PATH: &str = "/charges";
pub const LEDGER_REFUNDS_PATH: &str = "/refunds";
pub const LEDGER_PAYMENTS_PATH: &str = "/payments";
pub const LEDGER_PAYMENT_CHECK_PATH: &str = const_str::concat!(LEDGER_PAYMENTS_PATH, "/check");

/// Directory API route components
pub const DIRECTORY_USERS_PATH: &str = "/users";
pub const DIRECTORY_COMMUNITIES_PATH: &str = "/communities";
