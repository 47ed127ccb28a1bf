use crate::client::services::error_handler::ErrorDescriptor;
use crate::client::services::request_sequence::Channel;

/// Notifiche emesse dallo store ad ogni cambio di stato
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    OperatorsLoaded { page: u32, total: u64 },
    SearchCompleted { term: String, matches: usize },
    SearchCleared,
    ExpenseDetailLoaded { cnpj: String },
    RegionExpensesLoaded { regions: usize },
    ErrorRaised(ErrorDescriptor),
    ErrorCleared,
    LoadingChanged { operation: String, active: bool },
    LocalFilterChanged { term: String },
    PageSizeChanged { page_size: u32 },
    /// A response arrived after a newer one was already applied.
    StaleResponseDiscarded { channel: Channel, seq: u64 },
    Reset,
}
