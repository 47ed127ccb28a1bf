use serde::Serialize;

use crate::client::services::error_handler::ErrorDescriptor;
use crate::client::services::loading::LoadingTracker;
use crate::client::utils::formatters::{aggregate_by_region, ChartData};
use crate::common::models::{ExpenseDetail, OperatorRecord, RegionExpense};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page size must be greater than zero")]
pub struct InvalidPageSize;

/// Paginazione corrente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageState {
    current_page: u32,
    page_size: u32,
    total_count: u64,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            current_page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_count: 0,
        }
    }
}

impl PageState {
    pub fn new(page_size: u32) -> Result<Self, InvalidPageSize> {
        let mut state = Self::default();
        state.set_page_size(page_size)?;
        Ok(state)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Pages start at 1; anything lower is clamped.
    pub fn set_current_page(&mut self, page: u32) {
        self.current_page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), InvalidPageSize> {
        if page_size == 0 {
            return Err(InvalidPageSize);
        }
        self.page_size = page_size;
        Ok(())
    }

    pub fn set_total_count(&mut self, total: u64) {
        self.total_count = total;
    }

    /// ceil(total_count / page_size); always derived, never stored.
    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.current_page) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

/// Ricerca attiva sul batch grande del server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchState {
    pub query: String,
    pub is_active: bool,
}

impl SearchState {
    pub fn active(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            is_active: true,
        }
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.is_active = false;
    }
}

/// Snapshot of everything the store holds. `operators` is either the last
/// server page (search inactive) or the filtered search result (search active).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreState {
    pub operators: Vec<OperatorRecord>,
    pub expense_detail: Option<ExpenseDetail>,
    pub region_expenses: Vec<RegionExpense>,
    pub page: PageState,
    pub search: SearchState,
    /// Term for the in-memory view filter; independent of `search`.
    pub local_filter: String,
    pub error: Option<ErrorDescriptor>,
    pub loading: LoadingTracker,
}

impl StoreState {
    pub fn with_page_size(page_size: u32) -> Result<Self, InvalidPageSize> {
        Ok(Self {
            page: PageState::new(page_size)?,
            ..Self::default()
        })
    }

    /// Loaded operators narrowed by `local_filter` (case-insensitive, name or CNPJ).
    pub fn filtered_operators(&self) -> Vec<&OperatorRecord> {
        if self.local_filter.is_empty() {
            return self.operators.iter().collect();
        }
        self.operators.iter().filter(|op| op.matches_term(&self.local_filter)).collect()
    }

    pub fn total_pages(&self) -> u64 {
        self.page.total_pages()
    }

    pub fn is_busy(&self) -> bool {
        self.loading.any_loading()
    }

    pub fn is_loading(&self, operation: &str) -> bool {
        self.loading.is_loading(operation)
    }

    /// Chart from the server-side aggregate by UF.
    pub fn region_chart(&self) -> ChartData {
        aggregate_by_region(&self.region_expenses)
    }

    /// Chart from the operators currently listed.
    pub fn page_region_chart(&self) -> ChartData {
        aggregate_by_region(&self.operators)
    }
}
