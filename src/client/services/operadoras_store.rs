//! Store delle operadoras: orchestrates API calls and owns the view state.
//!
//! The store is an explicit context object: the UI owns it (usually behind
//! an `Arc`) and calls its actions; nothing here is global. Actions take
//! `&self` and only hold the state lock between awaits, so independent
//! actions can interleave. Every request is numbered per channel and a
//! response older than the one already applied is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::client::config::{ClientConfig, MAX_SEARCH_BATCH};
use crate::client::models::app_state::{InvalidPageSize, SearchState, StoreState};
use crate::client::models::messages::StoreEvent;
use crate::client::services::api_client::{ListQuery, OperadorasApi};
use crate::client::services::error_handler::{ErrorDescriptor, ErrorHandler, ErrorKind, FetchError};
use crate::client::services::request_sequence::{Channel, RequestSequencer};

/// Busy-flag names used in `StoreState::loading`.
pub mod ops {
    pub const OPERATORS: &str = "operators";
    pub const SEARCH: &str = "search";
    pub const EXPENSE_DETAIL: &str = "expense_detail";
    pub const REGION_EXPENSES: &str = "region_expenses";
}

/// What happened to an action's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    Failed,
    /// A newer response on the same channel had already been applied.
    Discarded,
}

struct Inner {
    state: StoreState,
    errors: ErrorHandler,
    sequencer: RequestSequencer,
    /// Request that owns each busy flag; only that one may clear it.
    busy_owner: HashMap<&'static str, u64>,
    listeners: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl Inner {
    fn emit(&mut self, event: StoreEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_loading(&mut self, operation: &'static str, active: bool) {
        if self.state.loading.is_loading(operation) == active {
            return;
        }
        self.state.loading.set_loading(operation, active);
        debug!("busy: {:?}", self.state.loading.active());
        self.emit(StoreEvent::LoadingChanged {
            operation: operation.to_string(),
            active,
        });
    }

    fn begin(&mut self, channel: Channel, operation: &'static str) -> u64 {
        let seq = self.sequencer.issue(channel);
        self.busy_owner.insert(operation, seq);
        self.set_loading(operation, true);
        debug!("{} #{} started ({})", channel, seq, operation);
        seq
    }

    /// Clears the busy flag if `seq` still owns it and says whether the
    /// response may be applied.
    fn finish(&mut self, channel: Channel, operation: &'static str, seq: u64) -> bool {
        if self.busy_owner.get(operation) == Some(&seq) {
            self.busy_owner.remove(operation);
            self.set_loading(operation, false);
        }
        if self.sequencer.accept(channel, seq) {
            return true;
        }
        warn!("Discarding stale {} response #{} ({})", channel, seq, operation);
        self.emit(StoreEvent::StaleResponseDiscarded { channel, seq });
        false
    }

    /// Only the visible error goes; the handler keeps it as history.
    fn clear_error(&mut self) {
        if self.state.error.take().is_some() {
            self.emit(StoreEvent::ErrorCleared);
        }
    }

    /// Records a store-level error; `details` carries the classified cause.
    fn raise(&mut self, kind: ErrorKind, message: &str, cause: &FetchError) {
        let details = ErrorHandler::classify(Some(cause)).map(|d| d.message).unwrap_or_default();
        let descriptor = ErrorDescriptor::new(kind, message, details);
        self.errors.record(Some(descriptor.clone()));
        if self.errors.error_changed() {
            error!("{}", descriptor);
        } else {
            warn!("{} (repeated)", descriptor);
        }
        self.state.error = Some(descriptor.clone());
        self.emit(StoreEvent::ErrorRaised(descriptor));
    }
}

pub struct OperadorasStore<A> {
    api: Arc<A>,
    inner: Mutex<Inner>,
    search_batch_limit: u32,
}

impl<A: OperadorasApi> OperadorasStore<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::from_parts(api, StoreState::default(), MAX_SEARCH_BATCH)
    }

    pub fn with_config(api: Arc<A>, config: &ClientConfig) -> Result<Self, InvalidPageSize> {
        let state = StoreState::with_page_size(config.page_size)?;
        Ok(Self::from_parts(api, state, config.search_batch_limit.clamp(1, MAX_SEARCH_BATCH)))
    }

    fn from_parts(api: Arc<A>, state: StoreState, search_batch_limit: u32) -> Self {
        Self {
            api,
            inner: Mutex::new(Inner {
                state,
                errors: ErrorHandler::new(),
                sequencer: RequestSequencer::new(),
                busy_owner: HashMap::new(),
                listeners: Vec::new(),
            }),
            search_batch_limit,
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Receives every state change from now on.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().await.listeners.push(tx);
        rx
    }

    pub async fn snapshot(&self) -> StoreState {
        self.inner.lock().await.state.clone()
    }

    /// The error that was current before the present one.
    pub async fn previous_error(&self) -> Option<ErrorDescriptor> {
        self.inner.lock().await.errors.previous().cloned()
    }

    /// Loads one server page. On success the region chart is refreshed too;
    /// on failure the previous list stays and a CARREGAMENTO error is set.
    pub async fn load_operators(&self, page: u32) -> ActionOutcome {
        let page = page.max(1);
        let (seq, limit) = {
            let mut inner = self.inner.lock().await;
            inner.clear_error();
            let seq = inner.begin(Channel::Listing, ops::OPERATORS);
            (seq, inner.state.page.page_size())
        };

        info!("Loading operators page {} (limit {})", page, limit);
        let result = self.api.list_operators(&ListQuery::page(page, limit)).await;

        let outcome = {
            let mut inner = self.inner.lock().await;
            if !inner.finish(Channel::Listing, ops::OPERATORS, seq) {
                return ActionOutcome::Discarded;
            }
            match result {
                Ok(response) => {
                    info!("Loaded {} operators (total {})", response.data.len(), response.total);
                    inner.state.operators = response.data;
                    inner.state.page.set_total_count(response.total);
                    inner.state.page.set_current_page(page);
                    if inner.state.search != SearchState::default() {
                        inner.state.search.clear();
                        inner.emit(StoreEvent::SearchCleared);
                    }
                    inner.emit(StoreEvent::OperatorsLoaded {
                        page,
                        total: response.total,
                    });
                    ActionOutcome::Applied
                }
                Err(e) => {
                    inner.raise(ErrorKind::Carregamento, "Erro ao carregar operadoras", &e);
                    ActionOutcome::Failed
                }
            }
        };

        if outcome == ActionOutcome::Applied {
            self.load_region_expenses().await;
        }
        outcome
    }

    /// Refreshes the expense-by-UF aggregate. Failures are only logged:
    /// the chart is secondary and must not replace the current error.
    pub async fn load_region_expenses(&self) -> ActionOutcome {
        let seq = self.inner.lock().await.begin(Channel::Regions, ops::REGION_EXPENSES);
        let result = self.api.region_expenses().await;

        let mut inner = self.inner.lock().await;
        if !inner.finish(Channel::Regions, ops::REGION_EXPENSES, seq) {
            return ActionOutcome::Discarded;
        }
        match result {
            Ok(response) => {
                let mut regions = response.data;
                regions.sort_by(|a, b| a.region_code.cmp(&b.region_code));
                info!("Region expenses loaded: {}", regions.len());
                let count = regions.len();
                inner.state.region_expenses = regions;
                inner.emit(StoreEvent::RegionExpensesLoaded { regions: count });
                ActionOutcome::Applied
            }
            Err(e) => {
                error!("Failed to load region expenses: {}", e);
                ActionOutcome::Failed
            }
        }
    }

    /// Searches by legal name or CNPJ across a large batch fetched from the
    /// server, filtered here. An empty term goes back to page 1.
    pub async fn search_operators(&self, term: &str) -> ActionOutcome {
        if term.is_empty() {
            // the search stays active until page 1 actually arrives
            return self.load_operators(1).await;
        }

        let seq = {
            let mut inner = self.inner.lock().await;
            inner.clear_error();
            inner.begin(Channel::Listing, ops::SEARCH)
        };

        let result = self
            .api
            .list_operators(&ListQuery::page(1, self.search_batch_limit))
            .await;

        let mut inner = self.inner.lock().await;
        if !inner.finish(Channel::Listing, ops::SEARCH, seq) {
            return ActionOutcome::Discarded;
        }
        match result {
            Ok(response) => {
                let fetched = response.data.len();
                if response.total > fetched as u64 {
                    warn!("Search batch covers {} of {} operators", fetched, response.total);
                }
                let matches: Vec<_> = response.data.into_iter().filter(|op| op.matches_term(term)).collect();
                info!("Search '{}': {} of {} fetched operators match", term, matches.len(), fetched);

                let count = matches.len();
                inner.state.operators = matches;
                inner.state.page.set_total_count(count as u64);
                inner.state.page.set_current_page(1);
                inner.state.search = SearchState::active(term);
                inner.emit(StoreEvent::SearchCompleted {
                    term: term.to_string(),
                    matches: count,
                });
                ActionOutcome::Applied
            }
            Err(e) => {
                inner.raise(ErrorKind::Busca, "Erro ao buscar operadoras", &e);
                ActionOutcome::Failed
            }
        }
    }

    /// Fetches the expense history of one operator into the single-slot cache.
    pub async fn load_expense_detail(&self, cnpj: &str) -> ActionOutcome {
        let seq = {
            let mut inner = self.inner.lock().await;
            inner.clear_error();
            inner.begin(Channel::Detail, ops::EXPENSE_DETAIL)
        };

        let result = self.api.expense_detail(cnpj).await;

        let mut inner = self.inner.lock().await;
        if !inner.finish(Channel::Detail, ops::EXPENSE_DETAIL, seq) {
            return ActionOutcome::Discarded;
        }
        match result {
            Ok(detail) => {
                debug!("Expense detail for {}: {} entries", cnpj, detail.historico.len());
                inner.state.expense_detail = Some(detail);
                inner.emit(StoreEvent::ExpenseDetailLoaded { cnpj: cnpj.to_string() });
                ActionOutcome::Applied
            }
            Err(e) => {
                inner.raise(ErrorKind::Despesas, "Erro ao carregar despesas", &e);
                ActionOutcome::Failed
            }
        }
    }

    /// Next server page; `None` at the last page or while a search is shown.
    pub async fn next_page(&self) -> Option<ActionOutcome> {
        let target = {
            let inner = self.inner.lock().await;
            let page = inner.state.page;
            (!inner.state.search.is_active && page.has_next()).then(|| page.current_page() + 1)
        };
        match target {
            Some(page) => Some(self.load_operators(page).await),
            None => None,
        }
    }

    /// Previous server page; `None` on page 1 or while a search is shown.
    pub async fn previous_page(&self) -> Option<ActionOutcome> {
        let target = {
            let inner = self.inner.lock().await;
            let page = inner.state.page;
            (!inner.state.search.is_active && page.has_previous()).then(|| page.current_page() - 1)
        };
        match target {
            Some(page) => Some(self.load_operators(page).await),
            None => None,
        }
    }

    /// Changes the page size used by the next load. Zero is rejected.
    pub async fn set_page_size(&self, page_size: u32) -> Result<(), InvalidPageSize> {
        let mut inner = self.inner.lock().await;
        inner.state.page.set_page_size(page_size)?;
        inner.emit(StoreEvent::PageSizeChanged { page_size });
        Ok(())
    }

    /// Term for `StoreState::filtered_operators`; no request is made.
    pub async fn set_local_filter(&self, term: &str) {
        let mut inner = self.inner.lock().await;
        inner.state.local_filter = term.to_string();
        inner.emit(StoreEvent::LocalFilterChanged { term: term.to_string() });
    }

    pub async fn clear_error(&self) {
        self.inner.lock().await.clear_error();
    }

    /// Back to an empty first page. Requests still in flight are ignored
    /// when they come back.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.operators.clear();
        inner.state.expense_detail = None;
        inner.state.search.clear();
        inner.state.local_filter.clear();
        inner.state.page.set_current_page(1);
        inner.state.page.set_total_count(0);
        inner.state.error = None;
        inner.errors.clear();
        inner.sequencer.invalidate_all();
        info!("Store reset");
        inner.emit(StoreEvent::Reset);
    }
}
