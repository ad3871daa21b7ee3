//! Debounced autosuggest for search boxes
//!
//! Feed every keystroke to [`AutosuggestHelper::update`]. Input that cannot be an
//! address is answered immediately with an empty list; anything else is sent after
//! a short quiet period, and a newer update cancels the pending one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiRequest, AutosuggestSelectionRequest, SourceApi, What3WordsV3};
use crate::error::{Error, Result};
use crate::options::AutosuggestOptions;
use crate::runtime;
use crate::text::{did_you_mean_3wa, is_possible_3wa, normalize_delimiters};
use crate::types::{Location, Suggestion};
use crate::voice::{Dispatcher, InlineDispatcher};

/// Quiet period before a query is sent
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// How a raw query will be searched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Well formed address, searched as typed
    Address(String),
    /// Loosely delimited words; only an exact match is reported
    DidYouMean(String),
    /// Loosely delimited words searched like a full address
    Flexible(String),
    /// Not an address; no request is made
    Skip,
}

/// Decide how to search `text`
pub fn classify(text: &str, allow_flexible_delimiters: bool) -> Query {
    if is_possible_3wa(text) {
        Query::Address(text.to_string())
    } else if did_you_mean_3wa(text) {
        let normalized = normalize_delimiters(text);
        if allow_flexible_delimiters {
            Query::Flexible(normalized)
        } else {
            Query::DidYouMean(normalized)
        }
    } else {
        Query::Skip
    }
}

/// What a finished update produced
#[derive(Debug)]
pub enum AutosuggestOutcome {
    Suggestions(Vec<Suggestion>),
    DidYouMean(Suggestion),
    Failed(Error),
}

pub struct AutosuggestHelper {
    client: What3WordsV3,
    options: Mutex<Option<AutosuggestOptions>>,
    allow_flexible_delimiters: AtomicBool,
    debounce: Duration,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Option<Handle>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutosuggestHelper {
    pub fn new(client: What3WordsV3) -> Self {
        Self {
            client,
            options: Mutex::new(None),
            allow_flexible_delimiters: AtomicBool::new(false),
            debounce: DEFAULT_DEBOUNCE,
            dispatcher: Arc::new(InlineDispatcher),
            runtime: None,
            pending: Mutex::new(None),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Filters applied to every search
    pub fn set_options(&self, options: AutosuggestOptions) -> Result<()> {
        options.validate()?;
        *self.options.lock() = Some(options);
        Ok(())
    }

    /// Treat loosely delimited input as a full search instead of a did-you-mean
    pub fn allow_flexible_delimiters(&self, allow: bool) {
        self.allow_flexible_delimiters.store(allow, Ordering::Relaxed);
    }

    /// Search for `text` after the debounce period, superseding any pending search.
    ///
    /// `callback` runs at most once. A did-you-mean search without an exact match
    /// never calls it.
    pub fn update(
        &self,
        text: &str,
        callback: impl FnOnce(AutosuggestOutcome) + Send + 'static,
    ) -> Result<()> {
        let query = classify(text, self.allow_flexible_delimiters.load(Ordering::Relaxed));

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        if query == Query::Skip {
            debug!("Autosuggest skipped: input is not an address");
            self.dispatcher.dispatch(Box::new(move || {
                callback(AutosuggestOutcome::Suggestions(Vec::new()))
            }));
            return Ok(());
        }

        let handle = match &self.runtime {
            Some(handle) => handle.clone(),
            None => runtime::handle()?,
        };
        let client = self.client.clone();
        let options = self.options.lock().clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let debounce = self.debounce;

        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(outcome) = search(&client, query, options.as_ref()).await {
                dispatcher.dispatch(Box::new(move || callback(outcome)));
            }
        }));
        Ok(())
    }

    /// Cancel the pending search, if any
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    /// Report that `suggestion` was picked for `raw_input`.
    ///
    /// The report is sent in the background; a failed report is only logged.
    pub fn selected(&self, raw_input: &str, suggestion: &Suggestion) -> Result<()> {
        let handle = match &self.runtime {
            Some(handle) => handle.clone(),
            None => runtime::handle()?,
        };
        let report = self.selection_report(raw_input, suggestion);
        handle.spawn(send_report(report));
        Ok(())
    }

    /// Report the pick, then resolve it to coordinates.
    ///
    /// The conversion counts against the API quota.
    pub async fn selected_with_coordinates(
        &self,
        raw_input: &str,
        suggestion: &Suggestion,
    ) -> Result<Location> {
        send_report(self.selection_report(raw_input, suggestion)).await;
        self.client
            .convert_to_coordinates(suggestion.words.as_str())
            .send()
            .await
    }

    fn selection_report(&self, raw_input: &str, suggestion: &Suggestion) -> AutosuggestSelectionRequest {
        let mut report = self.client.autosuggestion_selection(
            raw_input,
            suggestion.words.as_str(),
            suggestion.rank,
            SourceApi::Text,
        );
        if let Some(options) = self.options.lock().as_ref() {
            report = report.options(options);
        }
        report
    }
}

async fn send_report(report: AutosuggestSelectionRequest) {
    if let Err(e) = report.send().await {
        warn!("Autosuggest selection report failed: {}", e);
    }
}

impl Drop for AutosuggestHelper {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run a classified query. `None` when there is nothing to report.
pub async fn search(
    client: &What3WordsV3,
    query: Query,
    options: Option<&AutosuggestOptions>,
) -> Option<AutosuggestOutcome> {
    let (input, did_you_mean) = match query {
        Query::Address(input) | Query::Flexible(input) => (input, false),
        Query::DidYouMean(input) => (input, true),
        Query::Skip => return Some(AutosuggestOutcome::Suggestions(Vec::new())),
    };

    let mut request = client.autosuggest(input.as_str());
    if let Some(options) = options {
        request = request.options(options);
    }

    let suggestions = match request.send().await {
        Ok(suggestions) => suggestions,
        Err(err) => return Some(AutosuggestOutcome::Failed(err)),
    };

    if !did_you_mean {
        return Some(AutosuggestOutcome::Suggestions(suggestions));
    }

    let wanted = input.to_lowercase();
    suggestions
        .into_iter()
        .find(|suggestion| suggestion.words.to_lowercase() == wanted)
        .map(AutosuggestOutcome::DidYouMean)
}
