//! Incremental search and media-set sync
//!
//! Every pass follows the same resume-key protocol: read the stored key,
//! fetch one batch from the provider with it, write the batch into the
//! cache and store the key the provider handed back. When the provider
//! hands back none, [`SYNC_COMPLETE_RESUME_KEY`] is stored and later passes
//! return without touching the provider. A failed fetch leaves the stored
//! key alone so the next pass retries the same batch.

use crate::error::{Result, SyncError};
use core_library::{LocalCacheStore, SearchHistoryEntry, SYNC_COMPLETE_RESUME_KEY};
use core_provider::{
    MimeTypeFilter, Provider, RemoteSourceClient, SearchRequest, SearchSuggestion, SuggestionType,
};
use core_runtime::events::{EventBus, PickerEvent, SyncEvent};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Media set listings are paged too; cap the pages one call follows.
const MAX_MEDIA_SET_PAGES: usize = 32;

/// Result of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        inserted: u64,
        skipped: usize,
        /// The provider has nothing further
        complete: bool,
    },
    /// An earlier pass already reached the end
    AlreadyComplete,
    /// The request is scoped to a different provider
    NotApplicable,
}

/// Runs sync passes against the cache store.
#[derive(Debug, Clone)]
pub struct SearchSyncWorker {
    store: LocalCacheStore,
    events: EventBus,
    page_size: usize,
}

impl SearchSyncWorker {
    pub fn new(store: LocalCacheStore, events: EventBus, page_size: usize) -> Self {
        Self {
            store,
            events,
            page_size,
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.events.emit(PickerEvent::Sync(event)).ok();
    }

    fn failed(&self, operation: &str, error: SyncError) -> SyncError {
        warn!(operation, error = %error, "Sync pass failed");
        self.emit(SyncEvent::Failed {
            operation: operation.to_string(),
            message: error.to_string(),
        });
        error
    }

    /// Record `request` and announce it to the providers.
    ///
    /// An equal request recorded earlier is reused. Returns its id.
    #[instrument(skip(self, client, request, providers))]
    pub async fn record_search_request(
        &self,
        client: &RemoteSourceClient,
        request: &SearchRequest,
        providers: &[Provider],
    ) -> Result<i64> {
        let search = self.store.search();
        let mut id = search.save_search_request(request).await?;
        if id == -1 {
            id = search
                .get_search_request_id(request)
                .await?
                .ok_or_else(|| SyncError::NotFound {
                    entity_type: "search request",
                    id: format!("{:?}", request.search_text()),
                })?;
            debug!(id, "Reusing recorded search request");
        }

        client
            .init_search(id, request, providers)
            .await
            .map_err(|e| self.failed("init_search", e.into()))?;
        search.save_search_history(request, None).await?;
        Ok(id)
    }

    /// One incremental pass of search results from `provider`.
    #[instrument(skip(self, client, provider), fields(authority = %provider.authority))]
    pub async fn sync_search_results(
        &self,
        client: &RemoteSourceClient,
        search_request_id: i64,
        provider: &Provider,
    ) -> Result<SyncOutcome> {
        let search = self.store.search();
        let request = search
            .get_search_request(search_request_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "search request",
                id: search_request_id.to_string(),
            })?;
        if request
            .authority()
            .is_some_and(|authority| authority != provider.authority)
        {
            return Ok(SyncOutcome::NotApplicable);
        }

        let resume_key = search
            .get_search_request_resume_key(search_request_id, &provider.authority)
            .await?;
        if resume_key.as_deref() == Some(SYNC_COMPLETE_RESUME_KEY) {
            return Ok(SyncOutcome::AlreadyComplete);
        }

        let page = client
            .fetch_search_results(
                &request,
                search_request_id,
                &provider.authority,
                resume_key.as_deref(),
                self.page_size,
            )
            .await
            .map_err(|e| self.failed("sync_search_results", e.into()))?;

        self.store.media().upsert_media(&page.items).await?;
        let inserted = search
            .cache_search_results(search_request_id, &provider.authority, &page.items)
            .await?;
        let complete = page.next_resume_key.is_none();
        let next_key = page
            .next_resume_key
            .as_deref()
            .unwrap_or(SYNC_COMPLETE_RESUME_KEY);
        search
            .update_search_request_resume_key(search_request_id, &provider.authority, Some(next_key))
            .await?;

        debug!(inserted, skipped = page.skipped, complete, "Synced search results");
        self.emit(SyncEvent::SearchResultsSynced {
            search_request_id,
            authority: provider.authority.clone(),
            inserted,
            complete,
        });
        Ok(SyncOutcome::Synced {
            inserted,
            skipped: page.skipped,
            complete,
        })
    }

    /// Cache every media set of `category_id` that `provider` lists.
    ///
    /// Returns the number of newly cached sets.
    #[instrument(skip(self, client, provider, mime_types), fields(authority = %provider.authority))]
    pub async fn sync_media_sets(
        &self,
        client: &RemoteSourceClient,
        category_id: &str,
        provider: &Provider,
        mime_types: &MimeTypeFilter,
    ) -> Result<u64> {
        let mut resume_key: Option<String> = None;
        let mut inserted = 0;

        for _ in 0..MAX_MEDIA_SET_PAGES {
            let page = client
                .fetch_media_sets(category_id, &provider.authority, mime_types, resume_key.as_deref())
                .await
                .map_err(|e| self.failed("sync_media_sets", e.into()))?;
            let batch = self
                .store
                .media_sets()
                .cache_media_sets(category_id, &provider.authority, mime_types, &page.items)
                .await?;
            inserted += batch;
            self.emit(SyncEvent::MediaSetsSynced {
                category_id: category_id.to_string(),
                authority: provider.authority.clone(),
                inserted: batch,
            });

            match page.next_resume_key {
                Some(next) if resume_key.as_deref() != Some(next.as_str()) => {
                    resume_key = Some(next)
                }
                _ => break,
            }
        }

        info!(inserted, "Synced media sets");
        Ok(inserted)
    }

    /// One incremental pass of a media set's content.
    #[instrument(skip(self, client))]
    pub async fn sync_media_in_media_set(
        &self,
        client: &RemoteSourceClient,
        media_set_picker_id: i64,
    ) -> Result<SyncOutcome> {
        let media_sets = self.store.media_sets();
        let media_set = media_sets
            .get_media_set(media_set_picker_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "media set",
                id: media_set_picker_id.to_string(),
            })?;

        let resume_key = media_sets
            .get_media_in_media_set_resume_key(media_set_picker_id)
            .await?;
        if resume_key.as_deref() == Some(SYNC_COMPLETE_RESUME_KEY) {
            return Ok(SyncOutcome::AlreadyComplete);
        }

        let page = client
            .fetch_media_set_content(&media_set, resume_key.as_deref(), self.page_size)
            .await
            .map_err(|e| self.failed("sync_media_in_media_set", e.into()))?;

        self.store.media().upsert_media(&page.items).await?;
        let inserted = media_sets
            .cache_media_of_media_set(media_set_picker_id, &page.items)
            .await?;
        let complete = page.next_resume_key.is_none();
        media_sets
            .update_media_in_media_set_resume_key(
                media_set_picker_id,
                Some(
                    page.next_resume_key
                        .as_deref()
                        .unwrap_or(SYNC_COMPLETE_RESUME_KEY),
                ),
            )
            .await?;

        self.emit(SyncEvent::MediaSetMediaSynced {
            media_set_picker_id,
            inserted,
            complete,
        });
        Ok(SyncOutcome::Synced {
            inserted,
            skipped: page.skipped,
            complete,
        })
    }

    /// Search suggestions for `prefix`: matching history first, then what
    /// the providers suggest.
    ///
    /// Zero-state suggestions (empty prefix) are cached per provider and
    /// served from the cache while the transport is unreachable.
    #[instrument(skip(self, client, providers))]
    pub async fn search_suggestions(
        &self,
        client: &RemoteSourceClient,
        prefix: &str,
        limit: usize,
        providers: &[Provider],
    ) -> Result<Vec<SearchSuggestion>> {
        let history = self.store.search().get_search_history(prefix, limit).await?;
        let mut suggestions: Vec<SearchSuggestion> =
            history.into_iter().map(history_suggestion).collect();

        let remaining = limit.saturating_sub(suggestions.len());
        if remaining == 0 {
            return Ok(suggestions);
        }

        let from_providers = match client
            .fetch_search_suggestions(prefix, remaining, providers)
            .await
        {
            Ok(fetched) => {
                if prefix.is_empty() {
                    self.cache_zero_state(&fetched, providers).await?;
                }
                fetched
            }
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "Serving cached suggestions");
                self.store
                    .suggestions()
                    .get_cached_suggestions(prefix, remaining)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        suggestions.extend(from_providers);
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    async fn cache_zero_state(
        &self,
        suggestions: &[SearchSuggestion],
        providers: &[Provider],
    ) -> Result<()> {
        let mut by_authority: BTreeMap<&str, Vec<SearchSuggestion>> = providers
            .iter()
            .map(|p| (p.authority.as_str(), Vec::new()))
            .collect();
        for suggestion in suggestions {
            if let Some(batch) = suggestion
                .authority
                .as_deref()
                .and_then(|authority| by_authority.get_mut(authority))
            {
                batch.push(suggestion.clone());
            }
        }
        for (authority, batch) in by_authority {
            self.store
                .suggestions()
                .cache_search_suggestions(authority, &batch)
                .await?;
        }
        Ok(())
    }
}

fn history_suggestion(entry: SearchHistoryEntry) -> SearchSuggestion {
    SearchSuggestion {
        search_text: entry.search_text,
        media_set_id: entry.media_set_id,
        authority: entry.authority,
        suggestion_type: SuggestionType::History,
        cover_media_id: entry.cover_media_id,
    }
}
