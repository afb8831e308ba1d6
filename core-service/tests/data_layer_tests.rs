//! Integration tests for the data layer façade
//!
//! These tests run a [`DataLayer`] on an in-memory cache against a scripted
//! in-process transport:
//! - Paging sources follow transport switches and provider list changes
//! - Content notifications invalidate the matching paging sources
//! - A provider collection reset drops that provider's cached rows
//! - Pass-through operations (pre-granted count, URI lookup, allow-list)
//! - Search operations respect the feature flag

use async_trait::async_trait;
use bridge_local::{InProcessTransport, StaticPackageResolver};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::packages::{PackageResolver, ProviderCandidate};
use bridge_traits::row::{row_of, Bundle, QueryResult, Row, RowExt, RowValue};
use bridge_traits::transport::UserId;
use core_provider::columns::{args, columns as col, methods, queries, topics};
use core_provider::{
    MediaSource, MimeTypeFilter, PageRequest, Provider, SearchRequest, SyncedMedia,
};
use core_runtime::config::PickerConfig;
use core_runtime::events::{AvailabilityEvent, PickerEvent};
use core_service::{CoreError, DataLayer, SyncOutcome};
use mockall::mock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const LOCAL: &str = "local";
const CLOUD: &str = "cloud.a";

// ============================================================================
// Helpers
// ============================================================================

mock! {
    pub Resolver {}

    #[async_trait]
    impl PackageResolver for Resolver {
        async fn resolve_media_providers(&self, user: UserId) -> BridgeResult<Vec<ProviderCandidate>>;
    }
}

fn config() -> core_runtime::config::PickerConfigBuilder {
    PickerConfig::builder()
        .local_authority(LOCAL)
        .allowed_cloud_provider(CLOUD)
        .refresh_timeout(Duration::from_secs(2))
        .package_resolver(Arc::new(StaticPackageResolver::new(Vec::new())))
}

async fn layer() -> DataLayer {
    DataLayer::new(config().build().unwrap()).await.unwrap()
}

fn source_of(authority: &str) -> MediaSource {
    if authority == LOCAL {
        MediaSource::Local
    } else {
        MediaSource::Remote
    }
}

fn provider(authority: &str) -> Provider {
    Provider {
        authority: authority.to_string(),
        media_source: source_of(authority),
        uid: 10_000,
        display_name: authority.to_string(),
    }
}

fn reports(transport: &InProcessTransport, authorities: &[&str]) {
    let rows = authorities
        .iter()
        .map(|a| {
            row_of([
                (col::AUTHORITY, RowValue::from(*a)),
                (col::MEDIA_SOURCE, RowValue::from(source_of(a).as_str())),
                (col::UID, RowValue::Integer(10_000)),
            ])
        })
        .collect();
    transport.set_rows(queries::AVAILABLE_PROVIDERS, rows);
}

fn transport(authorities: &[&str]) -> Arc<InProcessTransport> {
    let transport = Arc::new(InProcessTransport::new(UserId(0)));
    reports(&transport, authorities);
    transport
}

fn media_row(id: &str, authority: &str, picker_id: i64, date_taken_ms: i64) -> Row {
    row_of([
        (col::MEDIA_ID, RowValue::from(id)),
        (col::PICKER_ID, RowValue::Integer(picker_id)),
        (col::AUTHORITY, RowValue::from(authority)),
        (col::MEDIA_SOURCE, RowValue::from(source_of(authority).as_str())),
        (col::MEDIA_URI, RowValue::Text(format!("content://{authority}/{id}"))),
        (col::DATE_TAKEN, RowValue::Integer(date_taken_ms)),
        (col::MIME_TYPE, RowValue::from("image/jpeg")),
    ])
}

fn collection_row(authority: &str, collection_id: &str) -> Row {
    row_of([
        (col::AUTHORITY, RowValue::from(authority)),
        (col::COLLECTION_ID, RowValue::from(collection_id)),
        (col::ACCOUNT_NAME, RowValue::from("someone@example.com")),
    ])
}

async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

// ============================================================================
// Availability and paging
// ============================================================================

#[tokio::test]
async fn test_operations_without_transport() {
    let layer = layer().await;

    assert!(layer.providers().is_empty());
    assert!(matches!(
        layer.ensure_providers().await,
        Err(CoreError::NoActiveTransport)
    ));
    assert!(matches!(
        layer.get_collection_info(&provider(CLOUD)).await,
        Err(CoreError::NoActiveTransport)
    ));
}

#[tokio::test]
async fn test_provider_change_replaces_paging_sources() {
    let layer = layer().await;
    let transport = transport(&[LOCAL]);
    transport.set_rows(
        queries::MEDIA,
        vec![media_row("1", LOCAL, 1, 200), media_row("2", LOCAL, 2, 100)],
    );

    layer.set_active_transport(transport.clone());
    let before = layer.media_paging_source();
    within("provider list re-point", before.invalidated()).await;

    let after = layer.media_paging_source();
    assert_ne!(before.id(), after.id());
    let page = after.load(PageRequest::first(10)).await.into_page().unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(layer.observer_count(), 3);
}

fn queried_authorities(transport: &InProcessTransport) -> Vec<String> {
    transport
        .queries(queries::MEDIA)
        .iter()
        .chain(transport.calls(methods::MEDIA_INIT).iter())
        .flat_map(|bundle| bundle.text_list(args::PROVIDERS).unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_switch_never_queries_previous_profile_providers() {
    let layer = layer().await;
    let first = transport(&[LOCAL, CLOUD]);
    layer.set_active_transport(first);
    layer.settled().await;
    assert_eq!(layer.providers().len(), 2);

    let second = transport(&[LOCAL]);
    second.set_rows(queries::MEDIA, vec![media_row("1", LOCAL, 1, 100)]);
    second.set_delay(queries::AVAILABLE_PROVIDERS, Duration::from_millis(200));
    layer.set_active_transport(second.clone());

    let source = layer.media_paging_source();
    let _ = source.load(PageRequest::first(10)).await;
    assert!(!queried_authorities(&second).contains(&CLOUD.to_string()));

    within("provider list re-point", source.invalidated()).await;
    let page = layer
        .media_paging_source()
        .load(PageRequest::first(10))
        .await
        .into_page()
        .unwrap();
    assert_eq!(page.items.len(), 1);

    let authorities = queried_authorities(&second);
    assert!(authorities.contains(&LOCAL.to_string()));
    assert!(!authorities.contains(&CLOUD.to_string()));
}

#[tokio::test]
async fn test_media_notification_invalidates_media_source() {
    let layer = layer().await;
    let transport = transport(&[LOCAL]);
    layer.set_active_transport(transport.clone());
    within("provider list re-point", layer.media_paging_source().invalidated()).await;

    let source = layer.media_paging_source();
    assert_eq!(transport.notify_change(topics::MEDIA_UPDATE), 1);
    within("media invalidation", source.invalidated()).await;
    assert!(source.is_invalid());
}

#[tokio::test]
async fn test_disruptive_update_reaches_facade() {
    let layer = layer().await;
    let transport = transport(&[LOCAL, CLOUD]);
    layer.set_active_transport(transport.clone());
    layer.settled().await;
    let mut disruptive = layer.disruptive_data_updates();

    reports(&transport, &[LOCAL]);
    layer.refresh_available_providers();
    layer.settled().await;

    assert!(disruptive.try_recv());
    assert_eq!(layer.providers(), vec![provider(LOCAL)]);
}

#[tokio::test]
async fn test_collection_reset_drops_provider_cache() {
    let layer = layer().await;
    let transport = transport(&[LOCAL, CLOUD]);
    transport.set_rows(queries::COLLECTION_INFO, vec![collection_row(CLOUD, "c1")]);
    layer.set_active_transport(transport.clone());
    layer.settled().await;

    let info = layer.get_collection_info(&provider(CLOUD)).await.unwrap();
    assert_eq!(info.collection_id.as_deref(), Some("c1"));

    let cached = SyncedMedia {
        media_id: "m1".to_string(),
        local_id: None,
        authority: CLOUD.to_string(),
        media_source: MediaSource::Remote,
        media_uri: format!("content://{CLOUD}/m1"),
        loadable_uri: format!("content://{CLOUD}/m1"),
        date_taken_ms: 10,
        size_bytes: 0,
        mime_type: "image/jpeg".to_string(),
        standard_mime_type_extension: 0,
        duration_ms: None,
        is_pre_granted: false,
    };
    layer.cache_store().media().upsert_media(&[cached]).await.unwrap();
    assert_eq!(layer.cache_store().media().count().await.unwrap(), 1);

    let mut resets = layer.subscribe_events().filter(|e| {
        matches!(e, PickerEvent::Availability(AvailabilityEvent::CollectionReset { .. }))
    });
    transport.set_rows(queries::COLLECTION_INFO, vec![collection_row(CLOUD, "c2")]);
    transport.notify_change(topics::AVAILABLE_PROVIDERS_UPDATE);

    let event = within("collection reset", resets.recv()).await.unwrap();
    assert_eq!(
        event,
        PickerEvent::Availability(AvailabilityEvent::CollectionReset {
            authority: CLOUD.to_string()
        })
    );
    assert_eq!(layer.cache_store().media().count().await.unwrap(), 0);
}

// ============================================================================
// Pass-through operations
// ============================================================================

#[tokio::test]
async fn test_pre_granted_count_is_published() {
    let layer = layer().await;
    let transport = transport(&[LOCAL]);
    transport.set_call_result(
        methods::PRE_GRANTED_COUNT,
        row_of([(args::PRE_GRANTED_COUNT, RowValue::Integer(4))]),
    );
    layer.set_active_transport(transport.clone());
    let count = layer.pre_granted_items_count();

    assert_eq!(layer.refresh_pre_granted_items_count().await.unwrap(), 4);
    assert_eq!(*count.borrow(), 4);
}

#[tokio::test]
async fn test_fetch_media_data_for_uris() {
    let layer = layer().await;
    let transport = transport(&[LOCAL]);
    transport.set_handler(queries::MEDIA_FOR_URIS, |bundle: &Bundle| {
        let uris = bundle.text_list(args::URIS).unwrap_or_default();
        let rows = uris
            .iter()
            .filter_map(|uri| uri.strip_prefix("content://local/"))
            .enumerate()
            .map(|(i, id)| media_row(id, LOCAL, i as i64 + 1, 100))
            .collect();
        Ok(QueryResult::from_rows(rows))
    });
    layer.set_active_transport(transport.clone());

    let media = layer
        .fetch_media_data_for_uris(&[
            "content://local/7".to_string(),
            "content://elsewhere/8".to_string(),
        ])
        .await
        .unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].item().media_id, "7");
}

#[tokio::test]
async fn test_allowed_providers_come_from_resolver() {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve_media_providers()
        .withf(|user| *user == UserId(10))
        .returning(|_| {
            Ok(["cloud.b", CLOUD]
                .iter()
                .map(|authority| ProviderCandidate {
                    authority: authority.to_string(),
                    package_name: format!("{authority}.app"),
                    uid: 10_100,
                    display_name: authority.to_string(),
                })
                .collect())
        });
    let layer = DataLayer::new(
        config()
            .package_resolver(Arc::new(resolver))
            .build()
            .unwrap(),
    )
    .await
    .unwrap();

    let allowed = layer.get_all_allowed_providers(UserId(10)).await.unwrap();
    assert_eq!(allowed.len(), 1);
    assert_eq!(allowed[0].authority, CLOUD);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_is_gated_by_feature_flag() {
    let layer = DataLayer::new(config().enable_search(false).build().unwrap())
        .await
        .unwrap();
    layer.set_active_transport(transport(&[LOCAL]));

    let err = layer
        .record_search_request(&SearchRequest::text("cats", MimeTypeFilter::any()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::FeatureDisabled("search")));
}

#[tokio::test]
async fn test_search_results_sync_per_provider() {
    let layer = layer().await;
    let transport = transport(&[LOCAL, CLOUD]);
    transport.set_handler(queries::SEARCH_MEDIA, |bundle: &Bundle| {
        let rows = if bundle.text(args::AUTHORITY).as_deref() == Some(CLOUD) {
            vec![media_row("x", CLOUD, 1, 20), media_row("y", CLOUD, 2, 10)]
        } else {
            Vec::new()
        };
        Ok(QueryResult::from_rows(rows))
    });
    layer.set_active_transport(transport.clone());
    layer.settled().await;

    let id = layer
        .record_search_request(&SearchRequest::text("beach", MimeTypeFilter::any()))
        .await
        .unwrap();
    let outcomes = layer.sync_search_results(id).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, LOCAL);
    assert_eq!(
        outcomes[1],
        (
            CLOUD.to_string(),
            SyncOutcome::Synced {
                inserted: 2,
                skipped: 0,
                complete: true
            }
        )
    );

    let again = layer.sync_search_results(id).await.unwrap();
    assert!(again
        .iter()
        .all(|(_, outcome)| *outcome == SyncOutcome::AlreadyComplete));
}

#[tokio::test]
async fn test_media_sets_need_an_available_provider() {
    let layer = layer().await;
    layer.set_active_transport(transport(&[LOCAL]));
    layer.settled().await;

    let err = layer
        .sync_media_sets("people", "cloud.gone", &MimeTypeFilter::any())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProviderUnavailable(a) if a == "cloud.gone"));
}
