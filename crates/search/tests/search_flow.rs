mod common;

use std::sync::Arc;

use common::{CatalogueBackend, EchoOfflineBackend, InstantTileStore, capture, init_tracing, recv};
use pretty_assertions::assert_eq;
use waymark_search::{
	DataProviderRegistry, Executor, IndexChangeEvent, IndexChangeKind, IndexRecord, IndexableDataProvider, OfflineSearchEngine,
	ResultType, SearchEngine, SearchError, SearchOptions, SearchResponse, Settings, Suggestion, SuggestionKind,
};

const SETTINGS: &str = r#"
[engine]
access_token = "pk.test"
default_limit = 5

[offline]
dataset = "mbx-main"
version = "2024-01"

[providers.favorites]
priority = 10
max_records = 3
"#;

fn suggestions(response: SearchResponse) -> Vec<Suggestion> {
	match response {
		SearchResponse::Suggestions(list) => list,
		other => panic!("expected suggestions, got {other:?}"),
	}
}

#[tokio::test]
async fn provider_records_and_backend_suggestions_resolve_end_to_end() {
	init_tracing();
	let settings = Settings::from_toml_str(SETTINGS).expect("settings");
	let backend = Arc::new(CatalogueBackend::default());
	let engine = SearchEngine::new(settings.engine.clone(), backend.clone());
	let registry = DataProviderRegistry::new();

	let favorites = Arc::new(IndexableDataProvider::new("favorites", settings.provider("favorites")));
	let (cb, rx) = capture();
	favorites.upsert(
		IndexRecord::new("fav.home", "Cafe at Home", ResultType::Address),
		Executor::Inline,
		cb,
	);
	recv(rx).await.expect("upsert");

	let (cb, rx) = capture();
	registry.register(favorites.clone(), &engine, Executor::Inline, cb);
	recv(rx).await.expect("register");

	let (cb, rx) = capture();
	engine.search("cafe", SearchOptions::default(), Executor::Inline, cb);
	let found = suggestions(recv(rx).await.expect("search"));
	let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
	assert_eq!(ids, vec!["fav.home", "remote.0", "remote.1"]);
	assert!(matches!(&found[0].kind, SuggestionKind::Record { provider, .. } if provider == "favorites"));

	let calls_before_select = backend.calls();
	let (cb, rx) = capture();
	engine.select_batch(found.clone(), Executor::Inline, cb);
	let SearchResponse::Batch(pairs) = recv(rx).await.expect("batch") else {
		panic!("expected batch");
	};
	let resolved: Vec<(&str, Option<&str>)> = pairs.iter().map(|(s, r)| (s.id.as_str(), r.provider.as_deref())).collect();
	assert_eq!(resolved, vec![("fav.home", Some("favorites")), ("remote.0", None), ("remote.1", None)]);
	// Only the two remote suggestions hit the backend.
	assert_eq!(backend.calls() - calls_before_select, 2);

	let (cb, rx) = capture();
	registry.unregister("favorites", &engine, Executor::Inline, cb);
	assert_eq!(recv(rx).await, Ok(true));

	let (cb, rx) = capture();
	engine.search("cafe", SearchOptions::default(), Executor::Inline, cb);
	let ids: Vec<String> = suggestions(recv(rx).await.expect("search")).into_iter().map(|s| s.id).collect();
	assert_eq!(ids, vec!["remote.0", "remote.1"]);
}

#[tokio::test]
async fn failing_member_fails_the_batch() {
	init_tracing();
	let engine = SearchEngine::new(Default::default(), Arc::new(CatalogueBackend::default()));
	let batch = vec![
		Suggestion::remote("a", "A", ResultType::Poi, "handle.0"),
		Suggestion::remote("b", "B", ResultType::Poi, "handle.broken"),
	];
	let (cb, rx) = capture();
	engine.select_batch(batch, Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Err(SearchError::Backend(_))));
}

#[tokio::test]
async fn offline_search_waits_for_the_index() {
	init_tracing();
	let settings = Settings::from_toml_str(SETTINGS).expect("settings");
	let backend = Arc::new(EchoOfflineBackend::default());
	let engine = OfflineSearchEngine::new(settings.offline, backend, Arc::new(InstantTileStore::default()));

	let (load_cb, load_rx) = capture();
	engine.load_region("vienna", Executor::Inline, load_cb);

	// Tiles are downloaded, but the index has not reported the region yet.
	let (cb, rx) = capture();
	engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	assert_eq!(
		recv(rx).await,
		Err(SearchError::NotReady {
			region: Some("vienna".to_string())
		})
	);

	engine.coordinator().handle_index_event(IndexChangeEvent {
		kind: IndexChangeKind::Add,
		region_id: "vienna".to_string(),
		dataset: "mbx-main".to_string(),
		version: "2024-01".to_string(),
	});
	assert_eq!(recv(load_rx).await, Ok(()));

	let (cb, rx) = capture();
	engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Ok(SearchResponse::Results(results)) if results[0].name == "Cafe"));
}
