// resolution.rs - Benchmarks for namespace building, keyword lookup and semantic tokens
//
// Run with: cargo bench --bench resolution --features test-support
// Compare baselines: cargo bench --bench resolution --features test-support -- --baseline before

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio_util::sync::CancellationToken;
use url::Url;

use rfls::document_store::{DocumentSnapshot, DocumentStore};
use rfls::features::semantic_tokens::{collect_tokens, encode};
use rfls::introspection::SpecFileIntrospector;
use rfls::namespace::NamespaceResolver;
use rfls::syntax::{DocumentParser, SpaceSeparatedParser};
use rfls::test_utils::fixture_workspace::{create_fixture_workspace, FixtureConfig};
use rfls::ROBOT_LANGUAGE_ID;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolver() -> NamespaceResolver {
    NamespaceResolver::new(
        Arc::new(DocumentStore::new()),
        Arc::new(SpaceSeparatedParser::new()),
        Arc::new(SpecFileIntrospector::new()),
    )
}

/// Open `suite.robot` of the workspace in the resolver's store.
fn open_suite(resolver: &NamespaceResolver, workspace: &std::path::Path) -> DocumentSnapshot {
    let path = workspace.join("suite.robot");
    let text = std::fs::read_to_string(&path).unwrap();
    let uri = Url::from_file_path(&path).unwrap();
    resolver.documents().open(&uri, ROBOT_LANGUAGE_ID, &text, 1);
    resolver.documents().snapshot(&uri).unwrap()
}

fn configs() -> [(&'static str, FixtureConfig); 2] {
    [("small", FixtureConfig::small()), ("large", FixtureConfig::large())]
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_namespace_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("namespace_build");
    for (name, config) in configs() {
        let workspace = create_fixture_workspace(&config).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &workspace, |b, workspace| {
            b.iter(|| {
                let resolver = resolver();
                let snapshot = open_suite(&resolver, workspace.path());
                black_box(resolver.build_now(&snapshot))
            })
        });
    }
    group.finish();
}

fn bench_keyword_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyword_lookup");
    for (name, config) in configs() {
        let workspace = create_fixture_workspace(&config).unwrap();
        let resolver = resolver();
        let snapshot = open_suite(&resolver, workspace.path());
        let namespace = resolver.build_now(&snapshot);
        let last = format!(
            "Resource {} Keyword {}",
            config.resource_count - 1,
            config.keywords_per_resource - 1
        );
        let qualified = format!("resource_0.Resource 0 Keyword {}", config.keywords_per_resource / 2);

        group.bench_function(BenchmarkId::new("plain", name), |b| {
            b.iter(|| black_box(namespace.resolve(black_box(&last))))
        });
        group.bench_function(BenchmarkId::new("qualified", name), |b| {
            b.iter(|| black_box(namespace.resolve(black_box(&qualified))))
        });
        group.bench_function(BenchmarkId::new("unknown", name), |b| {
            b.iter(|| black_box(namespace.resolve(black_box("No Such Keyword Anywhere"))))
        });
    }
    group.finish();
}

fn bench_semantic_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("semantic_tokens");
    for (name, config) in configs() {
        let workspace = create_fixture_workspace(&config).unwrap();
        let resolver = resolver();
        let snapshot = open_suite(&resolver, workspace.path());
        let namespace = resolver.build_now(&snapshot);
        let model = SpaceSeparatedParser::new().parse(&snapshot.text());
        let cancel = CancellationToken::new();

        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let tokens = collect_tokens(&namespace, &model, &cancel).unwrap();
                black_box(encode(&snapshot.rope, &tokens))
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_namespace_build,
    bench_keyword_lookup,
    bench_semantic_tokens
);
criterion_main!(benches);
