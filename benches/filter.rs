use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use crossbeam_channel::{unbounded, Receiver};

use flowwatch::query::SourceCall;
use flowwatch::{
    Context, ExecutionError, FlowCompletion, QueryEngine, Row, Scope, SourcePlugin, FLOW_COMPLETION_QUERY,
};

const ROWS: usize = 1024;

/// Replays a fixed batch of completion rows under the monitoring plugin name.
struct Replay(Vec<Row>);

impl SourcePlugin for Replay {
    fn name(&self) -> &str {
        "watch_monitoring"
    }

    fn open(&self, _ctx: &Context, _scope: &Scope, _call: &SourceCall) -> Result<Receiver<Row>, ExecutionError> {
        let (tx, rx) = unbounded();
        for row in &self.0 {
            let _ = tx.send(row.clone());
        }
        Ok(rx)
    }
}

fn completions() -> Vec<Row> {
    // One in eight flows produced the watched artifact.
    (0..ROWS)
        .map(|i| {
            let artifacts: Vec<&str> = if i % 8 == 0 {
                vec!["Generic.Client.Info", "Windows.System.Pslist"]
            } else {
                vec!["Windows.System.Pslist", "Linux.Sys.Users"]
            };
            FlowCompletion::finished("C.1", format!("F.{i}"))
                .with_artifacts(artifacts)
                .to_row()
        })
        .collect()
}

fn filter(c: &mut Criterion) {
    let engine = QueryEngine::new().with_plugin(Arc::new(Replay(completions())));

    c.bench_function("filter/parse_completion_query", |b| {
        b.iter(|| engine.parse(FLOW_COMPLETION_QUERY).unwrap());
    });

    let query = engine.parse(FLOW_COMPLETION_QUERY).unwrap();
    let scope = Scope::new().with_var("artifact_name", "Generic.Client.Info");
    let ctx = Context::background();

    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("evaluate_1024_completions", |b| {
        b.iter(|| {
            let matched = engine.evaluate(&query, &ctx, &scope).count();
            assert_eq!(matched, ROWS / 8);
        });
    });
    group.finish();
}

criterion_group!(benches, filter);
criterion_main!(benches);
