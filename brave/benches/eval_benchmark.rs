//! Run with:
//!   cargo bench --bench eval_benchmark

use std::sync::Arc;

use brave::{
    AssignMode, Compiler, CompilerCache, Interpreter, Lexer, MemoryResources,
    ObservableExpression, Resources, Value, compile,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const ARITHMETIC: &str = "($a + $b) * 3 - $c / 2";
const CONTROL_FLOW: &str = "$flag && $a > 1 ? $a ?? $b : $c";
const COMMAND: &str = "$count += 1; $total = $total + $count; $total > 100 ? $total = 0 : $total";

fn seeded_store() -> MemoryResources {
    let store = MemoryResources::new();
    store.set("$a", Value::Int32(4));
    store.set("$b", Value::Int32(5));
    store.set("$c", Value::Float64(2.5));
    store.set("$flag", Value::Bool(true));
    store.set("$count", Value::Int32(0));
    store.set("$total", Value::Int32(0));
    store
}

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lex command", |b| {
        b.iter(|| Lexer::tokenize(black_box(COMMAND)).map(|t| t.len()))
    });
}

fn bench_compile(c: &mut Criterion) {
    let tokens = Lexer::tokenize(COMMAND).unwrap_or_default();
    c.bench_function("compile tokens", |b| {
        b.iter(|| Compiler::compile_tokens(black_box(&tokens), AssignMode::Scoped))
    });

    c.bench_function("compile through cache", |b| {
        b.iter(|| compile(black_box(COMMAND), AssignMode::Scoped))
    });

    c.bench_function("compile cold", |b| {
        b.iter(|| {
            CompilerCache::global().clear();
            compile(black_box(CONTROL_FLOW), AssignMode::Scoped)
        })
    });
}

fn bench_interpreter(c: &mut Criterion) {
    let store = seeded_store();
    let mut group = c.benchmark_group("interpreter");

    for (name, text) in [
        ("arithmetic", ARITHMETIC),
        ("control flow", CONTROL_FLOW),
        ("command", COMMAND),
    ] {
        let Ok(code) = compile(text, AssignMode::Scoped) else {
            continue;
        };
        group.bench_function(name, |b| {
            b.iter(|| Interpreter::new(&store).run(black_box(&code)))
        });
    }
    group.finish();
}

fn bench_observable(c: &mut Criterion) {
    let store = Arc::new(seeded_store());
    let Ok(code) = compile(ARITHMETIC, AssignMode::Scoped) else {
        return;
    };
    let Ok(expression) = ObservableExpression::new(store.clone(), code, Value::Null) else {
        return;
    };

    let mut n = 0;
    c.bench_function("observable recalculation", |b| {
        b.iter(|| {
            n += 1;
            store.set("$a", Value::Int32(n));
            black_box(expression.value())
        })
    });
}

criterion_group!(
    benches,
    bench_lexer,
    bench_compile,
    bench_interpreter,
    bench_observable
);
criterion_main!(benches);
