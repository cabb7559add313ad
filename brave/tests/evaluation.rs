use std::sync::Arc;

use brave::{
    AssignMode, CompileError, Error, MemoryResources, Outcome, Resources, RuntimeError, Value,
    execute,
};
use rust_decimal::Decimal;

fn eval_in(store: &MemoryResources, text: &str, mode: AssignMode) -> Result<Value, Error> {
    execute(text, mode, store, Value::Null).map(Outcome::into_value)
}

fn eval(text: &str) -> Value {
    let store = MemoryResources::new();
    eval_in(&store, text, AssignMode::Direct).unwrap()
}

fn runtime_error(text: &str) -> RuntimeError {
    let store = MemoryResources::new();
    match eval_in(&store, text, AssignMode::Direct) {
        Err(Error::Runtime(err)) => err,
        other => panic!("expected a runtime error for {text:?}, got {other:?}"),
    }
}

// ── Arithmetic and precedence ─────────────────────────────────

#[test]
fn arithmetic_returns_value() {
    assert_eq!(eval("2 + 11"), Value::Int32(13));
    assert_eq!(eval("1 + 2 * 3"), Value::Int32(7));
    assert_eq!(eval("(1 + 2) * 3"), Value::Int32(9));
    assert_eq!(eval("2 + 3 * 4"), Value::Int32(14));
    assert_eq!(eval("20 - 4 / 2"), Value::Int32(18));
}

#[test]
fn integer_division_stays_integral() {
    assert_eq!(eval("8 / 2"), Value::Int32(4));
    assert_eq!(eval("7 / 2"), Value::Int32(3));
}

#[test]
fn promotion_follows_the_numeric_tower() {
    assert_eq!(eval("1 + 2L"), Value::Int64(3));
    assert_eq!(eval("1 + 0.5"), Value::Float64(1.5));
    assert_eq!(eval("1.5f * 2"), Value::Float32(3.0));
    assert_eq!(eval("1 + 2.5m"), Value::Decimal(Decimal::new(35, 1)));
    assert_eq!(eval("3000000000 + 1"), Value::UInt32(3_000_000_001));
}

#[test]
fn divide_by_zero_fails_in_every_kind() {
    for text in ["1 / 0", "1.0 / 0", "1 / 0.0", "1m / 0", "1f / 0", "1UL / 0"] {
        assert_eq!(runtime_error(text), RuntimeError::DivideByZero, "{text}");
    }
}

#[test]
fn string_concatenation() {
    assert_eq!(eval("\"a\" + 1"), Value::string("a1"));
    assert_eq!(eval("1 + 'b'"), Value::string("1b"));
    assert_eq!(eval("'x' + null"), Value::string("x"));
}

#[test]
fn unary_operators() {
    assert_eq!(eval("-5"), Value::Int32(-5));
    assert_eq!(eval("+5"), Value::Int32(5));
    assert_eq!(eval("!true"), Value::Bool(false));
    assert_eq!(eval("~0"), Value::Int32(-1));
    assert_eq!(eval("- -5"), Value::Int32(5));
}

#[test]
fn bitwise_and_comparisons() {
    assert_eq!(eval("6 & 3"), Value::Int64(2));
    assert_eq!(eval("6 | 3"), Value::Int64(7));
    assert_eq!(eval("6 ^ 3"), Value::Int64(5));
    assert_eq!(eval("true & false"), Value::Bool(false));
    assert_eq!(eval("1 < 2"), Value::Bool(true));
    assert_eq!(eval("2 <= 2"), Value::Bool(true));
    assert_eq!(eval("3 > 4.5"), Value::Bool(false));
    assert_eq!(eval("null < 0"), Value::Bool(true));
    assert_eq!(eval("1 == 1.0"), Value::Bool(true));
    assert_eq!(eval("null == null"), Value::Bool(true));
    assert_eq!(eval("'a' != 'a'"), Value::Bool(false));
}

// ── Literals and identity ─────────────────────────────────────

#[test]
fn literals() {
    assert_eq!(eval("null"), Value::Null);
    assert_eq!(eval("hello"), Value::string("hello"));
    assert_eq!(eval("'tab\\t'"), Value::string("tab\t"));
    assert_eq!(eval("@'it''s'"), Value::string("it's"));
}

#[test]
fn parameter_and_self() {
    let store = MemoryResources::new().with_owner(Value::string("owner"));
    let param = execute("$parameter", AssignMode::Scoped, &store, Value::Int32(9)).unwrap();
    assert_eq!(param, Outcome::Value(Value::Int32(9)));
    assert_eq!(
        eval_in(&store, "$self", AssignMode::Scoped).unwrap(),
        Value::string("owner")
    );
}

#[test]
fn empty_program_is_void() {
    let store = MemoryResources::new();
    let outcome = execute("", AssignMode::Scoped, &store, Value::Null).unwrap();
    assert!(outcome.is_void());
}

// ── Control flow ──────────────────────────────────────────────

#[test]
fn ternary_and_coalesce() {
    assert_eq!(eval("true ? 10 : 20"), Value::Int32(10));
    assert_eq!(eval("false ? 10 : 20"), Value::Int32(20));
    assert_eq!(eval("\"x\" ?? \"fallback\""), Value::string("x"));
    assert_eq!(eval("null ?? null ?? 7"), Value::Int32(7));
    assert_eq!(eval("1 < 2 ? 'yes' : 'no'"), Value::string("yes"));
}

#[test]
fn logical_operators_produce_booleans() {
    assert_eq!(eval("1 && 'true'"), Value::Bool(true));
    assert_eq!(eval("0 || null"), Value::Bool(false));
    assert_eq!(eval("false || false || true"), Value::Bool(true));
    assert_eq!(eval("true && true && false"), Value::Bool(false));
}

#[test]
fn short_circuits_skip_side_effects() {
    for text in [
        "$hit = 0; false && ($hit = 1); $hit",
        "$hit = 0; true || ($hit = 1); $hit",
        "$hit = 0; 1 ?? ($hit = 1); $hit",
        "$hit = 0; true ? 1 : ($hit = 1); $hit",
    ] {
        assert_eq!(eval(text), Value::Int32(0), "{text}");
    }
}

#[test]
fn untaken_branch_creates_nothing() {
    let store = MemoryResources::new();
    store.set("$A", Value::Int32(1));
    assert_eq!(
        eval_in(&store, "true ? $A : $B", AssignMode::Scoped).unwrap(),
        Value::Int32(1)
    );
    assert!(!store.contains_key("$B"));

    eval_in(&store, "$A ?? ($hit = 1)", AssignMode::Scoped).unwrap();
    assert!(!store.contains_key("$hit"));
}

#[test]
fn reading_an_absent_key_creates_it() {
    let store = MemoryResources::new();
    assert_eq!(eval_in(&store, "$ghost", AssignMode::Scoped).unwrap(), Value::Null);
    assert_eq!(store.get("$ghost"), Some(Value::Null));
}

// ── Assignment ────────────────────────────────────────────────

#[test]
fn assignments_return_the_stored_value() {
    let store = MemoryResources::new();
    assert_eq!(eval_in(&store, "$x = 7", AssignMode::Direct).unwrap(), Value::Int32(7));
    assert_eq!(store.get("$x"), Some(Value::Int32(7)));

    let sum = eval_in(&store, "$a = 1; $b = 2; $a + $b", AssignMode::Direct).unwrap();
    assert_eq!(sum, Value::Int32(3));
    assert_eq!(eval_in(&store, "$x += 5", AssignMode::Direct).unwrap(), Value::Int32(12));
    assert_eq!(eval_in(&store, "$x -= 2", AssignMode::Direct).unwrap(), Value::Int32(10));
    assert_eq!(eval_in(&store, "$x *= 7", AssignMode::Direct).unwrap(), Value::Int32(70));
    assert_eq!(eval_in(&store, "$x /= 7", AssignMode::Direct).unwrap(), Value::Int32(10));
}

#[test]
fn coalesce_assignment() {
    assert_eq!(eval("$x = null; $x ??= 123; $x"), Value::Int32(123));
    assert_eq!(eval("$x = 50; $x ??= 123; $x"), Value::Int32(50));
    assert_eq!(eval("$fresh ??= 'init'"), Value::string("init"));
}

#[test]
fn scoped_assignment_targets_the_defining_scope() {
    let parent = Arc::new(MemoryResources::new());
    parent.set("$A", Value::Int32(10));
    let child = MemoryResources::new().with_parent(parent.clone());

    let result = eval_in(&child, "$A = 123; $A", AssignMode::Scoped).unwrap();
    assert_eq!(result, Value::Int32(123));
    assert_eq!(parent.get("$A"), Some(Value::Int32(123)));
    assert!(!child.contains_key("$A"));
}

#[test]
fn direct_assignment_stays_local() {
    let parent = Arc::new(MemoryResources::new());
    parent.set("$A", Value::Int32(10));
    let child = MemoryResources::new().with_parent(parent.clone());

    eval_in(&child, "$A = 123", AssignMode::Direct).unwrap();
    assert_eq!(parent.get("$A"), Some(Value::Int32(10)));
    assert_eq!(child.get("$A"), Some(Value::Int32(123)));
}

// ── Increments ────────────────────────────────────────────────

#[test]
fn increment_sequence_restores_the_counter() {
    let store = MemoryResources::new();
    store.set("$Counter", Value::Int32(10));
    let results: Vec<Value> = ["++$Counter", "--$Counter", "$Counter++", "$Counter--"]
        .iter()
        .map(|text| eval_in(&store, text, AssignMode::Scoped).unwrap())
        .collect();
    assert_eq!(
        results,
        [Value::Int32(11), Value::Int32(10), Value::Int32(10), Value::Int32(11)]
    );
    assert_eq!(store.get("$Counter"), Some(Value::Int32(10)));

    let chained = eval_in(
        &store,
        "++$Counter; --$Counter; $Counter++; $Counter--; $Counter",
        AssignMode::Scoped,
    );
    assert_eq!(chained.unwrap(), Value::Int32(10));
}

#[test]
fn increments_of_absent_keys_use_the_seed() {
    assert_eq!(eval("++$n"), Value::Int32(1));
    assert_eq!(eval("--$n"), Value::Int32(-1));
    assert_eq!(eval("$n++; $n"), Value::Int32(1));
    assert_eq!(eval("$n--"), Value::Int32(0));
}

#[test]
fn increments_keep_the_numeric_kind() {
    assert_eq!(eval("$d = 1.5; ++$d"), Value::Float64(2.5));
    assert_eq!(eval("$l = 1L; $l++; $l"), Value::Int64(2));
    assert_eq!(eval("$m = 1m; --$m"), Value::Decimal(Decimal::ZERO));
    assert!(matches!(
        runtime_error("$s = 'x'; ++$s"),
        RuntimeError::UnsupportedOperand { op: "increment", .. }
    ));
}

#[test]
fn increment_writes_to_the_defining_scope() {
    let parent = Arc::new(MemoryResources::new());
    parent.set("$N", Value::Int32(1));
    let child = MemoryResources::new().with_parent(parent.clone());
    eval_in(&child, "++$N", AssignMode::Scoped).unwrap();
    assert_eq!(parent.get("$N"), Some(Value::Int32(2)));
    assert!(!child.contains_key("$N"));
}

// ── Collections ───────────────────────────────────────────────

#[test]
fn index_reads_and_writes() {
    let store = MemoryResources::new();
    store.set("$L", Value::list([Value::Int32(1), Value::Int32(2)]));
    store.set("$M", Value::map([("k", Value::string("v"))]));

    assert_eq!(eval_in(&store, "$L[1]", AssignMode::Scoped).unwrap(), Value::Int32(2));
    assert_eq!(eval_in(&store, "$M['k']", AssignMode::Scoped).unwrap(), Value::string("v"));
    assert_eq!(eval_in(&store, "$M['x']", AssignMode::Scoped).unwrap(), Value::Null);
    assert_eq!(
        eval_in(&store, "$L[0] = 'first'", AssignMode::Scoped).unwrap(),
        Value::string("first")
    );
    assert_eq!(eval_in(&store, "$L[0]", AssignMode::Scoped).unwrap(), Value::string("first"));
    eval_in(&store, "$M[k2] = 1 + 1", AssignMode::Scoped).unwrap();
    assert_eq!(eval_in(&store, "$M['k2']", AssignMode::Scoped).unwrap(), Value::Int32(2));
}

#[test]
fn bad_indexing_fails() {
    let store = MemoryResources::new();
    store.set("$L", Value::list([Value::Int32(1)]));
    store.set("$N", Value::Int32(1));
    assert!(matches!(
        eval_in(&store, "$L[5]", AssignMode::Scoped),
        Err(Error::Runtime(RuntimeError::InvalidIndex { .. }))
    ));
    assert!(matches!(
        eval_in(&store, "$N[0]", AssignMode::Scoped),
        Err(Error::Runtime(RuntimeError::NotIndexable { .. }))
    ));
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn compile_errors_surface() {
    let store = MemoryResources::new();
    assert!(matches!(
        eval_in(&store, "$parameter = 1", AssignMode::Direct),
        Err(Error::Compile(CompileError::AssignToParameter))
    ));
    assert!(matches!(
        eval_in(&store, "1 >> 2", AssignMode::Direct),
        Err(Error::Compile(CompileError::UnsupportedOperator { .. }))
    ));
    let long = "1".repeat(brave::MAX_EXPRESSION_LENGTH + 1);
    assert!(matches!(
        eval_in(&store, &long, AssignMode::Direct),
        Err(Error::Compile(CompileError::TooLong { .. }))
    ));
}

#[test]
fn deep_nesting_is_a_compile_error() {
    let store = MemoryResources::new();
    let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
    assert!(deep.len() < brave::MAX_EXPRESSION_LENGTH);
    assert!(matches!(
        eval_in(&store, &deep, AssignMode::Direct),
        Err(Error::Compile(CompileError::TooDeep { .. }))
    ));
}

#[test]
fn stack_ceiling_is_enforced_at_runtime() {
    let nested = |operands: usize| {
        let mut text = String::from("1");
        for _ in 1..operands {
            text = format!("1+({text})");
        }
        text
    };
    assert_eq!(eval(&nested(64)), Value::Int32(64));
    assert_eq!(
        runtime_error(&nested(65)),
        RuntimeError::StackOverflow { max: 64 }
    );
}

#[test]
fn failures_keep_earlier_effects() {
    let store = MemoryResources::new();
    let result = eval_in(&store, "$before = 1; 1 / 0; $after = 2", AssignMode::Direct);
    assert!(result.is_err());
    assert_eq!(store.get("$before"), Some(Value::Int32(1)));
    assert!(!store.contains_key("$after"));
}

#[test]
fn boolean_coercion_failure() {
    let store = MemoryResources::new();
    store.set("$L", Value::list([]));
    assert!(matches!(
        eval_in(&store, "$L ? 1 : 2", AssignMode::Scoped),
        Err(Error::Runtime(RuntimeError::BooleanConversion { kind: "list" }))
    ));
}

#[test]
fn cached_and_fresh_compiles_agree() {
    let first = eval("$v = 3; $v * $v + 1");
    brave::CompilerCache::global().clear();
    let second = eval("$v = 3; $v * $v + 1");
    assert_eq!(first, second);
    assert_eq!(first, Value::Int32(10));
}
