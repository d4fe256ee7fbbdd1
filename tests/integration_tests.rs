use proptest::prelude::*;
use rstest::rstest;

use rabbit_lang::cache::source_hash;
use rabbit_lang::{ArtifactCache, Engine, Number, Options, Value};

fn eval(source: &str) -> Value {
    Engine::new().eval(source).unwrap()
}

fn eval_with(source: &str, options: Options) -> Result<Value, String> {
    let mut engine = Engine::new();
    engine.set_options(options);
    engine.eval(source).map_err(|e| e.to_string())
}

fn num(n: f64) -> Value {
    Value::Number(Number::new(n))
}

fn s(v: &str) -> Value {
    Value::String(v.to_string())
}

#[test]
fn match_takes_the_first_matching_arm() {
    let result = eval("match 3 {\n  2..5 => \"range\"\n  3 => \"three\"\n}");
    assert_eq!(result, s("range"));
}

#[test]
fn loop_closures_capture_per_iteration_values() {
    let source = "funcs = []\nfor i in [1, 2, 3] {\n  funcs.push(fn() { i })\n}\n[funcs[0](), funcs[1](), funcs[2]()]";
    assert_eq!(eval(source), Value::List(vec![num(1.0), num(2.0), num(3.0)]));
}

#[test]
fn catch_filters_by_error_kind() {
    let mut engine = Engine::new();
    let uncaught = engine
        .eval("try { throw ValueError(\"x\") } catch TypeError { \"wrong\" }")
        .unwrap_err();
    assert_eq!(uncaught.to_string(), "ValueError: x");

    let caught = eval("try { throw ValueError(\"x\") } catch ValueError as e { e.message }");
    assert_eq!(caught, s("x"));
}

#[test]
fn user_errors_surface_kind_and_message() {
    let source = "def divide(a, b) {\n  if b == 0 {\n    throw ValueError(\"除数不能为零\")\n  }\n  a / b\n}\ntry { divide(1, 0) } catch ValueError as e { [e.kind, e.message] }";
    assert_eq!(
        eval(source),
        Value::List(vec![s("ValueError"), s("除数不能为零")])
    );
}

#[rstest]
#[case("def fib(n) { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } }\nfib(15)")]
#[case("total = 0\ndef add(n) { total + n }\nfor i in 1..=40 { total = add(i) }\ntotal")]
#[case("def risky(n) { if n > 30 { missing } else { n } }\ntotal = 0\nfor i in 1..=40 { try { total = total + risky(i) } catch NameError { total = total } }\ntotal")]
#[case("def fails(n) { n / 0 }\nfor i in 1..=40 { fails(i) }")]
fn both_tiers_agree(#[case] source: &str) {
    let interpreted = eval_with(
        source,
        Options {
            enable_jit: false,
            ..Options::default()
        },
    );
    let jit = eval_with(
        source,
        Options {
            hot_call_threshold: 1,
            ..Options::default()
        },
    );
    assert_eq!(interpreted, jit);
}

#[test]
fn cached_run_matches_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let source =
        "def square(n) { n * n }\ntotal = 0\nfor i in 1..=16 { total = total + square(i) }\ntotal";

    let fresh = eval(source);

    let mut engine = Engine::new();
    engine.set_options(Options {
        hot_call_threshold: 4,
        ..Options::default()
    });
    engine.set_cache(ArtifactCache::new(dir.path()));
    let cold = engine.eval(source).unwrap();
    let warm = engine.eval(source).unwrap();

    assert_eq!(fresh, cold);
    assert_eq!(fresh, warm);
}

#[test]
fn corrupted_cache_entry_falls_back_to_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let source = "1 + 2";

    let mut engine = Engine::new();
    engine.set_cache(ArtifactCache::new(dir.path()));
    engine.eval(source).unwrap();

    let entry = dir.path().join(format!("{}.rbc", source_hash(source)));
    std::fs::write(&entry, b"garbage").unwrap();

    assert_eq!(engine.eval(source).unwrap(), num(3.0));
}

#[test]
fn file_modules_load_from_search_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("helpers.rab"),
        "def triple(x) { x * 3 }\n",
    )
    .unwrap();

    let mut engine = Engine::new();
    engine.set_search_paths(vec![dir.path().to_path_buf()]);
    assert_eq!(engine.eval("use std/helpers\nhelpers.triple(14)").unwrap(), num(42.0));
}

#[test]
fn std_modules_are_built_in() {
    assert_eq!(eval("use std/math\nmath.pow(2, 5)"), num(32.0));
    assert_eq!(eval("use std/string\nstring.upper(\"ab\")"), s("AB"));
    assert_eq!(
        eval("use std/json\njson.stringify(json.parse(\"[1, 2]\"))"),
        s("[1.0,2.0]")
    );
}

proptest! {
    // identical text must parse to a structurally identical program
    #[test]
    fn reparse_is_deterministic(
        name in "v[a-z0-9_]{0,6}",
        a in -1000i32..1000,
        b in 1i32..1000,
        op in prop::sample::select(vec!["+", "-", "*", "/", "%"]),
    ) {
        let source = format!("{name} = {a} {op} {b}\nif {name} > 0 {{ {name} }} else {{ 0 - {name} }}");
        let (first, _) = rabbit_lang::parse(&source).unwrap();
        let (second, _) = rabbit_lang::parse(&source).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn arithmetic_on_integers_never_panics(
        a in -100i64..100,
        b in -100i64..100,
        op in prop::sample::select(vec!["+", "-", "*", "/", "%", "^"]),
    ) {
        let source = format!("{a} {op} {b}");
        // division by zero raises, everything else evaluates
        let _ = Engine::new().eval(&source);
    }
}
