mod common;

use std::time::Duration;

use common::{BufferConsole, Harness};
use nascli_core::error::{EvalErrorKind, ShellError};
use nascli_core::output::Output;
use nascli_core::remote::NodePath;
use nascli_core::value::Value;

fn names(output: &Output) -> Vec<String> {
    match output {
        Output::Table(table) => table.rows.iter().map(|r| r["name"].to_string()).collect(),
        other => panic!("Expected table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_print_is_repeatable() {
    let mut h = Harness::new().await;
    h.ok("print(1 + 2)").await;
    h.ok("print(1 + 2)").await;
    assert_eq!(h.take_lines(), vec!["3", "3"]);
}

#[tokio::test]
async fn test_division_keeps_exact_results_integral() {
    let mut h = Harness::new().await;
    h.ok("x = 7 / 2; y = 5 * 4 / 2; print(x == 3.5); print(y)").await;
    assert_eq!(h.take_lines(), vec!["true", "10"]);
    assert_eq!(h.var("x"), Some(Value::Float(3.5)));
    assert_eq!(h.var("y"), Some(Value::Int(10)));
}

#[tokio::test]
async fn test_and_short_circuits() {
    let mut h = Harness::new().await;
    h.ok("r = false and reboot(); print(r)").await;
    assert_eq!(h.take_lines(), vec!["false"]);
    assert_eq!(h.backend.invokes(), 0);

    h.ok("r = true or nosuchfunction(); print(r)").await;
    assert_eq!(h.take_lines(), vec!["true"]);
}

#[tokio::test]
async fn test_logical_operands_must_be_boolean() {
    let mut h = Harness::new().await;
    assert_eq!(h.err("r = 1 and true").await.kind(), "TypeError");
    assert_eq!(h.err("r = not 0").await.kind(), "TypeError");
}

#[tokio::test]
async fn test_comparison_result_is_boolean() {
    let mut h = Harness::new().await;
    h.ok("b = 10; res = 10 == b; print(res)").await;
    assert_eq!(h.take_lines(), vec!["true"]);
    assert_eq!(h.var("res"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn test_lone_expression_is_parse_error() {
    let mut h = Harness::new().await;
    let results = h.session.execute("2 * 3").await;
    assert_eq!(results.len(), 1);
    let err = results.into_iter().next().unwrap().unwrap_err();
    assert_eq!(err.kind(), "ParseError");
    assert!(h.take_lines().is_empty());
}

#[tokio::test]
async fn test_lone_unknown_word_is_lookup_error() {
    let mut h = Harness::new().await;
    h.ok("var = 5").await;
    let err = h.err("var").await;
    assert!(matches!(err, ShellError::NotFound { ref segment } if segment == "var"));
    assert!(h.take_lines().is_empty());
}

#[tokio::test]
async fn test_factorial() {
    let mut h = Harness::new().await;
    h.ok("print(factorial(5)); print(factorial(0))").await;
    assert_eq!(h.take_lines(), vec!["120", "1"]);
    assert_eq!(h.err("factorial(-1)").await.kind(), "DomainError");
    assert_eq!(h.err("factorial(1.5)").await.kind(), "DomainError");
}

#[tokio::test]
async fn test_print_collections() {
    let mut h = Harness::new().await;
    h.ok(r#"print([1, "a", none]); print({"this": "foo", that: 2})"#)
        .await;
    assert_eq!(h.take_lines(), vec!["[1, a, none]", "{that=2, this=foo}"]);
}

#[tokio::test]
async fn test_string_interpolation() {
    let mut h = Harness::new().await;
    h.ok(r#"name = "tank"; print("vol ${name} has ${1 + 1} disks")"#).await;
    assert_eq!(h.take_lines(), vec!["vol tank has 2 disks"]);
}

#[tokio::test]
async fn test_size_literals() {
    let mut h = Harness::new().await;
    h.ok("print(1k); print(2MiB / 1KiB)").await;
    assert_eq!(h.take_lines(), vec!["1024", "2048"]);
}

#[tokio::test]
async fn test_loops_and_break() {
    let mut h = Harness::new().await;
    h.ok(
        "total = 0
         for (i = 0; i < 10; i = i + 1) {
             if (i == 3) { break }
             total = total + i
         }
         print(total)",
    )
    .await;
    h.ok("n = 0; while (n < 4) { n = n + 1 }; print(n)").await;
    h.ok("s = 0; for (x in [1, 2, 3]) { s = s + x }; print(s)").await;
    assert_eq!(h.take_lines(), vec!["3", "4", "6"]);
}

#[tokio::test]
async fn test_loop_scope_is_dropped() {
    let mut h = Harness::new().await;
    h.ok("for (x in range(2)) { inner = x }").await;
    assert_eq!(h.var("inner"), None);
    assert_eq!(h.var("x"), None);
}

#[tokio::test]
async fn test_break_outside_loop_is_rejected() {
    let mut h = Harness::new().await;
    let err = h.err("break").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::Rejected));
}

#[tokio::test]
async fn test_collection_updates() {
    let mut h = Harness::new().await;
    h.ok(r#"d = {a: 1}; d["b"] = 2; d.a = 5; l = [0, 0]; l[1] = d; print(l)"#)
        .await;
    assert_eq!(h.take_lines(), vec!["[0, {a=5, b=2}]"]);
    assert_eq!(h.err("l[5] = 1").await.kind(), "IndexError");
    assert_eq!(h.err("x = d[\"zzz\"]").await.kind(), "KeyError");
}

#[tokio::test]
async fn test_error_aborts_rest_of_line() {
    let mut h = Harness::new().await;
    let results = h.session.execute("print(1); x = 1 / 0; print(2)").await;
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().kind(), "ZeroDivisionError");
    assert_eq!(h.take_lines(), vec!["1"]);
}

#[tokio::test]
async fn test_undefined_variable() {
    let mut h = Harness::new().await;
    let err = h.err("print(missing)").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedVariable));
}

#[tokio::test]
async fn test_navigation_round_trip() {
    let mut h = Harness::new().await;
    let out = h.ok("storage volume").await;
    assert!(matches!(&out[0], Output::Listing(children) if children.len() == 3));
    assert_eq!(h.cwd(), "/storage/volume");

    h.ok("..").await;
    assert_eq!(h.cwd(), "/storage");
    h.ok("volume").await;
    assert_eq!(h.cwd(), "/storage/volume");

    // `-` swaps between the last two places
    h.ok("-").await;
    assert_eq!(h.cwd(), "/storage");
    h.ok("-").await;
    assert_eq!(h.cwd(), "/storage/volume");

    h.ok("/ network").await;
    assert_eq!(h.cwd(), "/network");
    h.ok("/").await;
    assert_eq!(h.cwd(), "/");
}

#[tokio::test]
async fn test_failed_navigation_keeps_cwd() {
    let mut h = Harness::new().await;
    h.ok("storage").await;
    let err = h.err("nowhere deeper").await;
    assert!(matches!(err, ShellError::NotFound { ref segment } if segment == "nowhere"));
    assert_eq!(h.cwd(), "/storage");
}

#[tokio::test]
async fn test_namespace_with_arguments_is_rejected() {
    let mut h = Harness::new().await;
    let err = h.err("storage extra=1").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedCommand));
    assert_eq!(h.cwd(), "/");
}

#[tokio::test]
async fn test_pipeline_sort_and_limit() {
    let mut h = Harness::new().await;
    h.ok("storage volume").await;
    let out = h.ok("show | sort(name) | limit(2)").await;
    assert_eq!(names(&out[0]), vec!["backup", "media"]);

    let out = h.ok("show | sort -size | select name").await;
    assert_eq!(names(&out[0]), vec!["tank", "media", "backup"]);
    match &out[0] {
        Output::Table(table) => assert_eq!(table.columns, vec!["name"]),
        other => panic!("Expected table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_search_and_exclude() {
    let mut h = Harness::new().await;
    let out = h.ok("storage volume show | search size > 150 | sort(name)").await;
    assert_eq!(names(&out[0]), vec!["media", "tank"]);
    let out = h
        .ok(r#"storage volume show | exclude status == "ONLINE""#)
        .await;
    assert_eq!(names(&out[0]), vec!["media"]);
    // row bindings do not leak
    assert_eq!(h.var("size"), None);
    assert_eq!(h.cwd(), "/");
}

#[tokio::test]
async fn test_pipeline_errors() {
    let mut h = Harness::new().await;
    assert_eq!(h.err("pwd | limit(1)").await.kind(), "TypeError");
    assert_eq!(h.err("storage volume show | sort(colour)").await.kind(), "KeyError");
    assert_eq!(h.err("storage volume show | search size").await.kind(), "TypeError");
}

#[tokio::test]
async fn test_property_paths() {
    let mut h = Harness::new().await;
    h.ok("h = /.hostname; m = /network.mtu; print(h, m)").await;
    assert_eq!(h.take_lines(), vec!["nas01 1500"]);

    h.ok("/storage/volume/tank.size = 512").await;
    assert_eq!(h.backend.sets(), 1);
    assert_eq!(
        h.backend
            .inner
            .value(&NodePath::parse("/storage/volume/tank"), "size"),
        Some(Value::Int(512))
    );

    h.ok("network").await;
    h.ok(r#".mtu = "9000"; print(.mtu + 1)"#).await;
    assert_eq!(h.take_lines(), vec!["9001"]);
}

#[tokio::test]
async fn test_read_only_property_never_written() {
    let mut h = Harness::new().await;
    h.ok("storage volume tank").await;
    let err = h.err("set status=OFFLINE").await;
    assert!(matches!(err, ShellError::ReadOnly { ref property } if property == "status"));
    let err = h.err(r#".status = "OFFLINE""#).await;
    assert_eq!(err.kind(), "ReadOnlyError");
    assert_eq!(err.exit_code(), 1);
    assert_eq!(h.backend.sets(), 0);
}

#[tokio::test]
async fn test_invalid_values_rejected_locally() {
    let mut h = Harness::new().await;
    h.ok("storage volume tank").await;
    assert_eq!(h.err("set compression=gzip").await.kind(), "ValueError");
    assert_eq!(h.err("set size=big").await.kind(), "TypeError");
    assert_eq!(h.backend.sets(), 0);

    h.ok("set compression=zstd size=400").await;
    assert_eq!(h.backend.sets(), 2);
    let out = h.ok("get size").await;
    assert_eq!(out[0], Output::Value(Value::Int(400)));
}

#[tokio::test]
async fn test_out_of_range_integer_rejected_locally() {
    let mut h = Harness::new().await;
    h.ok("storage volume tank").await;
    assert_eq!(h.err("set size=1e30").await.kind(), "TypeError");
    let err = h.err("/storage/volume/backup.size = -1e30").await;
    assert_eq!(err.kind(), "TypeError");
    assert_eq!(h.backend.sets(), 0);
    let out = h.ok("get size").await;
    assert_eq!(out[0], Output::Value(Value::Int(300)));
}

#[tokio::test]
async fn test_create_rejects_values_set_would_reject() {
    let mut h = Harness::new().await;
    h.ok("storage volume").await;
    let err = h.err("create name=vault compression=gzip").await;
    match err {
        ShellError::Remote(remote) => {
            assert_eq!(remote.code, "EINVAL");
            assert!(remote.message.contains("should be one of"));
        }
        other => panic!("Expected remote error, got {:?}", other),
    }
    let out = h.ok("show").await;
    assert!(!names(&out[0]).contains(&"vault".to_string()));

    h.ok("create name=vault compression=lz4").await;
    h.ok("vault").await;
    let out = h.ok("get compression").await;
    assert_eq!(out[0], Output::Value(Value::from("lz4")));
}

#[tokio::test]
async fn test_collection_has_no_property_values() {
    let mut h = Harness::new().await;
    let err = h.err("x = /storage/volume.size").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::Rejected));
}

#[tokio::test]
async fn test_create_and_enter_item() {
    let mut h = Harness::new().await;
    h.ok("storage volume").await;
    let out = h.ok("create name=vault size=50").await;
    assert_eq!(out[0], Output::Item(NodePath::parse("/storage/volume/vault")));
    assert_eq!(h.backend.invokes(), 1);

    h.ok("vault").await;
    assert_eq!(h.cwd(), "/storage/volume/vault");
    let out = h.ok("get name").await;
    assert_eq!(out[0], Output::Value(Value::from("vault")));
}

#[tokio::test]
async fn test_command_arguments_checked_before_invoking() {
    let mut h = Harness::new().await;
    let err = h.err("storage volume create size=5").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::ArityMismatch));
    let err = h.err("storage volume create name=x size=huge").await;
    assert_eq!(err.kind(), "TypeError");
    assert_eq!(h.backend.invokes(), 0);
}

#[tokio::test]
async fn test_remote_errors_pass_through() {
    let mut h = Harness::new().await;
    let err = h.err("storage volume create name=tank").await;
    match err {
        ShellError::Remote(remote) => assert_eq!(remote.code, "EEXIST"),
        other => panic!("Expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_function_call_reaches_namespace_command() {
    let mut h = Harness::new().await;
    h.ok("r = reboot(); print(r)").await;
    assert_eq!(h.take_lines(), vec!["rebooting"]);
    let err = h.err("nosuch(1)").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedCommand));
}

#[tokio::test]
async fn test_jobs_return_handles() {
    let mut h = Harness::new().await;
    let out = h.ok("storage volume tank scrub").await;
    assert_eq!(out[0], Output::Value(Value::from("job-1")));
    assert_eq!(h.cwd(), "/");
}

#[tokio::test]
async fn test_substitution() {
    let mut h = Harness::new().await;
    h.ok("n = length($(storage volume show)); p = $(pwd); print(n, p)").await;
    assert_eq!(h.take_lines(), vec!["3 /"]);
    h.ok("rows = $(storage volume show | sort(-size) | limit 1); print(rows[0].name)")
        .await;
    assert_eq!(h.take_lines(), vec!["tank"]);
}

#[tokio::test]
async fn test_builtin_commands() {
    let mut h = Harness::new().await;
    h.ok("storage").await;
    let out = h.ok("pwd").await;
    assert_eq!(out[0], Output::Value(Value::from("/storage")));

    h.ok("echo hello world level=3").await;
    assert_eq!(h.take_lines(), vec!["hello world level=3"]);

    let out = h.ok("help").await;
    match &out[0] {
        Output::Table(table) => {
            let commands: Vec<String> =
                table.rows.iter().map(|r| r["command"].to_string()).collect();
            assert!(commands.contains(&"show".to_string()));
            assert!(commands.contains(&"exit".to_string()));
        }
        other => panic!("Expected table, got {:?}", other),
    }

    let out = h.ok("ls").await;
    assert!(matches!(&out[0], Output::Listing(children) if children[0].name == "volume"));
}

#[tokio::test]
async fn test_exit_stops_execution() {
    let mut h = Harness::new().await;
    let results = h.session.execute("print(1); exit; print(2)").await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].as_ref().unwrap(), &Output::Exit);
    assert_eq!(h.take_lines(), vec!["1"]);
}

#[tokio::test]
async fn test_readline() {
    let mut h = Harness::with_console(|lines| BufferConsole::new(lines).with_input(&["tank"])).await;
    h.ok(r#"v = readline("volume? "); print("got " + v)"#).await;
    assert_eq!(h.take_lines(), vec!["got tank"]);
    let err = h.err("v = readline()").await;
    assert!(matches!(err, ShellError::Eof));
}

#[tokio::test]
async fn test_interrupted_loop_restores_variables() {
    let mut h = Harness::new().await;
    h.ok("x = 0").await;

    let interrupter = h.session.interrupter();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        interrupter.interrupt();
    });
    let err = h.err("while (true) { x = x + 1 }").await;
    assert!(matches!(err, ShellError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(h.var("x"), Some(Value::Int(0)));

    // the next input runs normally
    h.ok("x = x + 1").await;
    assert_eq!(h.var("x"), Some(Value::Int(1)));
}

#[tokio::test]
async fn test_interrupted_readline_restores_navigation() {
    let mut h = Harness::with_console(|lines| BufferConsole::new(lines).hanging()).await;
    let interrupter = h.session.interrupter();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        interrupter.interrupt();
    });
    let err = h
        .err("if (true) { storage volume; answer = readline() }")
        .await;
    assert!(matches!(err, ShellError::Interrupted));
    assert_eq!(h.cwd(), "/");
    assert_eq!(h.var("answer"), None);
}

#[tokio::test]
async fn test_source_runs_script_in_session() {
    let mut h = Harness::new().await;
    let dir = std::env::temp_dir().join(format!("nascli-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("setup.nsh");
    std::fs::write(&script, "sourced = 42\nstorage volume\n").unwrap();

    h.ok(&format!("source \"{}\"", script.display())).await;
    assert_eq!(h.var("sourced"), Some(Value::Int(42)));
    assert_eq!(h.cwd(), "/storage/volume");

    let looping = dir.join("loop.nsh");
    std::fs::write(&looping, format!("source \"{}\"\n", looping.display())).unwrap();
    let err = h.err(&format!("source \"{}\"", looping.display())).await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::Recursion));

    let err = h.err("source \"/definitely/not/here.nsh\"").await;
    assert_eq!(err.kind(), "IOError");
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_vars_lists_bindings() {
    let mut h = Harness::new().await;
    h.ok("a = 1; b = \"x\"").await;
    let out = h.ok("vars").await;
    match &out[0] {
        Output::Table(table) => {
            assert_eq!(table.len(), 2);
            assert_eq!(table.rows[1]["type"], Value::from("string"));
        }
        other => panic!("Expected table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_user_functions_return_values() {
    let mut h = Harness::new().await;
    h.ok("function area(w, h) { return w * h }").await;
    h.ok("print(area(3, 4))").await;

    h.ok("function fib(n) { if n < 2 { return n }; return fib(n - 1) + fib(n - 2) }")
        .await;
    h.ok("print(fib(10))").await;

    h.ok(
        "function first_big(items) {\n  for (v in items) {\n    if v > 10 { return v }\n  }\n}",
    )
    .await;
    h.ok("print(first_big([1, 20, 30])); print(first_big([1]))").await;

    h.ok("function shout(s) { print(s + \"!\") }; x = shout(\"hi\")").await;
    assert_eq!(h.take_lines(), vec!["12", "55", "20", "none", "hi!"]);
    assert_eq!(h.var("x"), Some(Value::Null));
}

#[tokio::test]
async fn test_function_bodies_see_session_scope_only() {
    let mut h = Harness::new().await;
    h.ok("total = 0; function add(n) { total = total + n; scratch = n }").await;
    h.ok("for (i in [1, 2, 3]) { add(i) }").await;
    assert_eq!(h.var("total"), Some(Value::Int(6)));
    assert_eq!(h.var("scratch"), None);
    assert_eq!(h.var("n"), None);

    h.ok("function peek() { return i }").await;
    let err = h.err("for (i in [1]) { x = peek() }").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedVariable));
    assert_eq!(h.session.environment().depth(), 1);
}

#[tokio::test]
async fn test_function_call_errors() {
    let mut h = Harness::new().await;
    h.ok("function area(w, h) { return w * h }").await;
    let err = h.err("x = area(1)").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::ArityMismatch));
    let err = h.err("x = area(w=1, h=2)").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::ArityMismatch));

    let err = h.err("function print(x) { }").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::Rejected));

    let err = h.err("function forever(n) { return forever(n + 1) }; forever(0)").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::Recursion));
    assert_eq!(h.session.environment().depth(), 1);
    assert_eq!(h.var("n"), None);

    let err = h.err("return 1").await;
    assert_eq!(err.kind(), "ParseError");
}

#[tokio::test]
async fn test_undef_drops_variables_and_functions() {
    let mut h = Harness::new().await;
    h.ok("a = 1; undef a").await;
    assert_eq!(h.var("a"), None);
    let err = h.err("undef a").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedVariable));

    h.ok("function f() { return 1 }; x = f(); undef f").await;
    assert_eq!(h.var("x"), Some(Value::Int(1)));
    let err = h.err("x = f()").await;
    assert_eq!(err.eval_kind(), Some(EvalErrorKind::UndefinedCommand));
}

#[tokio::test]
async fn test_list_helpers_and_assert() {
    let mut h = Harness::new().await;
    h.ok("l = [1, 2]; l = append(l, 3); m = copy(l); m = remove(m, 1)").await;
    assert_eq!(
        h.var("l"),
        Some(Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    );
    assert_eq!(h.var("m"), Some(Value::List(vec![Value::Int(2), Value::Int(3)])));

    h.ok("assert(length(l) == 3)").await;
    let err = h.err("assert(length(l) == 2, \"expected ${length(l)} items\")").await;
    assert_eq!(err.kind(), "AssertionError");
    assert_eq!(err.to_string(), "expected 3 items");
    let err = h.err("m = remove(m, 7)").await;
    assert_eq!(err.kind(), "ValueError");
}

#[tokio::test]
async fn test_pipeline_age_filters() {
    let mut h = Harness::new().await;
    h.ok("task").await;
    let out = h.ok("show | older_than(\"1:00\")").await;
    assert_eq!(names(&out[0]), vec!["scrub_tank"]);
    let out = h.ok("show | newer_than 0 started_at").await;
    assert_eq!(names(&out[0]), vec!["replicate"]);

    let err = h.err("show | older_than(\"soon\")").await;
    assert_eq!(err.kind(), "ValueError");
    let err = h.err("show | older_than(\"1:00\", state)").await;
    assert_eq!(err.kind(), "TypeError");
    let err = h.err("show | newer_than").await;
    assert_eq!(err.kind(), "ArityError");
}
