use std::fs;
use std::path::PathBuf;
use typhon::runtime_io::BufferIo;
use typhon::vm::HostOps;
use typhon::{ErrorKind, Session, Type, Value, Vm};

/// E2E tests: every `.ty` file under tests/programs/ runs as one chunk and
/// is compared against its `# output:`, `# expect:` and `# error:` headers.

#[derive(Debug, Default)]
struct Expectation {
    output: Vec<String>,
    value: Option<String>,
    error: Option<String>,
}

fn read_expectation(source: &str) -> Expectation {
    let mut exp = Expectation::default();
    for line in source.lines() {
        if let Some(rest) = line.strip_prefix("# output:") {
            exp.output.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("# expect:") {
            exp.value = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("# error:") {
            exp.error = Some(rest.trim().to_string());
        }
    }
    exp
}

fn get_test_programs() -> Vec<PathBuf> {
    let test_dir = PathBuf::from("tests/programs");
    if !test_dir.exists() {
        return vec![];
    }

    let mut programs = vec![];
    if let Ok(entries) = fs::read_dir(&test_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ty") {
                programs.push(path);
            }
        }
    }
    programs.sort();
    programs
}

fn run_test_program(path: &PathBuf) -> Result<(), String> {
    let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let path_str = path.to_string_lossy().to_string();
    let exp = read_expectation(&source);

    let mut session = Session::new();
    let mut io = BufferIo::new();
    let result = session.run_with_io(&source, &mut io);
    let lines: Vec<String> = io.lines().into_iter().map(str::to_string).collect();
    if lines != exp.output {
        return Err(format!(
            "{}: output mismatch\nexpected: {:?}\nactual:   {:?}",
            path_str, exp.output, lines
        ));
    }

    match (result, &exp.error) {
        (Ok(value), None) => match &exp.value {
            Some(expected) if *expected != value.to_string() => Err(format!(
                "{}: expected value {}, got {}",
                path_str, expected, value
            )),
            _ => Ok(()),
        },
        (Ok(value), Some(kind)) => Err(format!(
            "{}: expected {}, but the program returned {}",
            path_str, kind, value
        )),
        (Err(err), Some(kind)) if err.kind.to_string() == *kind => Ok(()),
        (Err(err), _) => Err(format!(
            "{}: {}",
            path_str,
            err.render(&path_str, &source)
        )),
    }
}

#[test]
fn test_e2e_all_programs() {
    let programs = get_test_programs();

    if programs.is_empty() {
        println!("Warning: No test programs found in tests/programs/");
        return;
    }

    let mut passed = 0;
    let mut failed = 0;

    for path in programs {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        print!("Testing {}... ", name);

        match run_test_program(&path) {
            Ok(()) => {
                println!("PASSED");
                passed += 1;
            }
            Err(err) => {
                println!("ERROR: {}", err);
                failed += 1;
            }
        }
    }

    println!("\n========================================");
    println!("E2E Test Summary:");
    println!("  Passed: {}", passed);
    println!("  Failed: {}", failed);
    println!("  Total:  {}", passed + failed);
    println!("========================================");

    assert_eq!(failed, 0, "Some E2E tests failed");
}

macro_rules! test_program {
    ($test_name:ident, $filename:literal) => {
        #[test]
        fn $test_name() {
            let _ = include_str!(concat!("programs/", $filename));

            let path = PathBuf::from(concat!("tests/programs/", $filename));
            let result = run_test_program(&path);
            assert!(result.is_ok(), "{}", result.unwrap_err());
        }
    };
}

test_program!(test_arith, "arith.ty");
test_program!(test_fib_iter, "fib_iter.ty");
test_program!(test_func_rec, "func_rec.ty");
test_program!(test_branch, "branch.ty");
test_program!(test_classes, "classes.ty");
test_program!(test_linked_list, "linked_list.ty");
test_program!(test_overload, "overload.ty");
test_program!(test_null_access, "null_access.ty");
test_program!(test_div_zero, "div_zero.ty");
test_program!(test_missing_return, "missing_return.ty");
test_program!(test_unknown_call, "unknown_call.ty");

// ========== incremental sessions ==========

fn run(session: &mut Session, src: &str) -> typhon::Result<Value> {
    session.run_with_io(src, &mut BufferIo::new())
}

#[test]
fn test_literal_chunk() {
    let mut session = Session::new();
    assert_eq!(session.typecheck_only("100").unwrap(), Type::Number);
    assert_eq!(run(&mut session, "100").unwrap(), Value::Num(100));
}

#[test]
fn test_if_else_assignment() {
    let mut session = Session::new();
    let src = "x:int = 0\nif True:\n  x = 5\nelse:\n  x = 3\nx";
    assert_eq!(session.typecheck_only(src).unwrap(), Type::Number);
    assert_eq!(run(&mut session, src).unwrap(), Value::Num(5));
}

#[derive(Debug, Clone, PartialEq)]
enum HostCall {
    Instantiate(i32),
    AttributeGet(i32, i32),
    AttributeSet(i32, i32, i32),
    GlobalGet(i32),
    GlobalSet(i32, i32),
}

/// Records every runtime operation before forwarding it to the store.
struct Recorder<H> {
    inner: H,
    calls: Vec<HostCall>,
}

impl<H: HostOps> HostOps for Recorder<H> {
    fn instantiate(&mut self, type_code: i32) -> typhon::Result<i32> {
        self.calls.push(HostCall::Instantiate(type_code));
        self.inner.instantiate(type_code)
    }

    fn attribute_get(&mut self, address: i32, index: i32) -> typhon::Result<i32> {
        self.calls.push(HostCall::AttributeGet(address, index));
        self.inner.attribute_get(address, index)
    }

    fn attribute_set(&mut self, address: i32, index: i32, word: i32) -> typhon::Result<()> {
        self.calls.push(HostCall::AttributeSet(address, index, word));
        self.inner.attribute_set(address, index, word)
    }

    fn global_get(&mut self, slot: i32) -> typhon::Result<i32> {
        self.calls.push(HostCall::GlobalGet(slot));
        self.inner.global_get(slot)
    }

    fn global_set(&mut self, slot: i32, word: i32) -> typhon::Result<()> {
        self.calls.push(HostCall::GlobalSet(slot, word));
        self.inner.global_set(slot, word)
    }

    fn class_of(&self, address: i32) -> typhon::Result<String> {
        self.inner.class_of(address)
    }
}

#[test]
fn test_method_call_host_operations() {
    let mut session = Session::new();
    run(&mut session, "class Pad:\n  pass\n").unwrap();
    run(
        &mut session,
        "class C:\n  attr: int = 0\n  def get(self: C) -> int:\n    return self.attr\n",
    )
    .unwrap();
    let type_code = session.globals().class("C").unwrap().type_code as i32;
    assert_eq!(type_code, 1);

    let staged = session.stage("C().get()\n").unwrap();
    let mut recorder = Recorder {
        inner: staged.store.clone(),
        calls: vec![],
    };
    let word = Vm::new()
        .run(&staged.image, &mut recorder, &mut BufferIo::new())
        .unwrap();
    assert_eq!(
        recorder.calls,
        vec![HostCall::Instantiate(type_code), HostCall::AttributeGet(1, 0)]
    );
    assert_eq!(staged.store.value_of(word, &staged.result_type).unwrap(), Value::Num(0));
}

#[test]
fn test_function_and_method_share_a_name() {
    let mut session = Session::new();
    run(&mut session, "def f(x: int) -> int:\n  return x + 1\n").unwrap();
    run(&mut session, "class K:\n  def f(self: K) -> int:\n    return 7\n").unwrap();
    assert_eq!(run(&mut session, "f(1)").unwrap(), Value::Num(2));
    assert_eq!(run(&mut session, "K().f()").unwrap(), Value::Num(7));
    assert_eq!(run(&mut session, "f(K().f())").unwrap(), Value::Num(8));
}

#[test]
fn test_global_redeclaration_keeps_state() {
    let mut session = Session::new();
    run(&mut session, "g: int = 5\n").unwrap();
    let err = run(&mut session, "g: int = 6\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateDefinitionError);
    assert_eq!(session.global_value("g"), Some(&Value::Num(5)));
    assert_eq!(run(&mut session, "g").unwrap(), Value::Num(5));
}

#[test]
fn test_missing_return_names_signature() {
    let session = Session::new();
    let err = session
        .typecheck_only("def check(c: bool) -> bool:\n  if c:\n    return True\n")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("check(bool,)"), "{}", err.message);
}

#[test]
fn test_redefinition_in_later_chunk_replaces_nothing() {
    let mut session = Session::new();
    run(&mut session, "def f() -> int:\n  return 1\n").unwrap();
    let err = run(&mut session, "def f() -> int:\n  return 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateDefinitionError);
    assert_eq!(run(&mut session, "f()").unwrap(), Value::Num(1));
}

#[test]
fn test_objects_survive_between_chunks() {
    let mut session = Session::new();
    run(&mut session, "class Acc:\n  total: int = 0\na: Acc = Acc()\n").unwrap();
    run(&mut session, "a.total = a.total + 40\n").unwrap();
    run(&mut session, "a.total = a.total + 2\n").unwrap();
    assert_eq!(run(&mut session, "a.total").unwrap(), Value::Num(42));
    assert_eq!(
        run(&mut session, "a").unwrap(),
        Value::Object {
            class: "Acc".into(),
            address: 1
        }
    );
}

#[test]
fn test_deep_recursion_is_a_runtime_error() {
    let mut session = Session::new();
    run(&mut session, "def down(n: int) -> int:\n  return down(n + 1)\n").unwrap();
    let err = run(&mut session, "down(0)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(run(&mut session, "1").unwrap(), Value::Num(1));
}

#[test]
fn test_object_slots_reject_primitives() {
    let mut session = Session::new();
    let err = run(&mut session, "o: object = 5\no").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);

    run(&mut session, "class P:\n  pass\np1: P = P()\np2: P = P()\n").unwrap();
    run(&mut session, "o: object = None\n").unwrap();
    let err = run(&mut session, "o = 2\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(run(&mut session, "o").unwrap(), Value::None);
    run(&mut session, "o = p2\n").unwrap();
    assert_eq!(
        run(&mut session, "o").unwrap(),
        Value::Object {
            class: "P".into(),
            address: 2
        }
    );

    run(&mut session, "class A:\n  v: object = None\na: A = A()\n").unwrap();
    let err = run(&mut session, "a.v = 7\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    run(&mut session, "a.v = p1\n").unwrap();
    assert_eq!(
        run(&mut session, "a.v").unwrap(),
        Value::Object {
            class: "P".into(),
            address: 1
        }
    );
}

#[test]
fn test_else_pass_is_a_missing_return() {
    let session = Session::new();
    let err = session
        .typecheck_only("def f(a: int) -> int:\n  if a > 0:\n    return 1\n  else:\n    pass\n")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("f(number,)"), "{}", err.message);
}

#[test]
fn test_smallest_word_literal() {
    let mut session = Session::new();
    run(&mut session, "low: int = -2147483648\n").unwrap();
    assert_eq!(run(&mut session, "low").unwrap(), Value::Num(i32::MIN));
    assert_eq!(run(&mut session, "low + 1").unwrap(), Value::Num(i32::MIN + 1));
    let err = run(&mut session, "2147483648").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}
