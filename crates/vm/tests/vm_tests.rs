//! Integration tests for the blockvm VM.
//!
//! Fixtures are written as assembly text; `@label:` lines mark body starts.
//! Builtins used by the fixtures are small test primitives defined below.

use blockvm_assembler::assemble_labeled;
use blockvm_common::{BlockDesc, BlockKind, BodyDesc, BodyList, BodyNames, SourceIndices};
use blockvm_vm::{
    compile, run, BodyId, CompileError, Function, Inverse, Modifier2, Primitive, Primitive2,
    RuntimeError, Scope, Thrown, UnitDesc, Value, Vm, VmConfig,
};
use std::rc::Rc;

// ---- Test primitives ----

/// Raises its argument.
struct Throw;

impl Primitive for Throw {
    fn name(&self) -> &str {
        "throw"
    }

    fn call1(&self, _vm: &mut Vm, x: Value) -> Result<Value, Thrown> {
        Err(Thrown::new(x))
    }

    fn call2(&self, _vm: &mut Vm, _w: Value, x: Value) -> Result<Value, Thrown> {
        Err(Thrown::new(x))
    }
}

/// `𝕨 + 𝕩` on numbers.
struct Plus;

impl Primitive for Plus {
    fn name(&self) -> &str {
        "+"
    }

    fn call1(&self, _vm: &mut Vm, x: Value) -> Result<Value, Thrown> {
        Ok(x)
    }

    fn call2(&self, _vm: &mut Vm, w: Value, x: Value) -> Result<Value, Thrown> {
        match (w, x) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
            _ => Err(Thrown::msg("+: expected numbers")),
        }
    }
}

/// `⟨𝕩, operand stack depth⟩`.
struct Report;

impl Primitive for Report {
    fn name(&self) -> &str {
        "report"
    }

    fn call1(&self, vm: &mut Vm, x: Value) -> Result<Value, Thrown> {
        Ok(Value::list(vec![x, Value::Num(vm.stack_depth() as f64)]))
    }

    fn call2(&self, vm: &mut Vm, _w: Value, x: Value) -> Result<Value, Thrown> {
        self.call1(vm, x)
    }
}

/// Names visible in the calling body's scope.
struct Vars;

impl Primitive for Vars {
    fn name(&self) -> &str {
        "vars"
    }

    fn call1(&self, vm: &mut Vm, _x: Value) -> Result<Value, Thrown> {
        let scope = vm.current_scope().ok_or_else(|| Thrown::msg("no caller"))?;
        Ok(Value::list(
            scope.list_vars().iter().map(|name| Value::str(name)).collect(),
        ))
    }

    fn call2(&self, vm: &mut Vm, _w: Value, x: Value) -> Result<Value, Thrown> {
        self.call1(vm, x)
    }
}

/// Returns a clone of one shared list, so tests can count references.
struct Make(Rc<[Value]>);

impl Primitive for Make {
    fn name(&self) -> &str {
        "make"
    }

    fn call1(&self, _vm: &mut Vm, _x: Value) -> Result<Value, Thrown> {
        Ok(Value::Array(self.0.clone()))
    }

    fn call2(&self, vm: &mut Vm, _w: Value, x: Value) -> Result<Value, Thrown> {
        self.call1(vm, x)
    }
}

/// `F ⎊ G`: call F, and G on the error message if F fails.
struct Catch;

impl Primitive2 for Catch {
    fn name(&self) -> &str {
        "⎊"
    }

    fn call1(&self, vm: &mut Vm, f: &Value, g: &Value, x: Value) -> Result<Value, Thrown> {
        match vm.catch(|vm| vm.call1(f, x)) {
            Ok(v) => Ok(v),
            Err(e) => vm.call1(g, e.message),
        }
    }

    fn call2(
        &self,
        vm: &mut Vm,
        f: &Value,
        g: &Value,
        w: Value,
        x: Value,
    ) -> Result<Value, Thrown> {
        match vm.catch(|vm| vm.call2(f, w, x)) {
            Ok(v) => Ok(v),
            Err(e) => vm.call1(g, e.message),
        }
    }
}

fn builtin(p: impl Primitive + 'static) -> Value {
    Value::Function(Rc::new(Function::Builtin(Rc::new(p))))
}

fn catch_modifier() -> Value {
    Value::Modifier2(Rc::new(Modifier2::Builtin(Rc::new(Catch))))
}

fn num(n: f64) -> Value {
    Value::Num(n)
}

fn nums(ns: &[f64]) -> Value {
    Value::list(ns.iter().copied().map(Value::Num).collect())
}

// ---- Fixture helpers ----

fn root_block() -> BlockDesc {
    BlockDesc::new(BlockKind::Function, true, BodyList::Single(0))
}

fn function(slots: Vec<Vec<usize>>) -> BlockDesc {
    BlockDesc::new(BlockKind::Function, false, BodyList::Slots(slots))
}

/// Assemble `text` and describe one body per `(label, var_count)`.
fn unit(
    text: &str,
    literals: Vec<Value>,
    blocks: Vec<BlockDesc>,
    bodies: &[(&str, u32)],
) -> UnitDesc {
    let asm = assemble_labeled(text).unwrap();
    let bodies = bodies
        .iter()
        .map(|&(label, vars)| BodyDesc::new(asm.label(label).unwrap(), vars))
        .collect();
    UnitDesc::new(asm.words(), literals, blocks, bodies)
}

fn eval(unit: UnitDesc) -> (Vm, Result<Value, Thrown>) {
    let block = compile(unit, None).unwrap();
    let mut vm = Vm::new();
    let result = vm.evaluate(&block);
    (vm, result)
}

fn message(result: Result<Value, Thrown>) -> String {
    result.unwrap_err().message.to_text()
}

// ---- Basic evaluation ----

#[test]
fn literal_root() {
    let u = unit("@r: PUSH 0\nRETN\n", vec![num(42.0)], vec![root_block()], &[("r", 0)]);
    assert_eq!(run(u), Ok(num(42.0)));
}

#[test]
fn stranding() {
    let u = unit(
        "@r:\n PUSH 0\n PUSH 1\n PUSH 0\n ARRO 3\n RETN\n",
        vec![num(1.0), num(2.0)],
        vec![root_block()],
        &[("r", 0)],
    );
    assert_eq!(run(u), Ok(nums(&[1.0, 2.0, 1.0])));
}

#[test]
fn compile_errors_surface_through_run() {
    let u = unit("@r: SYSV 0\nRETN\n", vec![], vec![root_block()], &[("r", 0)]);
    assert_eq!(
        message(run(u)),
        "VM compiler: Unsupported instruction SYSV"
    );
}

#[test]
fn root_must_be_immediate() {
    let u = unit(
        "@r: VARO 0 1\nRETN\n",
        vec![],
        vec![function(vec![vec![0]])],
        &[("r", 3)],
    );
    let (_, result) = eval(u);
    assert_eq!(result, Err(RuntimeError::RootNotImmediate.into()));
}

#[test]
fn bad_indices_rejected() {
    let u = unit("@r: PUSH 0\nRETN\n", vec![num(1.0)], vec![root_block()], &[("r", 0)])
        .with_source("1", SourceIndices::new(vec![0], vec![0]));
    assert_eq!(compile(u, None).unwrap_err(), CompileError::BadIndices);
}

// ---- Dispatch ----

const IDENTITY: &str = "\
@root:
  PUSH 0
  DFND 1
  FN1C
  RETN
@id:
  VARO 0 1
  RETN
";

#[test]
fn monadic_only_block() {
    let u = unit(
        IDENTITY,
        vec![num(5.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("id", 3)],
    );
    let (vm, result) = eval(u);
    assert_eq!(result, Ok(num(5.0)));
    assert_eq!(vm.stack_depth(), 0);
    assert_eq!(vm.env_depth(), 0);
}

#[test]
fn monadic_only_block_called_dyadically() {
    let text = "\
@root:
  PUSH 0
  DFND 1
  PUSH 0
  FN2C
  RETN
@id:
  VARO 0 1
  RETN
";
    let u = unit(
        text,
        vec![num(5.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("id", 3)],
    );
    let (vm, result) = eval(u);
    assert_eq!(message(result), "This block cannot be called dyadically");
    assert_eq!(vm.stack_depth(), 0);
    assert_eq!(vm.env_depth(), 0);
    // The root body and the failure body.
    assert_eq!(vm.uncaught_backtrace().map(|b| b.len()), Some(2));
}

const ZERO_OR_OTHER: &str = "\
@root:
  DFND 1
  VARM 0 0
  SETN
  POPS
  PUSH 0
  VARO 0 0
  FN1C
  PUSH 3
  VARO 0 0
  FN1C
  ARRO 2
  RETN
; F 0: 100
@zero:
  VARO 0 1
  PUSH 0
  VFYM
  SETH
  PUSH 1
  RETN
; F x: 200
@other:
  PUSH 2
  RETN
";

#[test]
fn header_mismatch_falls_through() {
    let u = unit(
        ZERO_OR_OTHER,
        vec![num(0.0), num(100.0), num(200.0), num(5.0)],
        vec![root_block(), function(vec![vec![1, 2]])],
        &[("root", 1), ("zero", 3), ("other", 3)],
    );
    let (vm, result) = eval(u);
    assert_eq!(result, Ok(nums(&[100.0, 200.0])));
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn no_header_matches() {
    let u = unit(
        ZERO_OR_OTHER,
        vec![num(0.0), num(100.0), num(200.0), num(5.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 1), ("zero", 3), ("other", 3)],
    );
    let (vm, result) = eval(u);
    assert_eq!(message(result), "No header matched argument");
    assert_eq!(vm.env_depth(), 0);
}

#[test]
fn compiled_dispatch_layout() {
    let u = unit(
        ZERO_OR_OTHER,
        vec![num(0.0), num(100.0), num(200.0), num(5.0)],
        vec![root_block(), function(vec![vec![1, 2]])],
        &[("root", 1), ("zero", 3), ("other", 3)],
    );
    let root = compile(u, None).unwrap();
    let f = &root.blocks[0];
    assert!(!f.immediate);
    assert!(f.body(BodyId(0)).exists);
    // No dyadic body: the dyadic entry is the failure body.
    assert!(!f.body(f.dyadic).exists);
    assert!(f.disassemble_body(BodyId(0)).contains("SETH2 2 -"));
}

const PREDICATE: &str = "\
@root:
  DFND 1
  VARM 0 0
  SETN
  POPS
  PUSH 0
  VARO 0 0
  FN1C
  PUSH 3
  VARO 0 0
  FN1C
  ARRO 2
  RETN
; {𝕩 ? 10 ; ⟨𝕩, 20⟩}
@test:
  VARO 0 1
  PRED
  PUSH 1
  RETN
@fallback:
  VARO 0 1
  PUSH 2
  ARRO 2
  RETN
";

#[test]
fn predicate_selects_body() {
    let u = unit(
        PREDICATE,
        vec![num(1.0), num(10.0), num(20.0), num(0.0)],
        vec![root_block(), function(vec![vec![1, 2]])],
        &[("root", 1), ("test", 3), ("fallback", 3)],
    );
    let (_, result) = eval(u);
    assert_eq!(
        result,
        Ok(Value::list(vec![num(10.0), nums(&[0.0, 20.0])]))
    );
}

#[test]
fn predicate_must_be_boolean() {
    let u = unit(
        PREDICATE,
        vec![num(3.0), num(10.0), num(20.0), num(0.0)],
        vec![root_block(), function(vec![vec![1, 2]])],
        &[("root", 1), ("test", 3), ("fallback", 3)],
    );
    let (_, result) = eval(u);
    assert_eq!(message(result), "Predicate value must be 0 or 1");
}

// ---- Scopes and closures ----

#[test]
fn closures_share_their_defining_scope() {
    let text = "\
@root:
  PUSH 0
  VARM 0 0
  SETN
  POPS
  DFND 1
  VARM 0 1
  SETN
  POPS
  DFND 2
  VARM 0 2
  SETN
  POPS
  PUSH 1
  VARO 0 1
  FN1C
  POPS
  PUSH 0
  VARO 0 2
  FN1C
  RETN
; Set: n ↩ 𝕩
@set:
  VARO 0 1
  VARM 1 0
  SETU
  RETN
; Get: n
@get:
  VARO 1 0
  RETN
";
    let u = unit(
        text,
        vec![num(0.0), num(7.0)],
        vec![root_block(), function(vec![vec![1]]), function(vec![vec![2]])],
        &[("root", 3), ("set", 3), ("get", 3)],
    );
    let (_, result) = eval(u);
    assert_eq!(result, Ok(num(7.0)));
}

#[test]
fn modified_assignment_counter() {
    let text = "\
@root:
  PUSH 0
  VARM 0 0
  SETN
  POPS
  DFND 1
  VARM 0 1
  SETN
  POPS
  PUSH 0
  VARO 0 1
  FN1C
  POPS
  PUSH 0
  VARO 0 1
  FN1C
  RETN
; n +↩ 1
@incr:
  PUSH 1
  PUSH 2
  VARM 1 0
  SETM
  RETN
";
    let u = unit(
        text,
        vec![num(0.0), num(1.0), builtin(Plus)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 2), ("incr", 3)],
    );
    let (_, result) = eval(u);
    assert_eq!(result, Ok(num(2.0)));
}

#[test]
fn update_of_unset_variable() {
    let u = unit(
        "@r:\n PUSH 0\n VARM 0 0\n SETU\n RETN\n",
        vec![num(1.0)],
        vec![root_block()],
        &[("r", 1)],
    );
    assert_eq!(message(run(u)), "↩: Updating undefined variable");
}

#[test]
fn read_before_definition() {
    let u = unit("@r:\n VARO 0 0\n RETN\n", vec![], vec![root_block()], &[("r", 1)]);
    assert_eq!(message(run(u)), "Reading variable before its defined");
}

#[test]
fn use_once_read_moves_the_value() {
    let text = "\
@r:
  PUSH 0
  VARM 0 0
  SETN
  POPS
  VARU 0 0
  POPS
  VARO 0 0
  RETN
";
    let u = unit(text, vec![num(1.0)], vec![root_block()], &[("r", 1)]);
    assert_eq!(message(run(u)), "Reading variable before its defined");
}

// ---- Assignment ----

#[test]
fn list_destructuring() {
    let text = "\
@r:
  PUSH 0
  PUSH 1
  ARRO 2
  VARM 0 0
  VARM 0 1
  ARRM 2
  SETN
  POPS
  VARO 0 1
  RETN
";
    let u = unit(text, vec![num(1.0), num(2.0)], vec![root_block()], &[("r", 2)]);
    assert_eq!(run(u), Ok(num(2.0)));
}

#[test]
fn destructuring_shape_mismatch() {
    let text = "\
@r:
  PUSH 0
  PUSH 0
  PUSH 0
  ARRO 3
  VARM 0 0
  VARM 0 1
  ARRM 2
  SETN
  RETN
";
    let u = unit(text, vec![num(1.0)], vec![root_block()], &[("r", 2)]);
    assert_eq!(
        message(run(u)),
        "Assignment: Mismatched shape for spread assignment"
    );
}

#[test]
fn verified_assignment_outside_header() {
    let text = "\
@r:
  PUSH 0
  PUSH 1
  VFYM
  SETN
  RETN
";
    let u = unit(text, vec![num(1.0), num(2.0)], vec![root_block()], &[("r", 0)]);
    assert_eq!(message(run(u)), "Assignment: value does not match");
}

#[test]
fn builtins_see_the_calling_scope() {
    let text = "\
@root:
  PUSH 1
  VARM 0 0
  SETN
  POPS
  PUSH 1
  PUSH 0
  FN1C
  RETN
";
    let asm = assemble_labeled(text).unwrap();
    let root = BodyDesc::named(
        asm.label("root").unwrap(),
        1,
        BodyNames {
            var_ids: vec![0],
            exported: vec![false],
        },
    );
    let u = UnitDesc::new(
        asm.words(),
        vec![builtin(Vars), num(1.0)],
        vec![root_block()],
        vec![root],
    )
    .with_names(["v"]);
    let (vm, result) = eval(u);
    assert_eq!(result, Ok(Value::list(vec![Value::str("v")])));
    assert!(vm.current_scope().is_none());
}

// ---- Namespaces ----

/// Block 1 is an immediate block exporting `a` (1) and keeping `b` (2).
fn namespace_unit(root: &str, root_names: Option<BodyNames>, root_vars: u32) -> UnitDesc {
    let text = format!(
        "@root:\n{root}\
@ns:
  PUSH 0
  VARM 0 0
  SETN
  POPS
  PUSH 1
  VARM 0 1
  SETN
  POPS
  RETD
"
    );
    let asm = assemble_labeled(&text).unwrap();
    let root_body = match root_names {
        Some(names) => BodyDesc::named(asm.label("root").unwrap(), root_vars, names),
        None => BodyDesc::new(asm.label("root").unwrap(), root_vars),
    };
    let ns_body = BodyDesc::named(
        asm.label("ns").unwrap(),
        2,
        BodyNames {
            var_ids: vec![0, 1],
            exported: vec![true, false],
        },
    );
    UnitDesc::new(
        asm.words(),
        vec![num(1.0), num(2.0)],
        vec![
            root_block(),
            BlockDesc::new(BlockKind::Function, true, BodyList::Single(1)),
        ],
        vec![root_body, ns_body],
    )
    .with_names(["a", "b"])
}

#[test]
fn field_access() {
    let u = namespace_unit("  DFND 1\n  FLDO 0\n  RETN\n", None, 0);
    assert_eq!(run(u), Ok(num(1.0)));
}

#[test]
fn private_field_is_missing() {
    let u = namespace_unit("  DFND 1\n  FLDO 1\n  RETN\n", None, 0);
    assert_eq!(message(run(u)), "No key found");
}

#[test]
fn field_of_non_namespace() {
    let u = namespace_unit("  PUSH 0\n  FLDO 0\n  RETN\n", None, 0);
    assert_eq!(message(run(u)), "Trying to read a field from non-namespace");
}

#[test]
fn namespace_destructuring_by_name() {
    let root = "  DFND 1\n  VARM 0 0\n  ARRM 1\n  SETN\n  POPS\n  VARO 0 0\n  RETN\n";
    let names = BodyNames {
        var_ids: vec![0],
        exported: vec![false],
    };
    let u = namespace_unit(root, Some(names), 1);
    assert_eq!(run(u), Ok(num(1.0)));
}

#[test]
fn namespace_alias() {
    // Field `a` aliased into an unnamed slot.
    let root = "  DFND 1\n  VARM 0 0\n  ALIM 0\n  ARRM 1\n  SETN\n  POPS\n  VARO 0 0\n  RETN\n";
    let u = namespace_unit(root, None, 1);
    assert_eq!(run(u), Ok(num(1.0)));
}

#[test]
fn namespace_exposes_exports() {
    let u = namespace_unit("  DFND 1\n  RETN\n", None, 0);
    let Ok(Value::Namespace(ns)) = run(u) else {
        panic!("expected a namespace");
    };
    assert_eq!(ns.names().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(ns.get("a"), Some(num(1.0)));
    assert_eq!(ns.get("b"), None);
}

// ---- Catch frames ----

#[test]
fn nested_catch_restores_depths() {
    // Literals: 0: 0, 1: 5, 2: report, 3: ⎊, 4: throw, 5: make
    let text = "\
@root:
  PUSH 0
  PUSH 1
  PUSH 2
  PUSH 3
  DFND 1
  MD2C
  FN1C
  ARRO 2
  RETN
; F: junk ← make 0 ⋄ throw (throw ⎊ report 𝕩)
@f:
  PUSH 0
  PUSH 5
  FN1C
  VARO 0 1
  PUSH 2
  PUSH 3
  PUSH 4
  MD2C
  FN1C
  PUSH 4
  FN1C
  ARRO 2
  RETN
";
    let shared: Rc<[Value]> = vec![num(9.0)].into();
    let u = unit(
        text,
        vec![
            num(0.0),
            num(5.0),
            builtin(Report),
            catch_modifier(),
            builtin(Throw),
            builtin(Make(shared.clone())),
        ],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("f", 3)],
    );
    let block = compile(u, None).unwrap();
    let mut vm = Vm::new();
    let result = vm.evaluate(&block).unwrap();

    // Inner handler ran above root's 0 and F's junk; outer above root's 0.
    let inner = nums(&[5.0, 2.0]);
    let outer = Value::list(vec![inner, num(1.0)]);
    assert_eq!(result, Value::list(vec![num(0.0), outer]));

    assert_eq!(vm.stack_depth(), 0);
    assert_eq!(vm.env_depth(), 0);
    assert_eq!(vm.catch_depth(), 0);
    assert_eq!(vm.last_caught().map(|b| b.len()), Some(1));
    // The junk list was dropped when the outer catch unwound.
    assert_eq!(Rc::strong_count(&shared), 2);
}

#[test]
fn host_catch_around_evaluate() {
    let u = unit(
        "@r: PUSH 0\nPUSH 1\nFN1C\nRETN\n",
        vec![Value::str("boom"), builtin(Throw)],
        vec![root_block()],
        &[("r", 0)],
    );
    let block = compile(u, None).unwrap();
    let mut vm = Vm::new();
    let result = vm.catch(|vm| vm.evaluate(&block));
    assert_eq!(result, Err(Thrown::msg("boom")));
    assert_eq!(vm.env_depth(), 0);
    assert_eq!(vm.stack_depth(), 0);
}

// ---- Inverses ----

fn inverse_fixture(slots: Vec<Vec<usize>>) -> (Vm, Value) {
    let text = "\
@root:
  DFND 1
  RETN
; body code must not run when no undo header exists
@monadic:
  VARO 0 1
  PUSH 0
  FN1C
  RETN
@undo:
  VARO 0 1
  PUSH 1
  ARRO 2
  RETN
";
    let u = unit(
        text,
        vec![builtin(Throw), Value::str("undone")],
        vec![root_block(), function(slots)],
        &[("root", 0), ("monadic", 3), ("undo", 3)],
    );
    let (vm, f) = eval(u);
    (vm, f.unwrap())
}

#[test]
fn missing_undo_header() {
    let (mut vm, f) = inverse_fixture(vec![vec![1]]);
    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::Monadic, Value::Nothing, num(1.0)));
    assert_eq!(
        message(result),
        "No monadic undo header found for this block"
    );
    assert_eq!(vm.env_depth(), 0);
    // Only the failure body's env was unwound.
    assert_eq!(vm.last_caught().map(|b| b.len()), Some(1));
}

#[test]
fn undo_header_runs() {
    let (mut vm, f) = inverse_fixture(vec![vec![1], vec![], vec![2]]);
    let result = vm.call_inverse(&f, Inverse::Monadic, Value::Nothing, num(3.0));
    assert_eq!(result, Ok(Value::list(vec![num(3.0), Value::str("undone")])));

    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::OnX, num(1.0), num(3.0)));
    assert_eq!(
        message(result),
        "No dyadic F⁼ undo header found for this block"
    );
}

#[test]
fn undo_on_w_uses_the_fifth_list() {
    let (mut vm, f) = inverse_fixture(vec![vec![1], vec![], vec![], vec![], vec![2]]);
    let result = vm.call_inverse(&f, Inverse::OnW, num(1.0), num(3.0));
    assert_eq!(result, Ok(Value::list(vec![num(3.0), Value::str("undone")])));
    assert_eq!(vm.env_depth(), 0);

    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::OnX, num(1.0), num(3.0)));
    assert_eq!(
        message(result),
        "No dyadic F⁼ undo header found for this block"
    );
    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::Monadic, Value::Nothing, num(3.0)));
    assert_eq!(
        message(result),
        "No monadic undo header found for this block"
    );
}

/// A non-immediate modifier block with only a monadic body.
fn modifier_fixture(kind: BlockKind, vars: u32) -> (Vm, Value) {
    let text = "\
@root:
  DFND 1
  RETN
@monadic:
  VARO 0 1
  RETN
";
    let u = unit(
        text,
        vec![],
        vec![
            root_block(),
            BlockDesc::new(kind, false, BodyList::Slots(vec![vec![1]])),
        ],
        &[("root", 0), ("monadic", vars)],
    );
    let (vm, m) = eval(u);
    (vm, m.unwrap())
}

#[test]
fn missing_undo_header_names_the_modifier_kind() {
    // 𝕤 𝕩 𝕨 𝕣 𝕗
    let (mut vm, m) = modifier_fixture(BlockKind::Modifier1, 5);
    let f = vm.derive1(&m, builtin(Plus)).unwrap();
    assert_eq!(vm.call1(&f, num(4.0)), Ok(num(4.0)));
    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::OnW, num(1.0), num(3.0)));
    assert_eq!(
        message(result),
        "No dyadic F˜⁼ undo header found for this 1-modifier block"
    );
    assert_eq!(vm.last_caught().map(|b| b.len()), Some(1));

    // 𝕤 𝕩 𝕨 𝕣 𝕗 𝕘
    let (mut vm, m) = modifier_fixture(BlockKind::Modifier2, 6);
    let f = vm.derive2(&m, builtin(Plus), builtin(Throw)).unwrap();
    let result = vm.catch(|vm| vm.call_inverse(&f, Inverse::Monadic, Value::Nothing, num(3.0)));
    assert_eq!(
        message(result),
        "No monadic undo header found for this 2-modifier block"
    );
    assert_eq!(vm.env_depth(), 0);
}

// ---- REPL scopes ----

#[test]
fn repl_scope_grows() {
    let first = "@r:\n PUSH 0\n VARM 0 0\n SETN\n RETN\n";
    let asm = assemble_labeled(first).unwrap();
    let names = BodyNames {
        var_ids: vec![0],
        exported: vec![false],
    };
    let u = UnitDesc::new(
        asm.words(),
        vec![num(1.0)],
        vec![root_block()],
        vec![BodyDesc::named(0, 1, names)],
    )
    .with_names(["a"]);
    let block = compile(u, None).unwrap();
    let scope = Scope::new(block.clone(), BodyId(0), None, []);
    let mut vm = Vm::new();
    assert_eq!(vm.run_in_scope(&block, &scope), Ok(num(1.0)));

    // b ← 2 ⋄ ⟨a, b⟩
    let second = "@r:\n PUSH 0\n VARM 0 1\n SETN\n POPS\n VARO 0 0\n VARO 0 1\n ARRO 2\n RETN\n";
    let asm = assemble_labeled(second).unwrap();
    let names = BodyNames {
        var_ids: vec![0, 1],
        exported: vec![false, false],
    };
    let u = UnitDesc::new(
        asm.words(),
        vec![num(2.0)],
        vec![root_block()],
        vec![BodyDesc::named(0, 2, names)],
    )
    .with_names(["a", "b"]);
    let block = compile(u, Some(&scope)).unwrap();
    assert_eq!(scope.ext_len(), 1);
    assert_eq!(vm.run_in_scope(&block, &scope), Ok(nums(&[1.0, 2.0])));

    let vars: Vec<String> = scope.list_vars().iter().map(|n| n.to_string()).collect();
    assert_eq!(vars, vec!["a", "b"]);
    assert_eq!(scope.lookup("b"), Some(num(2.0)));
}

#[test]
fn repl_extension_needs_names() {
    let block = compile(
        unit("@r: PUSH 0\nRETN\n", vec![num(1.0)], vec![root_block()], &[("r", 0)]),
        None,
    )
    .unwrap();
    let scope = Scope::new(block, BodyId(0), None, []);
    let u = unit("@r: PUSH 0\nRETN\n", vec![num(1.0)], vec![root_block()], &[("r", 1)]);
    assert_eq!(
        compile(u, Some(&scope)).unwrap_err(),
        CompileError::MissingNames
    );
}

#[test]
fn repl_rejects_predicates() {
    let block = compile(
        unit("@r: PUSH 0\nRETN\n", vec![num(1.0)], vec![root_block()], &[("r", 0)]),
        None,
    )
    .unwrap();
    let scope = Scope::new(block, BodyId(0), None, []);
    let u = unit("@r: PUSH 0\nPRED\nPUSH 0\nRETN\n", vec![num(1.0)], vec![root_block()], &[("r", 0)]);
    assert_eq!(
        compile(u, Some(&scope)).unwrap_err(),
        CompileError::PredicateInRepl
    );
}

// ---- Backtraces ----

#[test]
fn uncaught_error_report() {
    // Words:  0 PUSH 0 | 2 DFND 1 | 4 FN1C | 5 RETN | 6 VARO 0 1 | 9 PUSH 1 | 11 FN1C | 12 RETN
    let text = "\
@root:
  PUSH 0
  DFND 1
  FN1C
  RETN
@g:
  VARO 0 1
  PUSH 1
  FN1C
  RETN
";
    let source = "g = {throw x}\ng \"oops\"";
    let mut starts = vec![0; 13];
    let mut ends = vec![0; 13];
    starts[4] = 14;
    ends[4] = 21;
    starts[11] = 5;
    ends[11] = 11;
    let u = unit(
        text,
        vec![Value::str("oops"), builtin(Throw)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("g", 3)],
    )
    .with_source(source, SourceIndices::new(starts, ends))
    .with_path("t.bqn");

    let (vm, result) = eval(u);
    let err = result.unwrap_err();
    let mut out = Vec::new();
    vm.report_uncaught(&err, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Error: oops\n\
         t.bqn:1:\n  \
         g = {throw x}\n       \
         ^^^^^^^\n\
         t.bqn:2:\n  \
         g \"oops\"\n  \
         ^^^^^^^^\n"
    );
}

/// `{𝕊 𝕩} 0`: unbounded self-recursion.
fn recursion_unit() -> UnitDesc {
    let text = "\
@root:
  PUSH 0
  DFND 1
  FN1C
  RETN
; 𝕊 𝕩
@rec:
  VARO 0 1
  VARO 0 0
  FN1C
  RETN
";
    unit(
        text,
        vec![num(0.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("rec", 3)],
    )
}

#[test]
fn deep_recursion_overflows_and_elides() {
    let block = compile(recursion_unit(), None).unwrap();
    let mut vm = Vm::with_config(VmConfig::default().with_max_env_depth(50));
    let result = vm.evaluate(&block);
    assert_eq!(result, Err(RuntimeError::StackOverflow.into()));
    assert_eq!(vm.env_depth(), 0);
    assert_eq!(vm.stack_depth(), 0);

    let trace = vm.uncaught_backtrace().unwrap();
    assert_eq!(trace.len(), 50);
    let rendered = trace.render();
    assert_eq!(rendered.lines().count(), 21);
    assert_eq!(rendered.lines().nth(9), Some("(30 entries omitted)"));
}

#[test]
fn default_limits_overflow_without_aborting() {
    let block = compile(recursion_unit(), None).unwrap();
    let mut vm = Vm::new();
    assert_eq!(vm.evaluate(&block), Err(RuntimeError::StackOverflow.into()));
    assert_eq!(vm.uncaught_backtrace().unwrap().len(), vm.config().max_env_depth);
    assert_eq!(vm.env_depth(), 0);

    // The VM stays usable after the overflow.
    assert_eq!(vm.evaluate(&block), Err(RuntimeError::StackOverflow.into()));
}

#[test]
fn operand_stack_limit() {
    let u = unit(
        "@r: PUSH 0\nPUSH 0\nARRO 2\nRETN\n",
        vec![num(0.0)],
        vec![root_block()],
        &[("r", 0)],
    );
    let block = compile(u, None).unwrap();
    let mut vm = Vm::with_config(VmConfig::default().with_max_stack(1));
    assert_eq!(vm.evaluate(&block), Err(RuntimeError::StackOverflow.into()));
}

// ---- Host controls ----

#[test]
fn interrupt_stops_at_block_call() {
    let u = unit(
        IDENTITY,
        vec![num(5.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("id", 3)],
    );
    let block = compile(u, None).unwrap();
    let mut vm = Vm::new();
    let handle = vm.interrupt_handle();
    handle.interrupt();
    assert_eq!(vm.evaluate(&block), Err(RuntimeError::Interrupted.into()));
    assert!(!handle.is_set());
    assert_eq!(vm.evaluate(&block), Ok(num(5.0)));
}

#[test]
fn traced_execution_gives_same_result() {
    let u = unit(
        IDENTITY,
        vec![num(5.0)],
        vec![root_block(), function(vec![vec![1]])],
        &[("root", 0), ("id", 3)],
    );
    let block = compile(u, None).unwrap();
    let mut vm = Vm::with_config(VmConfig::default().with_trace_execution(true));
    assert!(vm.start_profiler(1000));
    assert_eq!(vm.evaluate(&block), Ok(num(5.0)));
    let profile = vm.stop_profiler().unwrap();
    assert!(profile.render().starts_with("Got "));
}

#[test]
fn disassembly() {
    let u = unit("@r: PUSH 0\nRETN\n", vec![num(42.0)], vec![root_block()], &[("r", 0)]);
    let block = compile(u, None).unwrap();
    assert_eq!(
        block.disassemble_body(BodyId(0)),
        "ADDU 42   ; @0\nRETN      ; @2\n"
    );
    assert!(block
        .disassemble()
        .starts_with("function block (immediate): dyadic 0, inverse 1 1 1\n"));
}
