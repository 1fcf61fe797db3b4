//! Integration tests for the kiln IR, interpreter and backends

use kiln::interp::{run_buffered, BufferedHost, Interpreter};
use kiln::ir::Function;
use kiln::*;

fn int(name: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: Type::I32,
    }
}

fn with_runtime(name: &str) -> ModuleBuilder {
    let mut builder = ModuleBuilder::new(name);
    builder.declare_function(
        "readln",
        vec![Param {
            name: "target".to_string(),
            ty: Type::Ptr,
        }],
        Type::I32,
    );
    builder.declare_function("writeln", vec![int("value")], Type::I32);
    builder
}

/// `for i := 1 to 3` shaped loop printing the induction variable.
fn counting_loop() -> Module {
    let mut builder = with_runtime("loop");
    builder.declare_function("main", vec![], Type::I32);
    let entry = builder.append_block_to("main", "entry").unwrap();
    builder.position_at_end("main", entry).unwrap();

    let slot = builder.alloca("i").unwrap();
    builder.store(Value::Const(1), &slot).unwrap();
    let body = builder.append_block("loop").unwrap();
    builder.jump(body).unwrap();

    builder.position_at_end("main", body).unwrap();
    let current = builder.load(&slot).unwrap();
    builder.call("writeln", vec![current]).unwrap();
    let current = builder.load(&slot).unwrap();
    let next = builder.binop(BinOp::Add, current, Value::Const(1)).unwrap();
    builder.store(next, &slot).unwrap();
    let again = builder.icmp(CmpOp::Sle, next, Value::Const(3)).unwrap();
    let after = builder.append_block("afterloop").unwrap();
    builder.branch(again, body, after).unwrap();

    builder.position_at_end("main", after).unwrap();
    builder.ret(Some(Value::Const(0))).unwrap();
    builder.build()
}

/// `if c then 10 else 20` with both arms joined by a phi.
fn select(cond: i32) -> Module {
    let mut builder = ModuleBuilder::new("select");
    builder.declare_function("main", vec![], Type::I32);
    let entry = builder.append_block_to("main", "entry").unwrap();
    builder.position_at_end("main", entry).unwrap();
    let test = builder.icmp(CmpOp::Ne, Value::Const(cond), Value::Const(0)).unwrap();
    let then_block = builder.append_block("then").unwrap();
    let else_block = builder.append_block("else").unwrap();
    let merge = builder.append_block("ifcont").unwrap();
    builder.branch(test, then_block, else_block).unwrap();

    builder.position_at_end("main", then_block).unwrap();
    builder.jump(merge).unwrap();
    builder.position_at_end("main", else_block).unwrap();
    builder.jump(merge).unwrap();

    builder.position_at_end("main", merge).unwrap();
    let joined = builder
        .phi(vec![
            (Value::Const(10), then_block),
            (Value::Const(20), else_block),
        ])
        .unwrap();
    builder.ret(Some(joined)).unwrap();
    builder.build()
}

#[test]
fn test_ir_module_creation() {
    let module = Module::new("test");
    assert_eq!(module.name, "test");
    assert!(module.functions.is_empty());
    assert!(module.globals.is_empty());
}

#[test]
fn test_ir_function_creation() {
    let func = Function::new("add", vec![int("a"), int("b")], Type::I32);
    assert_eq!(func.name, "add");
    assert_eq!(func.return_type, Type::I32);
    assert!(func.is_declaration());
}

#[test]
fn test_block_labels_are_numbered() {
    let module = counting_loop();
    let main = module.function("main").unwrap();
    let labels: Vec<&str> = main.blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["entry0", "loop1", "afterloop2"]);
}

#[test]
fn test_loop_verifies_and_runs() {
    let module = counting_loop();
    module.verify().unwrap();

    let (code, output) = run_buffered(&module, "main", std::iter::empty()).unwrap();
    assert_eq!(code, 0);
    assert_eq!(output, vec![1, 2, 3]);
}

#[test]
fn test_phi_joins_both_arms() {
    for (cond, expected) in [(1, 10), (0, 20), (-5, 10)] {
        let module = select(cond);
        module.verify().unwrap();
        let mut interpreter = Interpreter::new(&module, BufferedHost::default());
        assert_eq!(interpreter.run("main").unwrap(), expected);
    }
}

#[test]
fn test_phi_with_wrong_predecessor_is_rejected() {
    let mut builder = ModuleBuilder::new("bad");
    builder.declare_function("main", vec![], Type::I32);
    let entry = builder.append_block_to("main", "entry").unwrap();
    let other = builder.append_block_to("main", "other").unwrap();
    builder.position_at_end("main", entry).unwrap();
    builder.jump(other).unwrap();
    builder.position_at_end("main", other).unwrap();
    let joined = builder.phi(vec![(Value::Const(1), other)]).unwrap();
    builder.ret(Some(joined)).unwrap();

    assert!(matches!(
        builder.build().verify(),
        Err(KilnError::InvalidIR(_))
    ));
}

#[test]
fn test_globals_keep_their_initializer() {
    let mut builder = with_runtime("globals");
    let max = builder.add_global("MAX", 10);
    builder.declare_function("main", vec![], Type::I32);
    let entry = builder.append_block_to("main", "entry").unwrap();
    builder.position_at_end("main", entry).unwrap();
    let value = builder.load(&max).unwrap();
    builder.call("writeln", vec![value]).unwrap();
    builder.store(Value::Const(3), &max).unwrap();
    builder.ret(Some(Value::Const(0))).unwrap();
    let module = builder.build();

    let mut interpreter = Interpreter::new(&module, BufferedHost::default());
    interpreter.run("main").unwrap();
    assert_eq!(interpreter.host().output, vec![10]);
    assert_eq!(interpreter.global("MAX"), Some(3));
    assert_eq!(module.global("MAX").unwrap().initializer, 10);
}

#[test]
fn test_printer_shows_slots_and_globals() {
    let mut builder = with_runtime("print");
    builder.add_global("n", 0);
    let text = {
        let module = counting_loop();
        module.to_string()
    };
    assert!(text.contains("$0 = slot i32 ; i"));
    assert!(text.contains("br %"));
    assert!(text.contains("afterloop2:"));

    let globals = builder.build().to_string();
    assert!(globals.contains("global @n = 0"));
    assert!(globals.contains("declare i32 @readln(ptr %target)"));
}

#[test]
fn test_switch_to_block_stays_in_function() {
    let mut builder = with_runtime("switch");
    builder.declare_function("main", vec![], Type::I32);
    let entry = builder.append_block_to("main", "entry").unwrap();
    assert!(matches!(
        builder.switch_to_block(entry),
        Err(KilnError::NoInsertionPoint)
    ));

    builder.position_at_end("main", entry).unwrap();
    let later = builder.append_block("later").unwrap();
    builder.switch_to_block(later).unwrap();
    builder.ret(Some(Value::Const(1))).unwrap();
    builder.switch_to_block(entry).unwrap();
    builder.jump(later).unwrap();
    assert!(matches!(
        builder.switch_to_block(BlockId(7)),
        Err(KilnError::InvalidIR(_))
    ));

    let module = builder.build();
    module.verify().unwrap();
    assert_eq!(run_buffered(&module, "main", Vec::new()).unwrap().0, 1);
}

#[cfg(feature = "cranelift-backend")]
#[test]
fn test_cranelift_backend() {
    use backend::cranelift::CraneliftBackend;
    use backend::Backend;

    let backend = CraneliftBackend::new();
    assert_eq!(backend.name(), "cranelift");
    assert!(backend.supported_targets().contains(&"x86_64"));
}

#[cfg(feature = "cranelift-backend")]
#[test]
fn test_cranelift_emits_object_bytes() {
    use backend::cranelift::CraneliftBackend;
    use backend::Backend;

    let object = CraneliftBackend::new().generate(&counting_loop()).unwrap();
    assert!(!object.is_empty());
}

#[cfg(feature = "cranelift-backend")]
#[test]
fn test_cranelift_jit_matches_interpreter() {
    use backend::cranelift::CraneliftBackend;

    for cond in [0, 1] {
        let module = select(cond);
        let mut interpreter = Interpreter::new(&module, BufferedHost::default());
        let expected = interpreter.run("main").unwrap();
        assert_eq!(CraneliftBackend::new().run_main(&module).unwrap(), expected);
    }
}
