mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{chain, f32_input, ToyExecutor};
use hetero_rs::engine::{
    get_converter, list_converters, register_converter, unregister_converter, EngineInstance,
    InterpreterConverter, SubgraphConverter,
};
use hetero_rs::graph::utils::{f32_tensor, literal_f32_values};
use hetero_rs::graph::{Graph, Operation, UnaryOp};
use hetero_rs::{BackendError, Compiler, ShapeHints, ShapeRange};

#[test]
fn converters_are_registered_by_name() {
    let converter = InterpreterConverter::with_name("registry-test", Arc::new(ToyExecutor));
    register_converter(Arc::new(converter));

    assert!(list_converters().contains(&"registry-test".to_string()));
    let found = get_converter("registry-test").expect("registered converter");
    assert_eq!(found.name(), "registry-test");

    assert!(unregister_converter("registry-test").is_some());
    assert!(get_converter("registry-test").is_none());
    assert!(get_converter("nonexistent").is_none());
}

#[test]
fn compiler_keeps_the_converter_it_was_given() {
    let executor = Arc::new(ToyExecutor);
    let converter = InterpreterConverter::with_name("shared", Arc::clone(&executor));
    assert!(Arc::ptr_eq(converter.executor(), &executor));

    let compiler = Compiler::new(Arc::new(converter));
    assert_eq!(compiler.converter().name(), "shared");
    assert_eq!(compiler.converter().version(), 0);
}

#[test]
fn interpreted_engine_exposes_positional_slots() -> Result<()> {
    let fixture = chain();
    let converter = InterpreterConverter::new(ToyExecutor);
    let engine = converter.convert(&fixture.graph, &ShapeHints::new())?;

    let inputs: Vec<_> = engine.input_slots().iter().map(|s| s.name.as_str()).collect();
    let outputs: Vec<_> = engine.output_slots().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(inputs, vec!["input_0"]);
    assert_eq!(outputs, vec!["output_0"]);
    assert!(engine.name().starts_with("interpreter-"));

    let result = engine.forward(&[f32_input(&[-1.0, 3.0])])?;
    assert_eq!(literal_f32_values(&result[0]), Some(vec![0.0, 6.0]));
    Ok(())
}

#[test]
fn interpreted_engine_checks_arity() -> Result<()> {
    let fixture = chain();
    let engine =
        InterpreterConverter::new(ToyExecutor).convert(&fixture.graph, &ShapeHints::new())?;
    let err = engine.forward(&[]).unwrap_err();
    assert!(matches!(err, BackendError::Arity { expected: 1, found: 0, .. }), "{err}");
    Ok(())
}

#[test]
fn interpreter_rejects_hint_of_wrong_rank() {
    let fixture = chain();
    let hints = ShapeHints::new().with("input_0", ShapeRange::fixed(vec![1, 2]));
    let err = InterpreterConverter::new(ToyExecutor)
        .convert(&fixture.graph, &hints)
        .unwrap_err();
    assert!(err.message().contains("rank"), "{err}");
}

#[test]
fn interpreter_rejects_non_tensor_outputs() -> Result<()> {
    let mut graph = Graph::new();
    let x = graph.add_input(f32_tensor(&[2]));
    let relu = graph.append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_tensor(&[2]))?;
    let list = graph.create_list(vec![relu])?;
    graph.register_output(list)?;

    let err = InterpreterConverter::new(ToyExecutor)
        .convert(&graph, &ShapeHints::new())
        .unwrap_err();
    assert!(err.message().contains("non-tensor"), "{err}");
    Ok(())
}

#[test]
fn interpreted_engine_rejects_wrongly_sized_inputs() -> Result<()> {
    let fixture = chain();
    let engine =
        InterpreterConverter::new(ToyExecutor).convert(&fixture.graph, &ShapeHints::new())?;
    let err = engine.forward(&[f32_input(&[1.0, 2.0, 3.0])]).unwrap_err();
    assert!(err.to_string().contains("expects 8 bytes"), "{err}");
    Ok(())
}
