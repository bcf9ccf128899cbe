// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use ir_bank::{
    Arch, AsyncState, ConstValue, IrBank, LaunchShape, ResourceId, Stmt, TaskBody,
    TaskLaunchRecord,
};

use crate::{Options, SmallNodeSet, StateFlowGraph, StateToNodesMap};

fn record(
    bank: &IrBank,
    name: &str,
    shape: LaunchShape,
    stmts: Vec<Stmt>,
) -> TaskLaunchRecord {
    bank.record(bank.intern_body(TaskBody {
        name: name.to_owned(),
        arch: Arch::X64,
        shape,
        element_wise: true,
        block_dim: 128,
        stmts,
    }))
}

/// A task that loads each input state and stores one constant into each output state.
fn task(
    bank: &IrBank,
    name: &str,
    inputs: &[AsyncState],
    outputs: &[AsyncState],
) -> TaskLaunchRecord {
    let mut stmts = Vec::new();
    let mut reg = 0;
    for &state in inputs {
        stmts.push(Stmt::Load { dst: reg, state });
        reg += 1;
    }
    stmts.push(Stmt::LoadConst {
        dst: reg,
        value: ConstValue::I64(1),
    });
    for &state in outputs {
        stmts.push(Stmt::Store { state, src: reg });
    }
    record(bank, name, LaunchShape::Range { begin: 0, end: 16 }, stmts)
}

fn listgen(bank: &IrBank, name: &str, snode: ResourceId) -> TaskLaunchRecord {
    record(
        bank,
        name,
        LaunchShape::Struct { root: snode },
        vec![
            Stmt::ClearList { resource: snode },
            Stmt::GenerateList { resource: snode },
        ],
    )
}

fn activate_write(bank: &IrBank, name: &str, snode: ResourceId) -> TaskLaunchRecord {
    record(
        bank,
        name,
        LaunchShape::Struct { root: snode },
        vec![
            Stmt::Activate { resource: snode },
            Stmt::LoadConst {
                dst: 0,
                value: ConstValue::I64(1),
            },
            Stmt::Store {
                state: AsyncState::value(snode),
                src: 0,
            },
        ],
    )
}

fn deactivate(bank: &IrBank, name: &str, snode: ResourceId) -> TaskLaunchRecord {
    record(
        bank,
        name,
        LaunchShape::Struct { root: snode },
        vec![Stmt::Deactivate { resource: snode }],
    )
}

fn extracted_names(graph: &mut StateFlowGraph) -> Vec<String> {
    graph
        .extract_to_execute()
        .into_iter()
        .map(|rec| rec.name().to_owned())
        .collect()
}

fn no_opt() -> Options {
    Options {
        fuse: false,
        listgen_dedup: false,
        demote_activation: false,
        dead_store: false,
        fusion_window: None,
    }
}

#[test]
fn small_node_set_basics() {
    let mut set = SmallNodeSet::default();
    assert!(set.insert(5));
    assert!(set.insert(3));
    assert!(!set.insert(5));
    assert_eq!(set.len(), 2);
    assert!(set.contains(3));
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 5]);
    assert!(set.remove(3));
    assert!(!set.remove(3));
    set.insert(7);
    set.remap(|id| if id == 7 { None } else { Some(id + 1) });
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![6]);
}

#[test]
fn state_to_nodes_map_basics() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let mut map = StateToNodesMap::default();
    map.entry_mut(AsyncState::value(x)).insert(1);
    map.entry_mut(AsyncState::value(y)).insert(2);
    map.entry_mut(AsyncState::value(x)).insert(3);
    assert_eq!(
        map.get(AsyncState::value(x)).unwrap().iter().collect::<Vec<_>>(),
        vec![1, 3]
    );
    // Insertion order of states is preserved.
    assert_eq!(
        map.iter().map(|(s, _)| s).collect::<Vec<_>>(),
        vec![AsyncState::value(x), AsyncState::value(y)]
    );
    assert!(map.remove(AsyncState::value(y), 2));
    assert!(map.get(AsyncState::value(y)).is_none());
    assert_eq!(map.nodes().iter().collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn round_trip_without_optimizations() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());

    let records = vec![
        task(&bank, "a", &[], &[AsyncState::value(x)]),
        task(&bank, "b", &[AsyncState::value(x)], &[AsyncState::value(y)]),
        task(&bank, "c", &[AsyncState::value(y)], &[AsyncState::value(x)]),
    ];
    graph.insert_tasks(records.clone(), false);
    graph.verify(true).unwrap();

    let out = graph.extract_to_execute();
    assert_eq!(
        out.iter().map(|r| r.name().to_owned()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert_eq!(
        out.iter().map(|r| r.body).collect::<Vec<_>>(),
        records.iter().map(|r| r.body).collect::<Vec<_>>()
    );
    assert_eq!(graph.num_pending_tasks(), 0);
    graph.verify(true).unwrap();
}

#[test]
fn launch_ids_count_per_task_name() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());
    let rec = task(&bank, "fill", &[], &[AsyncState::value(x)]);
    graph.insert_tasks(vec![rec.clone(), rec.clone(), rec], false);
    let out = graph.extract_to_execute();
    assert_eq!(
        out.iter().map(|r| r.launch_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[test]
fn fuse_two_elementwise_writers() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());

    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "b", &[], &[s1])],
        false,
    );
    assert!(graph.fuse());
    graph.verify(true).unwrap();

    assert_eq!(graph.num_pending_tasks(), 1);
    let merged = &graph.pending_tasks()[0];
    assert_eq!(merged.name(), "a+b");
    assert_eq!(
        merged.meta().output_states.iter().copied().collect::<Vec<_>>(),
        vec![s1]
    );
    assert_eq!(graph.extract_to_execute().len(), 1);
}

#[test]
fn fuse_writer_into_superset_writer() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let s1 = AsyncState::value(x);
    let s2 = AsyncState::value(y);
    let mut graph = StateFlowGraph::new(bank.clone());

    // b writes a strict superset of a's states; the pair still fuses.
    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "b", &[], &[s1, s2])],
        false,
    );
    assert!(graph.fuse());
    graph.verify(true).unwrap();

    assert_eq!(graph.num_pending_tasks(), 1);
    let merged = &graph.pending_tasks()[0];
    assert_eq!(merged.name(), "a+b");
    assert_eq!(
        merged.meta().output_states.iter().copied().collect::<Vec<_>>(),
        vec![s1, s2]
    );
}

#[test]
fn fusion_blocked_by_interposed_reader() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let s1 = AsyncState::value(x);
    let s2 = AsyncState::value(y);
    let mut graph = StateFlowGraph::new(bank.clone());

    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "r", &[s1], &[s2]),
            task(&bank, "b", &[], &[s1]),
        ],
        false,
    );
    assert!(!graph.fuse());
    graph.verify(true).unwrap();
    assert_eq!(extracted_names(&mut graph), vec!["a", "r", "b"]);
}

#[test]
fn fusion_is_idempotent() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "b", &[], &[s1])],
        false,
    );
    assert!(graph.fuse());
    assert!(!graph.fuse());
    graph.verify(true).unwrap();
}

#[test]
fn windowed_fusion_converges_across_rounds() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new_with_options(
        bank.clone(),
        Options {
            fusion_window: Some(2),
            ..Options::default()
        },
    );
    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "b", &[], &[s1]),
            task(&bank, "c", &[], &[s1]),
            task(&bank, "d", &[], &[s1]),
        ],
        false,
    );
    assert!(graph.fuse());
    graph.verify(true).unwrap();
    assert_eq!(graph.num_pending_tasks(), 1);
}

#[test]
fn listgen_filtered_at_insertion() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    let gen = listgen(&bank, "listgen_s", s);
    graph.insert_tasks(vec![gen.clone(), gen], true);
    graph.verify(true).unwrap();
    assert_eq!(graph.num_pending_tasks(), 1);
}

#[test]
fn listgen_not_filtered_after_structural_write() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    let gen = listgen(&bank, "listgen_s", s);
    graph.insert_tasks(
        vec![
            gen.clone(),
            activate_write(&bank, "touch", s),
            gen,
        ],
        true,
    );
    graph.verify(true).unwrap();
    assert_eq!(graph.num_pending_tasks(), 3);
}

#[test]
fn listgen_dedup_pass() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    let gen = listgen(&bank, "listgen_s", s);
    graph.insert_tasks(vec![gen.clone(), gen], false);
    assert_eq!(graph.num_pending_tasks(), 2);

    assert!(graph.optimize_listgen());
    graph.verify(true).unwrap();
    assert_eq!(graph.num_pending_tasks(), 1);
    assert!(!graph.optimize_listgen());
}

#[test]
fn listgen_dedup_redirects_consumers() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    let gen = listgen(&bank, "listgen_s", s);
    // A struct-for consumer of the regenerated list.
    let consumer = record(
        &bank,
        "struct_for",
        LaunchShape::Struct { root: s },
        vec![
            Stmt::Load {
                dst: 0,
                state: AsyncState::list(s),
            },
            Stmt::Store {
                state: AsyncState::value(s),
                src: 0,
            },
        ],
    );
    graph.insert_tasks(vec![gen.clone(), gen, consumer], false);
    assert!(graph.optimize_listgen());
    graph.verify(true).unwrap();

    let names = extracted_names(&mut graph);
    assert_eq!(names, vec!["listgen_s", "struct_for"]);
}

#[test]
fn dead_store_deletes_unobserved_writers() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());

    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "b", &[], &[s1])],
        false,
    );
    assert!(graph.optimize_dead_store());
    graph.verify(true).unwrap();
    assert_eq!(graph.num_pending_tasks(), 0);
    assert!(!graph.optimize_dead_store());
}

#[test]
fn dead_store_respects_live_states() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.mark_state_live(s1);

    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "b", &[], &[s1])],
        false,
    );
    // The earlier store is still overwritten unread; only the final writer is protected.
    assert!(graph.optimize_dead_store());
    graph.verify(true).unwrap();
    assert_eq!(extracted_names(&mut graph), vec!["b"]);
}

#[test]
fn dead_store_respects_readers() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let s1 = AsyncState::value(x);
    let s2 = AsyncState::value(y);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.mark_state_live(s2);

    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "r", &[s1], &[s2]),
        ],
        false,
    );
    assert!(!graph.optimize_dead_store());
    graph.verify(true).unwrap();
    assert_eq!(extracted_names(&mut graph), vec!["a", "r"]);
}

#[test]
fn write_after_read_hazards() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());

    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "r1", &[s1], &[]),
            task(&bank, "r2", &[s1], &[]),
            task(&bank, "w", &[], &[s1]),
        ],
        false,
    );
    graph.verify(true).unwrap();

    // Master positions: initial=0, a=1, r1=2, r2=3, w=4.
    let (a, r1, r2, w) = (1, 2, 3, 4);
    // Flow edges from the writer to both readers.
    let a_succs = graph.node(a).output_edges.get(s1).unwrap();
    assert!(a_succs.contains(r1));
    assert!(a_succs.contains(r2));
    // Write-after-read dependency edges from both readers to the next writer.
    let w_preds = graph.node(w).input_edges.get(s1).unwrap();
    assert!(w_preds.contains(r1));
    assert!(w_preds.contains(r2));

    let names = extracted_names(&mut graph);
    assert_eq!(names[0], "a");
    assert_eq!(names[3], "w");
    assert!(names[1..3].contains(&"r1".to_owned()));
    assert!(names[1..3].contains(&"r2".to_owned()));
}

#[test]
fn transitive_closure_of_a_chain() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let y = bank.register_resource("y", None);
    let z = bank.register_resource("z", None);
    let (s1, s2, s3) = (
        AsyncState::value(x),
        AsyncState::value(y),
        AsyncState::value(z),
    );
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());

    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "b", &[s1], &[s2]),
            task(&bank, "c", &[s2], &[s3]),
            task(&bank, "d", &[s3], &[]),
        ],
        false,
    );
    let tc = graph.compute_transitive_closure(0, 4);

    for later in 1..4 {
        assert!(tc.reaches(0, later));
        assert!(tc.has_path_to(0).contains(later));
    }
    for earlier in 0..3 {
        assert!(tc.has_path_from(3).contains(earlier));
    }
    assert!(!tc.reaches(3, 0));
    assert!(tc.reaches(2, 2));
}

#[test]
fn closure_over_subrange() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());
    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "b", &[s1], &[]),
            task(&bank, "c", &[s1], &[]),
        ],
        false,
    );
    // Range excludes "a": b and c are unordered relative to each other.
    let tc = graph.compute_transitive_closure(1, 3);
    assert!(!tc.reaches(1, 2));
    assert!(!tc.reaches(2, 1));
}

#[test]
fn demote_activation_with_guaranteeing_predecessor() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    graph.insert_tasks(
        vec![
            activate_write(&bank, "p", s),
            activate_write(&bank, "q", s),
        ],
        false,
    );
    assert!(graph.demote_activation());
    graph.verify(true).unwrap();

    let names: Vec<_> = graph.pending_tasks().iter().map(|n| n.name().to_owned()).collect();
    assert_eq!(names, vec!["p", "q_demoted"]);
    let demoted = &graph.pending_tasks()[1];
    assert!(!demoted.meta().writes(AsyncState::mask(s)));
    assert!(demoted.meta().writes(AsyncState::value(s)));

    assert!(!graph.demote_activation());
}

#[test]
fn demotion_blocked_by_deactivator() {
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let mut graph = StateFlowGraph::new(bank.clone());

    graph.insert_tasks(
        vec![
            activate_write(&bank, "p", s),
            deactivate(&bank, "kill", s),
            activate_write(&bank, "q", s),
        ],
        false,
    );
    assert!(!graph.demote_activation());
    graph.verify(true).unwrap();
    assert_eq!(extracted_names(&mut graph), vec!["p", "kill", "q"]);
}

#[test]
fn executed_tasks_still_order_later_batches() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());

    graph.insert_tasks(vec![task(&bank, "a", &[], &[s1])], false);
    assert_eq!(extracted_names(&mut graph), vec!["a"]);

    graph.insert_tasks(vec![task(&bank, "r", &[s1], &[])], false);
    graph.verify(true).unwrap();
    // The new reader is wired to the executed writer.
    let reader = graph.len() - 1;
    let preds = graph.node(reader).input_edges.get(s1).unwrap();
    assert_eq!(preds.iter().collect::<Vec<_>>(), vec![1]);
    assert_eq!(extracted_names(&mut graph), vec!["r"]);
}

#[test]
fn delete_nodes_leaves_dense_ids() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "b", &[], &[s1]),
            task(&bank, "c", &[], &[s1]),
        ],
        false,
    );
    // Dead-store elimination deletes all three and re-ids the survivors.
    assert!(graph.optimize_dead_store());
    graph.verify(true).unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.node(0).node_id(), 0);
}

#[test]
fn optimize_runs_to_fixed_point() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bank = IrBank::new();
    let s = bank.register_resource("s", None);
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.mark_state_live(s1);
    graph.mark_state_live(AsyncState::value(s));

    let gen = listgen(&bank, "listgen_s", s);
    graph.insert_tasks(
        vec![
            gen.clone(),
            gen,
            task(&bank, "a", &[], &[s1]),
            task(&bank, "b", &[], &[s1]),
            activate_write(&bank, "p", s),
            activate_write(&bank, "q", s),
        ],
        false,
    );
    assert!(graph.optimize());
    graph.verify(true).unwrap();
    assert!(!graph.optimize());
    graph.verify(true).unwrap();
}

#[test]
fn dump_dot_renders_nodes_and_edge_styles() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new_with_options(bank.clone(), no_opt());
    graph.insert_tasks(
        vec![
            task(&bank, "a", &[], &[s1]),
            task(&bank, "r", &[s1], &[]),
            task(&bank, "w", &[], &[s1]),
        ],
        false,
    );

    let mut buf: Vec<u8> = Vec::new();
    graph.dump_dot(&mut buf, Some("LR"), 4).unwrap();
    let dot = String::from_utf8(buf).unwrap();
    assert!(dot.starts_with("digraph task_graph {"));
    assert!(dot.contains("rankdir=LR;"));
    assert!(dot.contains("initial_state"));
    assert!(dot.contains("a #0"));
    assert!(dot.contains("x$value"));
    // Flow edge a -> r renders solid; the write-after-read edge r -> w renders dashed.
    assert!(dot.contains("n1 -> n2 [style=solid];"));
    assert!(dot.contains("n2 -> n3 [style=dashed];"));
    assert!(dot.ends_with("}\n"));
}

#[test]
fn disconnect_with_removes_both_directions() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "r", &[s1], &[])],
        false,
    );
    graph.disconnect_with(1, 2);
    assert!(graph.node(1).output_edges.get(s1).is_none());
    assert!(graph.node(2).input_edges.get(s1).is_none());
    graph.verify(true).unwrap();
}

#[test]
fn verify_rejects_asymmetric_edges() {
    let bank = IrBank::new();
    let x = bank.register_resource("x", None);
    let s1 = AsyncState::value(x);
    let mut graph = StateFlowGraph::new(bank.clone());
    graph.insert_tasks(
        vec![task(&bank, "a", &[], &[s1]), task(&bank, "r", &[s1], &[])],
        false,
    );
    graph.verify(true).unwrap();
    // Break symmetry by hand.
    graph.nodes[2].input_edges.remove(s1, 1);
    assert!(graph.verify(false).is_err());
}
