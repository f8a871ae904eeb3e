use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};

use super::*;
use crate::{
    alloc::AllocationRecord,
    desc::{InputDesc, OpDesc, TensorDesc},
    liveness::Liveness,
    trace::MemoryTrace,
};

fn tensor(name: &str, shape: &[i64]) -> TensorDesc {
    TensorDesc::new(name, shape, "float32")
}

fn op(name: &str, inputs: &[&TensorDesc], output: &TensorDesc) -> OpDesc {
    OpDesc {
        name: name.to_string(),
        input_desc: inputs.iter().map(|&input| vec![InputDesc::from(input.clone())]).collect(),
        output_desc: vec![output.clone()],
        attr: None,
        extra: Default::default(),
    }
}

fn kernel(ops: Vec<OpDesc>, inputs: &[&TensorDesc], outputs: &[&TensorDesc], stitch: Value) -> KernelDesc {
    let mut desc: KernelDesc = serde_json::from_value(json!({
        "op": "Fused_test",
        "buffer_stitch": {"stitch_op": stitch},
        "process": "cuda",
        "composite_graph": "12.34",
        "id": 7
    }))
    .unwrap();

    desc.input_desc = inputs.iter().map(|&input| vec![input.clone()]).collect();
    desc.output_desc = outputs.iter().map(|&output| output.clone()).collect();
    desc.op_desc = ops;
    desc
}

/// `x -> t1 -> ... -> tn`, one elementwise op per step.
fn chain(len: usize, stitch: &[usize]) -> KernelDesc {
    let x = tensor("x", &[16]);
    let ts = (1..=len).map(|i| tensor(&format!("t{i}"), &[16])).collect::<Vec<_>>();

    let ops = (0..len).map(|i| op("Abs", &[if i == 0 { &x } else { &ts[i - 1] }], &ts[i])).collect();
    let stitch = stitch.iter().map(|i| vec![format!("t{i}")]).collect::<Vec<_>>();

    kernel(ops, &[&x], &[&ts[len - 1]], json!(stitch))
}

fn produced(kernel: &SubKernelDesc) -> Vec<&str> {
    kernel.op_desc.iter().flat_map(|op| op.output_desc.iter().map(|out| out.tensor_name.as_str())).collect()
}

/// Two stitch tensors `a` and `r` with disjoint lifetimes, `r` produced by `mid`.
fn two_stitches(mid: &str) -> KernelDesc {
    let [x, a, b, r, y] = ["x", "a", "b", "r", "y"].map(|name| tensor(name, &[16]));

    let ops = vec![op("Abs", &[&x], &a), op("Exp", &[&a], &b), op(mid, &[&b], &r), op("Neg", &[&r], &y)];

    kernel(ops, &[&x], &[&y], json!([["a"], ["r"]]))
}

#[test]
fn single_stitch_tensor_gives_two_subgraphs() -> Result<(), StitchError> {
    let result = StitchCompiler::new(StitchArgs::default()).compile(&chain(3, &[1]))?;

    assert_eq!(result.kernels.len(), 2);
    assert_eq!(result.inputs, ["x"]);
    assert_eq!(result.outputs, ["t3"]);

    Ok(())
}

#[test]
fn chain_splits_at_stitch_tensor() -> Result<(), StitchError> {
    let result = StitchCompiler::new(StitchArgs::default()).compile(&chain(5, &[3]))?;

    let [first, second] = &result.kernels[..] else { panic!("expected two subgraphs") };

    assert_eq!(produced(first), ["t1", "t2", "t3"]);
    assert_eq!(first.input_names(), ["x"]);
    assert_eq!(first.output_names(), ["t3"]);

    assert_eq!(produced(second), ["t4", "t5"]);
    assert_eq!(second.input_names(), ["t3"]);
    assert_eq!(second.output_names(), ["t5"]);

    for kernel in &result.kernels {
        assert!(kernel.composite);
        assert_eq!(kernel.platform, "AKG");
        assert_eq!(kernel.process, "cuda");
        assert_eq!(kernel.op, "Fused_test");
        assert_eq!(kernel.id, json!(7));
        assert_eq!(kernel.composite_graph, json!("12.34"));
        assert_eq!(kernel.blocksize, None);
    }

    Ok(())
}

#[test]
fn reductions_keep_their_own_buffer() -> Result<(), StitchError> {
    let result = StitchCompiler::new(StitchArgs::default()).compile(&two_stitches("ReduceSum"))?;

    assert_eq!(result.kernels.len(), 3);
    assert!(result.alloc_map.contains("r"));
    assert!(result.alloc_map.contains("a"));
    assert!(result.reuse_map.is_empty());

    Ok(())
}

#[test]
fn later_buffer_reuses_dead_one() -> Result<(), StitchError> {
    let result = StitchCompiler::new(StitchArgs::default()).compile(&two_stitches("Exp"))?;

    let fresh = AllocationRecord::Fresh { dtype: "float32".to_string(), size: 64 };
    assert_eq!(result.alloc_map.get("a"), Some(&fresh));
    assert_eq!(result.reuse_map.get("r"), Some(&AllocationRecord::Reuse { donor: "a".to_string(), size: 64 }));
    assert!(!result.alloc_map.contains("r"));

    Ok(())
}

#[test]
fn reuse_switched_off() -> Result<(), StitchError> {
    let mut desc = two_stitches("Exp");
    let result = StitchCompiler::new(StitchArgs::default().disable_reuse()).compile(&desc)?;
    assert!(result.reuse_map.is_empty());

    desc.process = "aicore".to_string();
    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc)?;
    assert!(result.reuse_map.is_empty());
    assert_eq!(result.alloc_map.len(), 2);

    Ok(())
}

#[test]
fn fake_outputs_are_cleaned_up() -> Result<(), StitchError> {
    let desc: KernelDesc = serde_json::from_value(json!({
        "op": "Fused_assign",
        "input_desc": [
            [{"tensor_name": "x", "shape": [8], "data_type": "float16"}],
            [{"tensor_name": "w", "shape": [8], "data_type": "float16"}]
        ],
        "output_desc": [{"tensor_name": "y", "shape": [8], "data_type": "float16"}],
        "op_desc": [
            {
                "name": "Abs",
                "input_desc": [[{"tensor_name": "x", "shape": [8], "data_type": "float16"}]],
                "output_desc": [{"tensor_name": "t", "shape": [8], "data_type": "float16"}]
            },
            {
                "name": "InplaceAssign",
                "input_desc": [
                    [{"tensor_name": "w", "shape": [8], "data_type": "float16"}],
                    [{"tensor_name": "t", "shape": [8], "data_type": "float16"}],
                    [{"tensor_name": "t", "shape": [8], "data_type": "float16"}]
                ],
                "output_desc": [{"tensor_name": "f", "shape": [8], "data_type": "float16"}],
                "attr": [{"name": "fake_output", "value": true}]
            },
            {
                "name": "Neg",
                "input_desc": [[{"tensor_name": "f", "shape": [8], "data_type": "float16"}]],
                "output_desc": [{"tensor_name": "y", "shape": [8], "data_type": "float16"}]
            }
        ],
        "buffer_stitch": {"stitch_op": [["f"]], "sub_block_size": [64, 64]}
    }))?;

    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc)?;

    assert_eq!(result.outputs, ["y", "f"]);
    assert_eq!(result.cleanup, ["f"]);
    assert_eq!(result.visible_outputs(), ["y"]);

    assert!(!result.alloc_map.contains("f") && !result.reuse_map.contains("f"));
    let cleaned = AllocationRecord::Fresh { dtype: "float16".to_string(), size: 16 };
    assert_eq!(result.clean_op_map.get("w"), Some(&cleaned));

    assert!(result.kernels.iter().all(|kernel| kernel.blocksize == Some(json!([64, 64]))));

    let report = serde_json::to_value(&result)?;
    assert_eq!(report["alloc_map"], json!({"EMPTY": []}));
    assert_eq!(report["reuse_map"], json!({"EMPTY": []}));
    assert_eq!(report["clean_op_map"], json!({"w": ["float16", 16]}));

    Ok(())
}

#[test]
fn missing_stitch_groups() {
    let mut desc = chain(3, &[1]);
    desc.buffer_stitch.stitch_op.clear();

    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc);
    assert!(matches!(result, Err(StitchError::NoStitchGroups)));
}

#[test]
fn stitch_tensor_nobody_produces() {
    let mut desc = chain(3, &[1]);
    desc.buffer_stitch.stitch_op.push(vec!["ghost".to_string()]);

    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc);
    assert!(matches!(result, Err(StitchError::BufferNotFound(name)) if name == "ghost"));
}

#[test]
fn traces_every_kernel() -> Result<(), StitchError> {
    let trace = MemoryTrace::default();
    let desc = chain(5, &[3]);

    let result = StitchCompiler::new(StitchArgs::default().platform("CCE")).with_trace(&trace).compile(&desc)?;

    assert_eq!(trace.names(), ["Fused_test_stitch_1.json", "Fused_test_stitch_2.json", "Fused_test_stitch.json"]);

    let records = trace.records();
    let first: SubKernelDesc = serde_json::from_str(&records[0].1)?;
    assert_eq!(first, result.kernels[0]);
    assert_eq!(first.platform, "CCE");
    assert_eq!(KernelDesc::from_json(&records[2].1)?, desc);

    Ok(())
}

#[test]
fn op_records_survive_the_split() -> Result<(), StitchError> {
    let ops = json!([
        {
            "name": "Abs",
            "input_desc": [[{"tensor_name": "x"}]],
            "output_desc": [{"tensor_name": "s", "shape": [4], "data_type": "float32"}],
            "attr": null
        },
        {
            "name": "Mul",
            "input_desc": [
                [{"tensor_name": "s", "shape": [4], "data_type": "float32"}],
                [{"tensor_name": "c", "value": 2.0}]
            ],
            "output_desc": [{"tensor_name": "y", "format": "DefaultFormat"}],
            "attr": null,
            "impl_path": ""
        }
    ]);

    let desc: KernelDesc = serde_json::from_value(json!({
        "op": "Fused_records",
        "input_desc": [[{"tensor_name": "x"}]],
        "output_desc": [{"tensor_name": "y"}],
        "op_desc": ops.clone(),
        "buffer_stitch": {"stitch_op": [["s"]], "sub_block_size": null}
    }))?;

    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc)?;
    assert_eq!(result.kernels.len(), 2);

    let emitted = result.kernels.iter().flat_map(|kernel| &kernel.op_desc).collect::<Vec<_>>();
    assert_eq!(serde_json::to_value(&emitted)?, ops);

    for kernel in &result.kernels {
        let json: Value = serde_json::from_str(&kernel.to_json()?)?;
        assert_eq!(json.get("blocksize"), Some(&Value::Null));
    }

    Ok(())
}

#[test]
fn extra_outputs_are_tracked_end_to_end() -> Result<(), StitchError> {
    let [x, a, s, b] = ["x", "a", "s", "b"].map(|name| tensor(name, &[4]));
    let ops = vec![op("Abs", &[&x], &a), op("Exp", &[&a], &s), op("Add", &[&s, &a], &b)];
    let desc = kernel(ops, &[&x], &[&b], json!([["s"]]));

    let result = StitchCompiler::new(StitchArgs::default()).compile(&desc)?;

    let [first, second] = &result.kernels[..] else { panic!("expected two subgraphs") };
    assert_eq!(produced(first), ["a", "s"]);
    assert_eq!(first.output_names(), ["s", "a"]);
    assert_eq!(produced(second), ["b"]);
    assert_eq!(second.input_names(), ["s", "a"]);

    // both are read by the last op, so neither can host the other
    let fresh = AllocationRecord::Fresh { dtype: "float32".to_string(), size: 16 };
    assert_eq!(result.alloc_map.get("a"), Some(&fresh));
    assert_eq!(result.alloc_map.get("s"), Some(&fresh));
    assert!(result.reuse_map.is_empty());

    let tracked: NameSet = ["s", "a"].into_iter().collect();
    for (name, live) in liveness::analyze(&desc.op_desc, &tracked)? {
        check_liveness(&desc, &name, &live);
    }

    Ok(())
}

#[test]
fn one_compiler_across_threads() -> Result<(), StitchError> {
    fn shareable<T: Send + Sync>(_: &T) {}

    let trace = MemoryTrace::default();
    let compiler = StitchCompiler::new(StitchArgs::default()).with_trace(&trace);
    shareable(&compiler);

    let descs = (2..6).map(|len| chain(len, &[1])).collect::<Vec<_>>();
    let compiler = &compiler;

    let results = std::thread::scope(|scope| {
        let handles = descs.iter().map(|desc| scope.spawn(move || compiler.compile(desc))).collect::<Vec<_>>();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect::<Result<Vec<_>, _>>()
    })?;

    assert!(results.iter().all(|result| result.kernels.len() == 2));
    assert_eq!(trace.names().len(), descs.len() * 3);

    Ok(())
}

/// Random sequences of single ops and fork/join diamonds, stitched only between blocks.
fn random_blocks(rng: &mut StdRng) -> KernelDesc {
    let shape = |rng: &mut StdRng| [rng.gen_range(1..5i64) * 8];

    let x = tensor("x", &shape(rng));
    let mut ops = Vec::new();
    let mut boundaries = Vec::new();
    let mut prev = x.clone();
    let mut count = 0;

    let mut fresh = |rng: &mut StdRng| {
        count += 1;
        tensor(&format!("t{count}"), &shape(rng))
    };

    for _ in 0..rng.gen_range(2..8) {
        let out = fresh(rng);

        if rng.gen_bool(0.5) {
            let (b, c) = (fresh(rng), fresh(rng));
            ops.push(op("Exp", &[&prev], &b));
            let reduce = if rng.gen_bool(0.3) { "ReduceSum" } else { "Neg" };
            ops.push(op(reduce, &[&prev], &c));
            ops.push(op("Add", &[&b, &c], &out));
        } else {
            ops.push(op("Abs", &[&prev], &out));
        }

        boundaries.push(out.tensor_name.clone());
        prev = out;
    }

    boundaries.pop();

    let mut stitch = boundaries.iter().filter(|_| rng.gen_bool(0.5)).cloned().collect::<Vec<_>>();

    if stitch.is_empty() {
        stitch.push(boundaries[0].clone());
    }

    let groups = stitch.chunks(2).map(<[String]>::to_vec).collect::<Vec<_>>();

    kernel(ops, &[&x], &[&prev], json!(groups))
}

fn check_liveness(desc: &KernelDesc, name: &str, live: &Liveness) {
    let producer = desc.op_desc.iter().position(|op| op.output_desc.iter().any(|out| out.tensor_name == name));
    let last_use = desc.op_desc.iter().rposition(|op| op.inputs().any(|input| input.name() == name));

    assert!(live.start <= live.end);
    assert_eq!(Some(live.start), producer);
    assert_eq!(live.end, last_use.or(producer).unwrap_or_default());
}

#[test]
fn random_graphs_partition_and_allocate_soundly() -> Result<(), StitchError> {
    let mut rng = StdRng::seed_from_u64(0x5717c4);

    for _ in 0..200 {
        let desc = random_blocks(&mut rng);
        let args = if rng.gen_bool(0.5) { StitchArgs::default() } else { StitchArgs::default().best_fit_donors() };
        let result = StitchCompiler::new(args).compile(&desc)?;

        // coverage and disjointness
        let mut seen = HashMap::new();
        for kernel in &result.kernels {
            for name in produced(kernel) {
                *seen.entry(name.to_string()).or_insert(0) += 1;
            }
        }

        assert_eq!(seen.len(), desc.op_desc.len());
        assert!(seen.values().all(|&count| count == 1));

        let stitch = desc.stitch_names();
        assert_eq!(result.kernels.len(), stitch.len() + 1);

        // liveness
        let tracked: NameSet = stitch.iter().collect();
        let liveness = liveness::analyze(&desc.op_desc, &tracked)?;
        let live: HashMap<_, _> = liveness.iter().map(|(name, live)| (name.as_str(), *live)).collect();

        for (name, interval) in &live {
            check_liveness(&desc, name, interval);
        }

        // completeness
        let placed = stitch.iter().filter(|name| result.alloc_map.contains(name) != result.reuse_map.contains(name));
        assert_eq!(placed.count(), stitch.len());
        assert_eq!(result.alloc_map.len() + result.reuse_map.len(), stitch.len());

        // soundness
        let maps = AllocationMaps {
            alloc_map: result.alloc_map.clone(),
            reuse_map: result.reuse_map.clone(),
            clean_op_map: result.clean_op_map.clone(),
        };

        let mut slots: HashMap<&str, Vec<&str>> = HashMap::new();
        for name in &stitch {
            let slot = maps.slot_of(name).unwrap();
            slots.entry(slot).or_default().push(name);
        }

        for (slot, users) in &slots {
            let slot_size = result.alloc_map.get(slot).map(AllocationRecord::size).unwrap();

            for (i, a) in users.iter().enumerate() {
                assert!(result.alloc_map.get(a).or(result.reuse_map.get(a)).unwrap().size() <= slot_size);

                for b in &users[i + 1..] {
                    assert!(live[a].ends_before(&live[b]) || live[b].ends_before(&live[a]), "{a} and {b} overlap");
                }
            }
        }

        for (name, record) in result.alloc_map.iter().chain(result.reuse_map.iter()) {
            if live[name].is_reduce {
                assert!(record.donor().is_none());
            }
        }
    }

    Ok(())
}

#[test]
fn random_chains() -> Result<(), StitchError> {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..200 {
        let len = rng.gen_range(2..16);
        let stitch = (1..len).filter(|_| rng.gen_bool(0.4)).collect::<Vec<_>>();

        if stitch.is_empty() {
            continue;
        }

        let desc = chain(len, &stitch);
        let result = StitchCompiler::new(StitchArgs::default()).compile(&desc)?;

        assert_eq!(result.kernels.len(), stitch.len() + 1);

        let covered = result.kernels.iter().flat_map(produced).collect::<HashSet<_>>();
        assert_eq!(covered.len(), len);

        // only the last stitch buffer can take over a slot: the first one's, after which every donor is taken
        let first = format!("t{}", stitch[0]);
        let last = format!("t{}", stitch[stitch.len() - 1]);

        if stitch.len() > 1 {
            assert_eq!(result.reuse_map.len(), 1);
            assert_eq!(result.reuse_map.get(&last).and_then(AllocationRecord::donor), Some(first.as_str()));
        } else {
            assert!(result.reuse_map.is_empty());
        }

        assert_eq!(result.alloc_map.len() + result.reuse_map.len(), stitch.len());
    }

    Ok(())
}
