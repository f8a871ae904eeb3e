use std::collections::{HashMap, HashSet};

use crate::{
    context::{KernelContext, NameSet},
    desc::OpDesc,
};

/// Where the merged graph has to be cut, discovered by walking it from its results back to its inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionPlan {
    /// Tensors each stitch tensor's subgraph must additionally export, in stitch order.
    pub extra_outputs: Vec<(String, Vec<String>)>,
    /// Final outputs that were split off into a subgraph of their own.
    pub final_outputs: Vec<String>,
    /// Final outputs left sharing the last stitch subgraph.
    pub final_within_graph: Vec<String>,
    pub extra_splits: usize,
}

/// The anchor tensors of every subgraph shell, plus the name sets later stages need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellLayout {
    pub groups: Vec<Vec<String>>,
    /// Stitch tensors and extra outputs; every one of them needs a buffer.
    pub tracked: NameSet,
    /// Every anchor of every shell. Backward expansion stops at these.
    pub boundary: NameSet,
}

pub fn partition(ops: &[OpDesc], ctx: &KernelContext) -> PartitionPlan {
    let mut spans: Vec<HashSet<&str>> = vec![HashSet::new(); ctx.stitch().len()];
    let mut extra: Vec<(String, Vec<String>)> =
        ctx.stitch().iter().map(|name| (name.to_string(), Vec::new())).collect();
    let extra_slot: HashMap<String, usize> =
        extra.iter().enumerate().map(|(slot, (name, _))| (name.clone(), slot)).collect();

    let mut consumed = HashSet::new();
    let mut final_outputs = NameSet::default();
    let mut within = Vec::new();
    let mut extra_splits = 0;

    let mut idx = 0;
    let mut cur_stitch: Option<&str> = None;
    let mut open_final: Option<&str> = None;

    for op in ops.iter().rev() {
        for out in &op.output_desc {
            let out_name = out.tensor_name.as_str();

            if ctx.is_stitch(out_name) {
                idx += 1;
                cur_stitch = Some(out_name);

                // a final output never shares its subgraph with an unrelated stitch edge
                if let Some(fin) = open_final.take() {
                    final_outputs.insert(fin);
                    if let Some(pos) = within.iter().position(|name: &String| name == fin) {
                        within.remove(pos);
                    }
                    extra_splits += 1;
                    spans.push(HashSet::new());
                }
            }

            if !consumed.contains(out_name) {
                open_final = Some(out_name);
                within.push(out_name.to_string());
            }

            while spans.len() <= idx {
                spans.push(HashSet::new());
            }

            spans[idx].insert(out_name);

            for inp in op.inputs() {
                let name = inp.name();
                spans[idx].insert(name);

                let exportable = inp.as_tensor().is_some() && !ctx.is_stitch(name) && !ctx.is_input(name);
                let crosses = ctx.is_output(name) || spans[..idx].iter().any(|span| span.contains(name));

                if exportable && crosses && open_final.is_none() {
                    if let Some(slot) = cur_stitch.and_then(|stitch| extra_slot.get(stitch)) {
                        extra[*slot].1.insert(0, name.to_string());
                    }
                }

                consumed.insert(name);
            }
        }
    }

    log::debug!(
        "partitioned {} ops across {} stitch tensors with {extra_splits} extra splits",
        ops.len(),
        ctx.stitch().len()
    );

    PartitionPlan {
        extra_outputs: extra,
        final_outputs: final_outputs.to_vec(),
        final_within_graph: within,
        extra_splits,
    }
}

impl PartitionPlan {
    pub fn layout(&self) -> ShellLayout {
        let mut groups = Vec::new();
        let mut exported = NameSet::default();

        for (stitch, extras) in &self.extra_outputs {
            let mut group = vec![stitch.clone()];
            group.extend(extras.iter().filter(|name| exported.insert(name)).cloned());
            groups.push(group);
        }

        let tracked: NameSet = groups.iter().flatten().collect();

        if let Some(last) = groups.last_mut() {
            last.extend(self.final_within_graph.iter().cloned());
        }

        for name in &self.final_outputs {
            if !tracked.contains(name) {
                groups.push(vec![name.clone()]);
            }
        }

        let boundary = groups.iter().flatten().collect();

        ShellLayout { groups, tracked, boundary }
    }
}
