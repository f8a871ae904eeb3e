use std::collections::{HashMap, HashSet};

use crate::{
    alloc::BufferInfo,
    context::{KernelContext, NameSet},
    desc::{KernelDesc, OpDesc, OpKind, SubKernelDesc, TensorDesc},
    error::StitchError,
    partition::ShellLayout,
};

/// One sub-kernel under construction. `ops` is filled while walking the merged graph backwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subgraph {
    pub tensors: HashSet<String>,
    pub ops: Vec<OpDesc>,
    pub output_name: Vec<String>,
    pub output: Vec<TensorDesc>,
    pub input_name: Vec<String>,
    pub input: Vec<Vec<TensorDesc>>,
}

impl Subgraph {
    pub fn new(anchors: &[String]) -> Self {
        Self { tensors: anchors.iter().cloned().collect(), output_name: anchors.to_vec(), ..Default::default() }
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output.iter().any(|tensor| tensor.tensor_name == name)
    }

    fn declare_input(&mut self, tensor: &TensorDesc) {
        self.input_name.push(tensor.tensor_name.clone());
        self.input.push(vec![tensor.clone()]);
    }

    /// Seals the shell into a self-contained description, restoring topological op order.
    pub fn into_sub_kernel(mut self, merged: &KernelDesc, platform: &str) -> SubKernelDesc {
        self.ops.reverse();

        SubKernelDesc {
            composite: true,
            composite_graph: merged.composite_graph.clone(),
            id: merged.id.clone(),
            op: merged.op.clone(),
            input_desc: self.input,
            op_desc: self.ops,
            output_desc: self.output,
            platform: platform.to_string(),
            process: merged.process.clone(),
            blocksize: merged.buffer_stitch.sub_block_size.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuiltSubgraphs {
    pub shells: Vec<Subgraph>,
    pub sizes: HashMap<String, BufferInfo>,
    /// Tensor written by an in-place assign -> tensor that actually holds the value.
    pub aliases: HashMap<String, String>,
    pub fake_outputs: Vec<String>,
}

pub struct SubgraphBuilder<'a> {
    ctx: &'a KernelContext,
    layout: &'a ShellLayout,
    complement: NameSet,
}

impl<'a> SubgraphBuilder<'a> {
    pub fn new(ctx: &'a KernelContext, layout: &'a ShellLayout) -> Self {
        let complement = ctx.outputs().iter().filter(|name| !layout.boundary.contains(name)).collect();
        Self { ctx, layout, complement }
    }

    /// Global outputs that no shell is anchored on.
    pub fn complement(&self) -> &NameSet {
        &self.complement
    }

    pub fn build(&self, ops: &[OpDesc]) -> Result<BuiltSubgraphs, StitchError> {
        let mut built = BuiltSubgraphs {
            shells: self.layout.groups.iter().map(|group| Subgraph::new(group)).collect(),
            ..Default::default()
        };

        for op in ops.iter().rev() {
            if let OpKind::InplaceAssign { fake_output } = op.kind() {
                let source = op.input_desc.first().and_then(|group| group.first());

                if let (Some(written), Some(source)) = (op.output_desc.first(), source) {
                    built.aliases.insert(written.tensor_name.clone(), source.name().to_string());

                    if fake_output {
                        built.fake_outputs.push(written.tensor_name.clone());
                    }
                }
            }

            for shell in &mut built.shells {
                self.accept(op, shell, &mut built.sizes)?;
            }
        }

        for (i, shell) in built.shells.iter().enumerate() {
            log::debug!(
                "subgraph {}: {} ops, {} inputs, {} outputs",
                i + 1,
                shell.ops.len(),
                shell.input.len(),
                shell.output.len()
            );
        }

        Ok(built)
    }

    fn accept(
        &self,
        op: &OpDesc,
        shell: &mut Subgraph,
        sizes: &mut HashMap<String, BufferInfo>,
    ) -> Result<(), StitchError> {
        let matched = op.output_desc.iter().filter(|out| shell.tensors.contains(&out.tensor_name)).collect::<Vec<_>>();

        if matched.is_empty() {
            return Ok(());
        }

        shell.ops.push(op.clone());

        for out in matched {
            let name = out.tensor_name.as_str();

            if self.layout.tracked.contains(name) {
                let info = BufferInfo { size: out.byte_size()?, dtype: out.data_type().to_string() };
                sizes.insert(name.to_string(), info);
            }

            if shell.output_name.iter().any(|anchor| anchor == name) && !shell.has_output(name) {
                shell.output.push(out.clone());
            }
        }

        for input in op.tensor_inputs() {
            let name = input.tensor_name.as_str();

            if self.complement.contains(name) && !shell.has_output(name) {
                shell.output.insert(0, input.clone());
            }

            if self.ctx.is_input(name) && !shell.input_name.iter().any(|known| known == name) {
                shell.declare_input(input);
            }

            if !self.layout.boundary.contains(name) {
                shell.tensors.insert(name.to_string());
            } else if !shell.input_name.iter().chain(&shell.output_name).any(|known| known == name) {
                // produced by another subgraph: this is the stitch edge
                shell.declare_input(input);
            }
        }

        Ok(())
    }
}
