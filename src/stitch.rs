mod args;
#[cfg(test)]
mod tests;

use serde::Serialize;

use crate::{
    alloc::{AllocationMaps, BufferAllocator, BufferMap},
    context::{KernelContext, NameSet},
    desc::{KernelDesc, SubKernelDesc},
    error::StitchError,
    liveness,
    partition::partition,
    subgraph::{BuiltSubgraphs, SubgraphBuilder},
    trace::{NoTrace, TraceSink},
};

pub use args::StitchArgs;

/// Everything a merged kernel is split into.
#[derive(Clone, Debug, Serialize)]
pub struct StitchResult {
    #[serde(skip)]
    pub kernels: Vec<SubKernelDesc>,
    pub inputs: Vec<String>,
    /// Global outputs followed by the cleanup tensors.
    pub outputs: Vec<String>,
    pub alloc_map: BufferMap,
    pub reuse_map: BufferMap,
    pub clean_op_map: BufferMap,
    pub cleanup: Vec<String>,
}

impl StitchResult {
    /// Outputs the caller actually asked for.
    pub fn visible_outputs(&self) -> Vec<&str> {
        self.outputs.iter().filter(|name| !self.cleanup.contains(name)).map(String::as_str).collect()
    }
}

pub struct StitchCompiler<'a> {
    args: StitchArgs,
    trace: &'a (dyn TraceSink + Sync),
}

impl StitchCompiler<'static> {
    pub fn new(args: StitchArgs) -> Self {
        Self { args, trace: &NoTrace }
    }
}

impl<'a> StitchCompiler<'a> {
    pub fn with_trace<'b>(self, trace: &'b (dyn TraceSink + Sync)) -> StitchCompiler<'b> {
        StitchCompiler { args: self.args, trace }
    }

    pub fn compile(&self, desc: &KernelDesc) -> Result<StitchResult, StitchError> {
        let ctx = KernelContext::new(desc)?;
        let layout = partition(&desc.op_desc, &ctx).layout();

        let BuiltSubgraphs { shells, sizes, aliases, fake_outputs } =
            SubgraphBuilder::new(&ctx, &layout).build(&desc.op_desc)?;

        let mut kernels = Vec::with_capacity(shells.len());

        for (i, shell) in shells.into_iter().enumerate() {
            let kernel = shell.into_sub_kernel(desc, &self.args.platform);
            self.trace.kernel(&desc.op, i + 1, &kernel.to_json()?)?;
            kernels.push(kernel);
        }

        self.trace.merged(&desc.op, &desc.to_json()?)?;

        let cleanup = fake_outputs.into_iter().filter(|name| layout.tracked.contains(name)).collect::<Vec<_>>();

        let mut outputs = desc.output_names();
        outputs.extend(cleanup.iter().cloned());
        let protected: NameSet = outputs.iter().collect();

        let liveness = liveness::analyze(&desc.op_desc, &layout.tracked)?;

        let AllocationMaps { alloc_map, reuse_map, clean_op_map } = {
            let mut maps = BufferAllocator::new(&sizes, &protected)
                .reuse(self.args.allow_reuse && ctx.reuse_allowed())
                .policy(self.args.policy)
                .allocate(&liveness)?;

            maps.clean(&cleanup, &aliases)?;
            maps
        };

        log::info!(
            "{}: {} subgraphs, {} fresh buffers, {} reused, {} cleaned",
            desc.op,
            kernels.len(),
            alloc_map.len(),
            reuse_map.len(),
            clean_op_map.len()
        );

        Ok(StitchResult {
            kernels,
            inputs: desc.input_names(),
            outputs,
            alloc_map,
            reuse_map,
            clean_op_map,
            cleanup,
        })
    }
}
