use std::path::PathBuf;

use anyhow::Context;
use stitch_lib::{context::KernelContext, liveness, partition::partition};
use structopt::StructOpt;

#[derive(StructOpt)]
pub struct LivenessOptions {
    #[structopt(required = true, short, long)]
    input: PathBuf,
    /// Only the stitch tensors, without the extra outputs partitioning adds.
    #[structopt(long)]
    stitch_only: bool,
}

impl LivenessOptions {
    pub fn run(&self) -> anyhow::Result<()> {
        let desc = crate::read_kernel(&self.input)?;
        let ctx = KernelContext::new(&desc).with_context(|| "Kernel has no stitch tensors.")?;

        let candidates = if self.stitch_only {
            ctx.stitch().clone()
        } else {
            partition(&desc.op_desc, &ctx).layout().tracked
        };

        let table = liveness::analyze(&desc.op_desc, &candidates)?;
        let width = table.iter().map(|(name, _)| name.len()).max().unwrap_or_default().max(6);

        println!("{:width$}  start    end  reduce", "tensor");

        for (name, live) in table {
            println!("{name:width$}  {:>5}  {:>5}  {}", live.start, live.end, live.is_reduce);
        }

        Ok(())
    }
}
