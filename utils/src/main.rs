mod liveness;
mod split;

use structopt::StructOpt;

#[derive(StructOpt)]
pub enum Options {
    Split(split::SplitOptions),
    Liveness(liveness::LivenessOptions),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    match Options::from_args() {
        Options::Split(options) => options.run(),
        Options::Liveness(options) => options.run(),
    }
}

fn read_kernel(path: &std::path::Path) -> anyhow::Result<stitch_lib::KernelDesc> {
    use anyhow::Context;

    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}.", path.display()))?;
    stitch_lib::KernelDesc::from_json(&json).with_context(|| "Input is not a merged kernel description.")
}
