use std::{fs, path::PathBuf};

use anyhow::Context;
use stitch_lib::{DirTrace, NoTrace, StitchArgs, StitchCompiler, TraceSink};
use structopt::StructOpt;

#[derive(StructOpt)]
pub struct SplitOptions {
    #[structopt(required = true, short, long)]
    input: PathBuf,
    #[structopt(required = true, short, long)]
    output: PathBuf,
    /// Directory to dump every sub-kernel and the merged kernel into. `STITCH_DUMP_IR=on` dumps to `stitch_info`.
    #[structopt(long)]
    dump: Option<PathBuf>,
    #[structopt(long)]
    best_fit: bool,
    #[structopt(long)]
    no_reuse: bool,
    #[structopt(long, default_value = "AKG")]
    platform: String,
}

impl SplitOptions {
    pub fn run(&self) -> anyhow::Result<()> {
        let desc = crate::read_kernel(&self.input)?;

        let mut args = StitchArgs::default().platform(&self.platform);

        if self.best_fit {
            args = args.best_fit_donors();
        }

        if self.no_reuse {
            args = args.disable_reuse();
        }

        let dump = match &self.dump {
            Some(dir) => Some(DirTrace::new(dir)),
            None if std::env::var("STITCH_DUMP_IR").is_ok_and(|flag| flag == "on") => Some(DirTrace::default()),
            None => None,
        };

        let trace: &(dyn TraceSink + Sync) = match &dump {
            Some(dir) => dir,
            None => &NoTrace,
        };

        let result = StitchCompiler::new(args)
            .with_trace(trace)
            .compile(&desc)
            .with_context(|| format!("Failed to split {}.", self.input.display()))?;

        fs::create_dir_all(&self.output).with_context(|| "Provide a correct output path!")?;

        for (i, kernel) in result.kernels.iter().enumerate() {
            let path = self.output.join(format!("{}_stitch_{}.json", desc.op, i + 1));
            fs::write(&path, kernel.to_json()?).with_context(|| format!("Failed to write {}.", path.display()))?;
        }

        let path = self.output.join(format!("{}_alloc.json", desc.op));
        let report = serde_json::to_string_pretty(&result)?;
        fs::write(&path, report).with_context(|| format!("Failed to write {}.", path.display()))?;

        println!("Split {} into {} sub-kernels", desc.op, result.kernels.len());
        println!(
            "Buffers: {} fresh, {} reused, {} cleaned",
            result.alloc_map.len(),
            result.reuse_map.len(),
            result.clean_op_map.len()
        );

        if let Some(dir) = &dump {
            log::info!("dumped sub-kernels to {}", dir.dir().display());
        }

        Ok(())
    }
}
