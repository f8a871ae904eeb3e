pub mod alloc;
pub mod attr;
pub mod context;
pub mod desc;
pub mod error;
pub mod liveness;
pub mod partition;
pub mod stitch;
pub mod subgraph;
pub mod trace;

pub use alloc::{AllocationRecord, BufferMap, DonorPolicy};
pub use attr::{combine_stitch_attr, split_stitch_attr};
pub use desc::{KernelDesc, SubKernelDesc};
pub use error::StitchError;
pub use stitch::{StitchArgs, StitchCompiler, StitchResult};
pub use trace::{DirTrace, MemoryTrace, NoTrace, TraceSink};
