use std::collections::HashMap;

use crate::{context::NameSet, desc::OpDesc, error::StitchError};

/// Span between a buffer's first definition and its last use, as op-list positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Liveness {
    pub start: usize,
    pub end: usize,
    pub is_reduce: bool,
}

impl Liveness {
    fn at(idx: usize) -> Self {
        Self { start: idx, end: idx, is_reduce: false }
    }

    /// Whether `later` can take over this buffer's storage: it is first written no earlier
    /// than this buffer's last use.
    pub fn ends_before(&self, later: &Self) -> bool {
        later.start >= self.end
    }
}

/// Computes an interval for every candidate with a single backward scan over `ops`.
///
/// The first encounter (the chronologically last use) fixes `end`; every further
/// encounter pulls `start` earlier. Results are ordered by descending `end`, ties
/// keeping the candidates' own order.
pub fn analyze(ops: &[OpDesc], candidates: &NameSet) -> Result<Vec<(String, Liveness)>, StitchError> {
    let mut found: HashMap<&str, Liveness> = HashMap::new();

    for (idx, op) in ops.iter().enumerate().rev() {
        let is_reduce = op.kind().is_reduce();

        for out in &op.output_desc {
            let name = out.tensor_name.as_str();

            if candidates.contains(name) {
                let live = found.entry(name).or_insert(Liveness::at(idx));
                live.start = idx;
                live.is_reduce |= is_reduce;
            }
        }

        if op.output_desc.is_empty() {
            continue;
        }

        for input in op.inputs() {
            let name = input.name();

            if candidates.contains(name) {
                found.entry(name).or_insert(Liveness::at(idx)).start = idx;
            }
        }
    }

    let mut sorted = candidates
        .iter()
        .map(|name| found.get(name).map(|live| (name.to_string(), *live)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            let missing = candidates.iter().find(|name| !found.contains_key(name)).unwrap_or_default();
            StitchError::BufferNotFound(missing.to_string())
        })?;

    sorted.sort_by(|(_, a), (_, b)| b.end.cmp(&a.end));

    Ok(sorted)
}
