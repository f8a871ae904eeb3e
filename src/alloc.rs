use std::collections::{BTreeMap, HashMap};

use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{context::NameSet, error::StitchError, liveness::Liveness};

pub const EMPTY: &str = "EMPTY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    pub size: i64,
    pub dtype: String,
}

/// Where a stitch buffer lives: a slot of its own, or the slot of an earlier-dying donor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocationRecord {
    Fresh { dtype: String, size: i64 },
    Reuse { donor: String, size: i64 },
}

impl AllocationRecord {
    pub fn size(&self) -> i64 {
        match self {
            Self::Fresh { size, .. } | Self::Reuse { size, .. } => *size,
        }
    }

    pub fn donor(&self) -> Option<&str> {
        match self {
            Self::Reuse { donor, .. } => Some(donor),
            Self::Fresh { .. } => None,
        }
    }
}

impl Serialize for AllocationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fresh { dtype, size } => (dtype, size).serialize(serializer),
            Self::Reuse { donor, size } => (donor, size).serialize(serializer),
        }
    }
}

/// Buffer name -> record. An empty map serializes as `{"EMPTY": []}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferMap(BTreeMap<String, AllocationRecord>);

impl BufferMap {
    pub fn get(&self, name: &str) -> Option<&AllocationRecord> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, record: AllocationRecord) -> Option<AllocationRecord> {
        self.0.insert(name.to_string(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<AllocationRecord> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AllocationRecord)> {
        self.0.iter().map(|(name, record)| (name.as_str(), record))
    }
}

impl Serialize for BufferMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(EMPTY, &Vec::<String>::new())?;
            return map.end();
        }

        self.0.serialize(serializer)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocationMaps {
    pub alloc_map: BufferMap,
    pub reuse_map: BufferMap,
    pub clean_op_map: BufferMap,
}

impl AllocationMaps {
    /// The buffer whose fresh slot `name` ends up in, following chains of reuse.
    pub fn slot_of<'a>(&'a self, mut name: &'a str) -> Option<&'a str> {
        for _ in 0..=self.reuse_map.len() {
            if self.alloc_map.contains(name) {
                return Some(name);
            }

            name = self.reuse_map.get(name)?.donor()?;
        }

        None
    }

    /// Moves every fake output out of the allocation maps, re-keying it by the tensor it aliases.
    pub fn clean(&mut self, fake_outputs: &[String], aliases: &HashMap<String, String>) -> Result<(), StitchError> {
        for fake in fake_outputs {
            let record = self
                .alloc_map
                .remove(fake)
                .or_else(|| self.reuse_map.remove(fake))
                .ok_or_else(|| StitchError::BufferNotFound(fake.clone()))?;

            let source = aliases.get(fake).ok_or_else(|| StitchError::MissingAlias(fake.clone()))?;

            log::trace!("{fake} cleaned onto {source}");
            self.clean_op_map.insert(source, record);
        }

        Ok(())
    }
}

/// How to pick between several donors that could host a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DonorPolicy {
    /// The first exact size match, otherwise the last compatible donor scanned.
    #[default]
    LastCompatible,
    /// The first exact size match, otherwise the smallest compatible donor.
    BestFit,
}

pub struct BufferAllocator<'a> {
    sizes: &'a HashMap<String, BufferInfo>,
    protected: &'a NameSet,
    reuse: bool,
    policy: DonorPolicy,
}

impl<'a> BufferAllocator<'a> {
    pub fn new(sizes: &'a HashMap<String, BufferInfo>, protected: &'a NameSet) -> Self {
        Self { sizes, protected, reuse: true, policy: DonorPolicy::default() }
    }

    pub fn reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn policy(mut self, policy: DonorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `liveness` must be ordered by descending end, as returned by [`crate::liveness::analyze`].
    pub fn allocate(&self, liveness: &[(String, Liveness)]) -> Result<AllocationMaps, StitchError> {
        let info = liveness
            .iter()
            .map(|(name, _)| self.sizes.get(name).ok_or_else(|| StitchError::UnsizedBuffer(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut maps = AllocationMaps::default();
        let mut reusers = vec![Vec::new(); liveness.len()];

        for (i, (name, live)) in liveness.iter().enumerate() {
            let donor = if live.is_reduce || !self.reuse {
                None
            } else {
                self.find_donor(i, liveness, &info, &mut reusers)
            };

            let size = info[i].size;

            if let Some(j) = donor {
                let donor = liveness[j].0.clone();
                log::trace!("{name} ({size} bytes) reuses {donor}");
                maps.reuse_map.insert(name, AllocationRecord::Reuse { donor, size });
            } else {
                log::trace!("{name} ({size} bytes) gets a fresh slot");
                maps.alloc_map.insert(name, AllocationRecord::Fresh { dtype: info[i].dtype.clone(), size });
            }
        }

        Ok(maps)
    }

    fn find_donor(
        &self,
        i: usize,
        liveness: &[(String, Liveness)],
        info: &[&BufferInfo],
        reusers: &mut [Vec<usize>],
    ) -> Option<usize> {
        let live = &liveness[i].1;
        let size = info[i].size;

        let mut chosen: Option<usize> = None;
        let mut conflict = false;

        for j in (i + 1..liveness.len()).rev() {
            let (donor, donor_live) = &liveness[j];

            if !donor_live.ends_before(live) || size > info[j].size || self.protected.contains(donor) {
                continue;
            }

            // a donor already shared with a buffer still live here is off limits, as is every later one
            conflict = conflict
                || reusers[j].iter().any(|&k| liveness[k].1.end >= live.end || liveness[k].1.end >= live.start);

            if conflict {
                continue;
            }

            reusers[j].push(i);

            if size == info[j].size {
                return Some(j);
            }

            chosen = match (self.policy, chosen) {
                (DonorPolicy::BestFit, Some(best)) if info[best].size <= info[j].size => Some(best),
                _ => Some(j),
            };
        }

        chosen
    }
}
