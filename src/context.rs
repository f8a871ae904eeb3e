use std::collections::HashSet;

use crate::{desc::KernelDesc, error::StitchError};

/// Insertion-ordered set of tensor names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl NameSet {
    pub fn insert(&mut self, name: &str) -> bool {
        if self.members.insert(name.to_string()) {
            self.order.push(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.order.clone()
    }
}

impl<S: AsRef<str>> FromIterator<S> for NameSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = Self::default();
        for name in iter {
            set.insert(name.as_ref());
        }
        set
    }
}

/// Membership facts about a merged kernel, computed once and shared by every stage.
#[derive(Clone, Debug)]
pub struct KernelContext {
    inputs: NameSet,
    outputs: NameSet,
    stitch: NameSet,
    reuse_allowed: bool,
}

impl KernelContext {
    pub fn new(desc: &KernelDesc) -> Result<Self, StitchError> {
        let stitch: NameSet = desc.stitch_names().into_iter().collect();

        if stitch.is_empty() {
            return Err(StitchError::NoStitchGroups);
        }

        Ok(Self {
            inputs: desc.input_names().into_iter().collect(),
            outputs: desc.output_names().into_iter().collect(),
            stitch,
            reuse_allowed: desc.process != "aicore",
        })
    }

    pub fn inputs(&self) -> &NameSet {
        &self.inputs
    }

    pub fn outputs(&self) -> &NameSet {
        &self.outputs
    }

    pub fn stitch(&self) -> &NameSet {
        &self.stitch
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.inputs.contains(name)
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.outputs.contains(name)
    }

    pub fn is_stitch(&self, name: &str) -> bool {
        self.stitch.contains(name)
    }

    /// AI-core kernels keep every stitch buffer in its own slot.
    pub fn reuse_allowed(&self) -> bool {
        self.reuse_allowed
    }
}
