//! Registered deployment steps, indexed by name and by tag.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    error::DeployError,
    step::{Step, StepName, Tag},
};

/// Steps in registration order.
///
/// Registration order is significant: the resolver uses it to break ties between
/// steps that do not depend on each other.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
    by_name: HashMap<StepName, usize>,
    by_tag: BTreeMap<Tag, BTreeSet<usize>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step: Step) -> Result<(), DeployError> {
        if self.by_name.contains_key(step.name()) {
            return Err(DeployError::DuplicateStepName(step.name().clone()));
        }

        let index = self.steps.len();
        self.by_name.insert(step.name().clone(), index);
        for tag in step.tags() {
            self.by_tag.entry(tag.clone()).or_default().insert(index);
        }

        tracing::trace!(step = %step.name(), index, "Step registered");
        self.steps.push(step);

        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, step: Step) -> Result<Self, DeployError> {
        self.register(step)?;
        Ok(self)
    }

    pub fn get(&self, name: &StepName) -> Result<&Step, DeployError> {
        self.index_of(name).map(|index| &self.steps[index])
    }

    pub(crate) fn index_of(&self, name: &StepName) -> Result<usize, DeployError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DeployError::UnknownStep(name.clone()))
    }

    /// Steps carrying at least one of `tags`, once each, in registration order.
    pub fn find_by_tags<'a, I>(&self, tags: I) -> Vec<&Step>
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        self.tag_indices(tags)
            .into_iter()
            .map(|index| &self.steps[index])
            .collect()
    }

    pub(crate) fn tag_indices<'a, I>(&self, tags: I) -> BTreeSet<usize>
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        tags.into_iter()
            .filter_map(|tag| self.by_tag.get(tag))
            .flatten()
            .copied()
            .collect()
    }

    pub(crate) fn by_index(&self, index: usize) -> &Step {
        &self.steps[index]
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
