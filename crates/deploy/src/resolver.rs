//! Tag resolution into an ordered execution plan.

use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap, HashMap, HashSet},
};

use crate::{
    error::DeployError,
    registry::StepRegistry,
    step::{Step, Tag},
};

/// Resolve `tags` into the steps to execute, dependencies first.
///
/// The selected steps are those carrying one of `tags`. When nothing matches and
/// `fallback_to_global` is set, every registered step is selected instead. Transitive
/// dependencies are then pulled in and the result is ordered topologically; among the
/// steps ready at the same point, the one registered first goes first.
pub fn resolve<'r>(
    registry: &'r StepRegistry,
    tags: &[Tag],
    fallback_to_global: bool,
) -> Result<Vec<&'r Step>, DeployError> {
    let mut selected = registry.tag_indices(tags);

    if selected.is_empty() {
        if fallback_to_global {
            tracing::debug!(?tags, "No step matches the requested tags, selecting every step");
            selected = (0..registry.len()).collect();
        } else {
            tracing::warn!(?tags, "No step matches the requested tags");
            return Ok(Vec::new());
        }
    }

    let closure = Closure::collect(registry, &selected)?;
    let order = topological_order(registry, &closure);

    tracing::debug!(
        steps = ?order.iter().map(|step| step.name().as_str()).collect::<Vec<_>>(),
        "Resolved execution order"
    );

    Ok(order)
}

/// Selected steps plus their transitive dependencies, as registry indices.
struct Closure {
    members: BTreeSet<usize>,
    /// Dependency indices of each member.
    edges: HashMap<usize, Vec<usize>>,
}

impl Closure {
    fn collect(registry: &StepRegistry, roots: &BTreeSet<usize>) -> Result<Self, DeployError> {
        let mut closure = Self {
            members: BTreeSet::new(),
            edges: HashMap::new(),
        };
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for &root in roots {
            if !closure.members.contains(&root) {
                closure.visit(registry, root, &mut rec_stack, &mut path)?;
            }
        }

        Ok(closure)
    }

    fn visit(
        &mut self,
        registry: &StepRegistry,
        node: usize,
        rec_stack: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Result<(), DeployError> {
        self.members.insert(node);
        rec_stack.insert(node);
        path.push(node);

        let step = registry.by_index(node);
        let mut deps = Vec::with_capacity(step.dependencies().len());

        for dep_name in step.dependencies() {
            let dep = registry.index_of(dep_name)?;
            deps.push(dep);

            if rec_stack.contains(&dep) {
                let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&dep))
                    .map(|&n| registry.by_index(n).name().clone())
                    .collect();
                return Err(DeployError::CyclicDependency { cycle });
            }

            if !self.members.contains(&dep) {
                self.visit(registry, dep, rec_stack, path)?;
            }
        }

        self.edges.insert(node, deps);
        path.pop();
        rec_stack.remove(&node);

        Ok(())
    }
}

/// Kahn's algorithm with a min-heap on registration index.
fn topological_order<'r>(registry: &'r StepRegistry, closure: &Closure) -> Vec<&'r Step> {
    let mut in_degree: HashMap<usize, usize> = HashMap::new();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &node in &closure.members {
        let deps = closure.edges.get(&node).map(Vec::as_slice).unwrap_or_default();
        in_degree.insert(node, deps.len());
        for &dep in deps {
            dependents.entry(dep).or_default().push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&node, _)| Reverse(node))
        .collect();

    let mut order = Vec::with_capacity(closure.members.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(registry.by_index(node));

        for &dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
    }

    order
}
