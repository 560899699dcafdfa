//! Dependency graph over schema objects
//!
//! Objects are stored in insertion order. Every forward edge (`depends_on`)
//! has a matching back edge (`depended_on_by`) on the target, and cycles are
//! rejected as soon as they would be introduced, so execution order can be
//! computed iteratively without recursion.

use crate::errors::{Result, StrataError};
use crate::schema::SchemaObject;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    objects: Vec<SchemaObject>,
    index: HashMap<String, usize>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, wiring back edges in both directions.
    ///
    /// Dependencies on objects that are not yet present are allowed and are
    /// wired when the target is inserted.
    ///
    /// # Errors
    ///
    /// * `DuplicateObject` - an object with the same name exists
    /// * `CyclicDependency` - the object closes a cycle; the graph is unchanged
    pub fn insert(&mut self, object: SchemaObject) -> Result<()> {
        let name = object.sql_name().to_string();
        if self.index.contains_key(&name) {
            return Err(StrataError::DuplicateObject { name });
        }

        let position = self.objects.len();
        self.objects.push(object);
        self.index.insert(name.clone(), position);

        if let Some(cycle) = self.find_cycle_through(&name) {
            self.objects.pop();
            self.index.remove(&name);
            return Err(StrataError::CyclicDependency { objects: cycle });
        }

        let targets = self.objects[position].depends_on.clone();
        for target in targets {
            if let Some(&t) = self.index.get(&target) {
                push_unique(&mut self.objects[t].depended_on_by, &name);
            }
        }

        let dependants: Vec<String> = self
            .objects
            .iter()
            .filter(|o| o.sql_name() != name && o.depends_on.contains(&name))
            .map(|o| o.sql_name().to_string())
            .collect();
        for dependant in dependants {
            push_unique(&mut self.objects[position].depended_on_by, &dependant);
        }

        Ok(())
    }

    /// Add the edge "`from` depends on `to`" and its back edge.
    ///
    /// # Errors
    ///
    /// * `UnknownObject` - either end is missing
    /// * `CyclicDependency` - `to` already (transitively) depends on `from`
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let f = self.position(from)?;
        let t = self.position(to)?;

        if from == to || self.reaches(to, from) {
            let mut cycle = self.path(to, from).unwrap_or_else(|| vec![to.to_string()]);
            cycle.insert(0, from.to_string());
            return Err(StrataError::CyclicDependency { objects: cycle });
        }

        push_unique(&mut self.objects[f].depends_on, to);
        push_unique(&mut self.objects[t].depended_on_by, from);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SchemaObject> {
        self.index.get(name).map(|&i| &self.objects[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SchemaObject> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.objects[i]),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SchemaObject> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Creation order: every object after all of its dependencies.
    ///
    /// Kahn's algorithm seeded in insertion order, so the result is
    /// deterministic for a given graph.
    ///
    /// # Errors
    ///
    /// * `UnknownDependency` - an edge points at an object not in the graph
    /// * `CyclicDependency` - defensive; cycles are rejected on insert
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree = vec![0usize; self.objects.len()];
        for (i, object) in self.objects.iter().enumerate() {
            for dep in &object.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(StrataError::UnknownDependency {
                        object: object.sql_name().to_string(),
                        dependency: dep.clone(),
                    });
                }
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.objects.len());

        while let Some(i) = queue.pop_front() {
            order.push(self.objects[i].sql_name().to_string());
            for dependant in &self.objects[i].depended_on_by {
                if let Some(&d) = self.index.get(dependant) {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        queue.push_back(d);
                    }
                }
            }
        }

        if order.len() != self.objects.len() {
            let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let stuck = self
                .objects
                .iter()
                .find(|o| !placed.contains(o.sql_name()))
                .map(|o| o.sql_name().to_string())
                .unwrap_or_default();
            let cycle = self
                .find_cycle_through(&stuck)
                .unwrap_or_else(|| vec![stuck]);
            return Err(StrataError::CyclicDependency { objects: cycle });
        }

        Ok(order)
    }

    /// Removal order: the reverse of creation order
    pub fn drop_order(&self) -> Result<Vec<String>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// `name` and everything it transitively depends on, in creation order
    pub fn creation_closure(&self, name: &str) -> Result<Vec<String>> {
        self.position(name)?;
        let closure = self.closure(name, |o| &o.depends_on);
        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|n| closure.contains(n))
            .collect())
    }

    /// `name` and everything that transitively depends on it, dependants first
    pub fn removal_closure(&self, name: &str) -> Result<Vec<String>> {
        self.position(name)?;
        let closure = self.closure(name, |o| &o.depended_on_by);
        Ok(self
            .drop_order()?
            .into_iter()
            .filter(|n| closure.contains(n))
            .collect())
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| StrataError::UnknownObject {
                name: name.to_string(),
            })
    }

    fn closure<F>(&self, start: &str, edges: F) -> HashSet<String>
    where
        F: Fn(&SchemaObject) -> &Vec<String>,
    {
        let mut seen = HashSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(object) = self.get(&current) {
                stack.extend(edges(object).iter().cloned());
            }
        }
        seen
    }

    /// True when `from` transitively depends on `to`
    fn reaches(&self, from: &str, to: &str) -> bool {
        self.closure(from, |o| &o.depends_on).contains(to)
    }

    /// Dependency path from `from` to `to`, both included
    fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::from([from.to_string()]);
        let mut seen = HashSet::from([from.to_string()]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut node = current;
                while let Some(p) = parent.get(&node) {
                    path.push(p.clone());
                    node = p.clone();
                }
                path.reverse();
                return Some(path);
            }
            if let Some(object) = self.get(&current) {
                for dep in &object.depends_on {
                    if seen.insert(dep.clone()) {
                        parent.insert(dep.clone(), current.clone());
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        None
    }

    /// A cycle passing through `name`, rendered as `[name, ..., name]`
    fn find_cycle_through(&self, name: &str) -> Option<Vec<String>> {
        let object = self.get(name)?;
        for dep in &object.depends_on {
            if dep == name {
                return Some(vec![name.to_string(), name.to_string()]);
            }
            if let Some(mut path) = self.path(dep, name) {
                path.insert(0, name.to_string());
                return Some(path);
            }
        }
        None
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}
