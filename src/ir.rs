// Intermediate representation produced by the transpiler
//
// Everything here is immutable once built and shared (behind `Arc`) by
// concurrent evaluations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::EngineError;
use crate::path::PathSpec;
use crate::value::Token;

/// Where a field mapping reads its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Constant(Token),
    /// A local variable or parameter; `path.root` is the binding name.
    LocalVar(PathSpec),
    /// The top-level input document, or with `dest` set, the snapshot of the
    /// output being built by the current mapping.
    Field(PathSpec),
    Call { projector: String, args: Vec<Source> },
}

impl Source {
    /// True if evaluating this source fans out over array elements.
    pub fn iterates(&self) -> bool {
        match self {
            Source::Constant(_) => false,
            Source::LocalVar(p) | Source::Field(p) => p.iterates(),
            Source::Call { args, .. } => args.iter().any(Source::iterates),
        }
    }

    /// True if any part of this source reads the output snapshot.
    pub fn uses_dest(&self) -> bool {
        match self {
            Source::Field(p) => p.dest,
            Source::Call { args, .. } => args.iter().any(Source::uses_dest),
            _ => false,
        }
    }

    /// True if any part of this source reads one of the local `names`.
    pub fn reads_local(&self, names: &HashSet<String>) -> bool {
        match self {
            Source::LocalVar(p) => names.contains(&p.root),
            Source::Call { args, .. } => args.iter().any(|a| a.reads_local(names)),
            _ => false,
        }
    }
}

/// Where a field mapping writes its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Bind (or extend) a local variable; `path.root` is the variable.
    LocalVar(PathSpec),
    /// Write into the output of the enclosing top-level invocation.
    RootField(PathSpec),
    /// Write into the current mapping's output. A whole path is `$this`.
    Field(PathSpec),
    /// Append to the root-level array field of this name.
    Object(String),
}

impl Target {
    pub fn path(&self) -> Option<&PathSpec> {
        match self {
            Target::LocalVar(p) | Target::RootField(p) | Target::Field(p) => Some(p),
            Target::Object(_) => None,
        }
    }
}

/// One guard of a condition; `negated` comes from an `else` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub source: Source,
    pub negated: bool,
}

/// Compute a value and assign it to a target, if every guard passes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub source: Source,
    pub target: Target,
    /// All guards must pass; empty means unconditional.
    pub condition: Vec<Guard>,
}

impl FieldMapping {
    pub fn new(source: Source, target: Target) -> Self {
        FieldMapping {
            source,
            target,
            condition: Vec::new(),
        }
    }

    /// Reads the output snapshot, so runs in the second phase of its body.
    pub fn uses_dest(&self) -> bool {
        self.source.uses_dest() || self.condition.iter().any(|g| g.source.uses_dest())
    }

    /// Source or any guard reads one of the local `names`.
    pub fn reads_local(&self, names: &HashSet<String>) -> bool {
        self.source.reads_local(names) || self.condition.iter().any(|g| g.source.reads_local(names))
    }
}

/// A DSL-defined mapping: a projector or a top-level entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingDef {
    pub name: String,
    pub params: Vec<String>,
    /// The last parameter collects all remaining arguments into an array.
    pub variadic: bool,
    pub body: Vec<FieldMapping>,
    /// Top-level mappings write `Field` targets straight into the root output.
    pub top_level: bool,
}

/// Compiled top-level mappings, by name.
#[derive(Debug, Default, Clone)]
pub struct Program {
    mappings: HashMap<String, Arc<MappingDef>>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn insert(&mut self, def: MappingDef) -> Result<(), EngineError> {
        if self.mappings.contains_key(&def.name) {
            return Err(EngineError::DuplicateName(def.name));
        }
        self.mappings.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MappingDef>> {
        self.mappings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mapping names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
