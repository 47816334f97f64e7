// harmonize - Declarative JSON-to-JSON mapping engine
// Copyright (c) 2025 harmonize contributors
// Licensed under the MIT License

//! # harmonize
//!
//! A declarative data-transformation engine: mapping units written in a small
//! mapping language are compiled to an intermediate representation and run
//! against JSON-shaped input documents to build JSON-shaped output documents,
//! typically to re-map records between two incompatible schemas.
//!
//! ## Architecture
//!
//! - `value` - the [`Token`] model (null/bool/number/string/array/container)
//! - `utils` - path lookup and assignment, merge, structural hash, deep copy
//! - `path` - the path grammar shared by read locations and write targets
//! - `signature` / `registry` - typed, arity-checked projectors and the
//!   name -> projector [`Registry`]
//! - `ast` - the parse tree handed over by the (external) parser
//! - `ir` / `transpiler` - lowering of the parse tree into IR
//! - `evaluator` - the execution engine
//! - `functions` / `datetime` - the built-in projector library
//! - `options` - engine configuration
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use harmonize::ast::Unit;
//! use harmonize::{compile, token, Evaluator, Program, Registry};
//!
//! let unit = Unit::from_json_str(r#"{
//!     "name": "Patient",
//!     "params": ["msg"],
//!     "body": [
//!         {"assign": {"target": {"field": "name[]"},
//!                     "value": {"call": {"name": "$ToUpper",
//!                                        "args": [{"path": "msg.names[]"}]}}}}
//!     ]
//! }"#).unwrap();
//!
//! let mut registry = Registry::with_builtins().unwrap();
//! let mut program = Program::new();
//! compile(&unit, &mut registry, &mut program).unwrap();
//!
//! let evaluator = Evaluator::new(Arc::new(registry), Arc::new(program));
//! let out = evaluator
//!     .execute("Patient", &token!({"names": ["ann", "bo"]}))
//!     .unwrap();
//! assert_eq!(out, token!({"name": ["ANN", "BO"]}));
//! ```
//!
//! The registry and program are immutable once compiled; a single
//! [`Evaluator`] can be shared by any number of worker threads.

pub mod ast;
pub mod datetime;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod ir;
pub mod options;
pub mod path;
pub mod registry;
pub mod signature;
pub mod transpiler;
pub mod utils;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use error::{EngineError, Error, ErrorClass};
pub use evaluator::Evaluator;
pub use ir::Program;
pub use options::Options;
pub use registry::{NativeProjector, Projector, Registry};
pub use transpiler::{compile, CompileError};
pub use value::Token;
