// Execution engine
// Walks compiled mapping bodies against an input document and assembles the
// output, dispatching projector calls through the registry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::error::EngineError;
use crate::ir::{FieldMapping, Guard, MappingDef, Program, Source, Target};
use crate::options::Options;
use crate::path::{render_segments, PathSpec, Segment};
use crate::registry::{Projector, Registry};
use crate::signature::{ParamType, Signature};
use crate::utils::{field_mut, get_field, is_truthy, merge};
use crate::value::Token;

/// Shape a target is fixed to by its first assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Array,
    Container,
}

impl Shape {
    fn of(token: &Token) -> Shape {
        match token {
            Token::Array(_) => Shape::Array,
            Token::Container(_) => Shape::Container,
            _ => Shape::Scalar,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Scalar => "scalar",
            Shape::Array => "array",
            Shape::Container => "container",
        })
    }
}

/// A value under construction plus the shape each written path was fixed to.
#[derive(Debug, Default)]
struct Output {
    value: Token,
    shapes: HashMap<String, Shape>,
}

impl Output {
    /// Write `value` at `path`.
    ///
    /// Appends always push, `Null` included. Other writes skip `Null` and
    /// merge into whatever is already there.
    fn assign(&mut self, path: &[Segment], append: bool, value: Token) -> Result<(), EngineError> {
        if !append && value.is_null() {
            return Ok(());
        }
        let key = render_segments(path);
        let shape = if append { Shape::Array } else { Shape::of(&value) };
        if let Some(&seen) = self.shapes.get(&key) {
            if seen != shape {
                return Err(conflict(
                    &key,
                    format!("{} target cannot take a {}", seen, shape),
                ));
            }
        }

        let slot = field_mut(&mut self.value, path).map_err(|e| into_conflict(&key, e))?;
        if append {
            if slot.is_null() {
                *slot = Token::array(Vec::new());
            }
            let kind = slot.kind();
            match slot.as_array_mut() {
                Some(items) => items.push(value),
                None => return Err(conflict(&key, format!("cannot append to {}", kind))),
            }
        } else {
            // A scalar may be written again only with the same value.
            if !slot.is_null() && slot.is_scalar() && value.is_scalar() && *slot != value {
                return Err(conflict(
                    &key,
                    format!("already holds {}, cannot take {}", slot, value),
                ));
            }
            merge(&value, slot, false).map_err(|e| into_conflict(&key, e))?;
        }
        self.shapes.insert(key, shape);
        Ok(())
    }
}

fn target_name(key: &str) -> String {
    if key.is_empty() {
        "$this".to_string()
    } else {
        key.to_string()
    }
}

fn conflict(key: &str, reason: String) -> EngineError {
    EngineError::TargetConflict {
        target: target_name(key),
        reason,
    }
}

fn into_conflict(key: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::TypeMismatch(reason) => conflict(key, reason),
        other => other,
    }
}

/// Per-invocation scope: local bindings, the mapping's own output and the
/// `dest` snapshot once the first phase of the body has run.
struct Environment<'i> {
    input: &'i Token,
    vars: Output,
    output: Output,
    top_level: bool,
    depth: usize,
    snapshot: Option<Token>,
}

impl<'i> Environment<'i> {
    fn new(input: &'i Token, depth: usize, top_level: bool) -> Self {
        Environment {
            input,
            vars: Output::default(),
            output: Output::default(),
            top_level,
            depth,
            snapshot: None,
        }
    }

    fn bind(&mut self, name: &str, value: Token) -> Result<(), EngineError> {
        *field_mut(&mut self.vars.value, &[Segment::Key(name.to_string())])? = value;
        Ok(())
    }

    /// Unbound variables read as `Null`.
    fn lookup(&self, path: &PathSpec) -> Result<Token, EngineError> {
        match self.vars.value.get(&path.root) {
            Some(bound) => get_field(bound, &path.relative()),
            None => Ok(Token::Null),
        }
    }
}

/// Split a body into the mappings that run before the `dest` snapshot and
/// those that run after it, keeping body order within each phase.
fn phases(body: &[FieldMapping]) -> (Vec<&FieldMapping>, Vec<&FieldMapping>) {
    let mut direct = Vec::with_capacity(body.len());
    let mut deferred = Vec::new();
    let mut late_locals: HashSet<String> = HashSet::new();
    for mapping in body {
        if mapping.uses_dest() || mapping.reads_local(&late_locals) {
            if let Target::LocalVar(path) = &mapping.target {
                late_locals.insert(path.root.clone());
            }
            deferred.push(mapping);
        } else {
            direct.push(mapping);
        }
    }
    (direct, deferred)
}

/// A source value, or one value per iteration.
#[derive(Debug)]
enum Evaluated {
    One(Token),
    Each(Vec<Token>),
}

fn expand(path: &PathSpec, value: Token) -> Result<Evaluated, EngineError> {
    if !path.iterates() {
        return Ok(Evaluated::One(value));
    }
    match value {
        Token::Array(items) => Ok(Evaluated::Each(items.as_ref().clone())),
        Token::Null => Ok(Evaluated::Each(Vec::new())),
        other => Err(EngineError::mismatch(format!(
            "cannot iterate over {} at {}",
            other.kind(),
            path
        ))),
    }
}

/// Runs compiled mappings.
///
/// Holds the registry and program behind `Arc`s; one evaluator can serve any
/// number of threads, each call to [`Evaluator::execute`] getting its own
/// environment.
///
/// ```
/// use std::sync::Arc;
/// use harmonize::ast::{Expr, Statement, TargetNode, Unit};
/// use harmonize::{compile, token, Evaluator, Program, Registry};
///
/// let unit = Unit {
///     name: "Main".into(),
///     params: vec!["src".into()],
///     body: vec![Statement::assign(
///         TargetNode::field("total"),
///         Expr::call("$Sum", vec![Expr::path("src.a"), Expr::path("src.b")]),
///     )],
///     projectors: vec![],
/// };
/// let mut registry = Registry::with_builtins().unwrap();
/// let mut program = Program::new();
/// compile(&unit, &mut registry, &mut program).unwrap();
///
/// let evaluator = Evaluator::new(Arc::new(registry), Arc::new(program));
/// let out = evaluator.execute("Main", &token!({"a": 1i64, "b": 2i64})).unwrap();
/// assert_eq!(out, token!({"total": 3i64}));
/// ```
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: Arc<Registry>,
    program: Arc<Program>,
    options: Options,
}

impl Evaluator {
    pub fn new(registry: Arc<Registry>, program: Arc<Program>) -> Self {
        Evaluator::with_options(registry, program, Options::default())
    }

    pub fn with_options(registry: Arc<Registry>, program: Arc<Program>, options: Options) -> Self {
        Evaluator {
            registry,
            program,
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run the top-level mapping `name` against `input`.
    ///
    /// The mapping's first parameter is bound to `input`. Returns the root
    /// output, `Null` if nothing was written.
    pub fn execute(&self, name: &str, input: &Token) -> Result<Token, EngineError> {
        let def = self
            .program
            .get(name)
            .ok_or_else(|| EngineError::UnknownProjector(name.to_string()))?;
        trace!("executing {}", name);

        let mut root = Output::default();
        let mut env = Environment::new(input, 0, true);
        for (i, param) in def.params.iter().enumerate() {
            let value = if i == 0 { input.clone() } else { Token::Null };
            env.bind(param, value)?;
        }
        self.run_body(def, &mut env, &mut root)?;
        Ok(root.value)
    }

    /// Call a registered projector directly, outside any mapping. `RootField`
    /// and `Object` writes made by a DSL projector are discarded.
    pub fn call(&self, name: &str, args: Vec<Token>) -> Result<Token, EngineError> {
        let mut root = Output::default();
        self.dispatch(name, args, 0, &Token::Null, &mut root)
    }

    // ── Mapping bodies ──────────────────────────────────────────────────

    /// Non-`dest` mappings run first, in order; then the output is
    /// snapshotted and the `dest` mappings run against it, in order. A
    /// mapping that reads a local written by a deferred mapping is deferred
    /// too, so it still sees that local bound.
    fn run_body(
        &self,
        def: &MappingDef,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<(), EngineError> {
        let (direct, deferred) = phases(&def.body);

        for mapping in direct {
            self.apply(mapping, env, root)?;
        }
        if deferred.is_empty() {
            return Ok(());
        }

        let snapshot = if env.top_level {
            root.value.clone()
        } else {
            env.output.value.clone()
        };
        env.snapshot = Some(snapshot);
        for mapping in deferred {
            self.apply(mapping, env, root)?;
        }
        Ok(())
    }

    fn apply(
        &self,
        mapping: &FieldMapping,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<(), EngineError> {
        for guard in &mapping.condition {
            if !self.check_guard(guard, env, root)? {
                return Ok(());
            }
        }
        match self.eval_source(&mapping.source, env, root)? {
            Evaluated::One(value) => self.assign(&mapping.target, value, env, root),
            Evaluated::Each(values) => {
                for value in values {
                    self.assign(&mapping.target, value, env, root)?;
                }
                Ok(())
            }
        }
    }

    /// Projector guards must return a boolean; anything else is tested for
    /// truthiness.
    fn check_guard(
        &self,
        guard: &Guard,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<bool, EngineError> {
        let value = match self.eval_source(&guard.source, env, root)? {
            Evaluated::One(value) => value,
            Evaluated::Each(_) => {
                return Err(EngineError::invalid("conditions cannot iterate over arrays"))
            }
        };
        let pass = match (&guard.source, &value) {
            (Source::Call { .. }, Token::Bool(b)) => *b,
            (Source::Call { projector, .. }, other) => {
                return Err(EngineError::mismatch(format!(
                    "condition {} returned {}, expected boolean",
                    projector,
                    other.kind()
                )))
            }
            (_, value) => is_truthy(value),
        };
        Ok(pass != guard.negated)
    }

    fn assign(
        &self,
        target: &Target,
        value: Token,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<(), EngineError> {
        match target {
            Target::LocalVar(path) => env.vars.assign(&path.absolute(), path.iterates(), value),
            Target::RootField(path) => root.assign(&path.absolute(), path.iterates(), value),
            Target::Field(path) => {
                let out = if env.top_level {
                    root
                } else {
                    &mut env.output
                };
                out.assign(&path.absolute(), path.iterates(), value)
            }
            Target::Object(name) => root.assign(&[Segment::Key(name.clone())], true, value),
        }
    }

    // ── Sources ─────────────────────────────────────────────────────────

    fn eval_source(
        &self,
        source: &Source,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<Evaluated, EngineError> {
        match source {
            Source::Constant(token) => Ok(Evaluated::One(token.clone())),
            Source::LocalVar(path) => expand(path, env.lookup(path)?),
            Source::Field(path) => {
                let value = if path.dest {
                    match &env.snapshot {
                        Some(snapshot) => get_field(snapshot, &path.absolute())?,
                        None => Token::Null,
                    }
                } else {
                    get_field(env.input, &path.absolute())?
                };
                expand(path, value)
            }
            Source::Call { projector, args } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval_source(arg, env, root)?);
                }
                self.call_each(projector, evaluated, env, root)
            }
        }
    }

    /// Zip iterating arguments (equal lengths required), broadcast the rest.
    fn call_each(
        &self,
        projector: &str,
        args: Vec<Evaluated>,
        env: &mut Environment<'_>,
        root: &mut Output,
    ) -> Result<Evaluated, EngineError> {
        let mut width: Option<usize> = None;
        for arg in &args {
            if let Evaluated::Each(items) = arg {
                match width {
                    Some(n) if n != items.len() => {
                        return Err(EngineError::invalid(format!(
                            "{}: iterated arguments have different lengths ({} and {})",
                            projector,
                            n,
                            items.len()
                        )))
                    }
                    _ => width = Some(items.len()),
                }
            }
        }

        let Some(n) = width else {
            let values = args
                .into_iter()
                .map(|a| match a {
                    Evaluated::One(t) => t,
                    Evaluated::Each(_) => Token::Null,
                })
                .collect();
            let result = self.dispatch(projector, values, env.depth, env.input, root)?;
            return Ok(Evaluated::One(result));
        };

        let mut results = Vec::with_capacity(n);
        for i in 0..n {
            let values = args
                .iter()
                .map(|a| match a {
                    Evaluated::One(t) => t.clone(),
                    Evaluated::Each(items) => items[i].clone(),
                })
                .collect();
            results.push(self.dispatch(projector, values, env.depth, env.input, root)?);
        }
        Ok(Evaluated::Each(results))
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    fn dispatch(
        &self,
        name: &str,
        args: Vec<Token>,
        depth: usize,
        input: &Token,
        root: &mut Output,
    ) -> Result<Token, EngineError> {
        trace!("dispatch {} with {} arguments", name, args.len());
        match self.registry.lookup(name)? {
            Projector::Native(native) => native.call(&args),
            Projector::Mapping(def) => self.invoke(def, args, depth + 1, input, root),
        }
    }

    fn invoke(
        &self,
        def: &MappingDef,
        args: Vec<Token>,
        depth: usize,
        input: &Token,
        root: &mut Output,
    ) -> Result<Token, EngineError> {
        if depth > self.options.max_call_depth {
            return Err(EngineError::invalid(format!(
                "{}: call depth exceeds {}",
                def.name, self.options.max_call_depth
            )));
        }

        let fixed = if def.variadic {
            def.params.len().saturating_sub(1)
        } else {
            def.params.len()
        };
        Signature::new(
            vec![ParamType::Any; fixed],
            def.variadic.then_some(ParamType::Any),
        )
        .check_arity(&def.name, args.len())?;

        let mut env = Environment::new(input, depth, false);
        let mut args = args.into_iter();
        for param in &def.params[..fixed] {
            env.bind(param, args.next().unwrap_or_default())?;
        }
        if let Some(rest) = def.params.get(fixed) {
            env.bind(rest, Token::array(args.collect()))?;
        }

        self.run_body(def, &mut env, root)?;
        Ok(env.output.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ProjectorDecl, Statement, TargetNode, Unit};
    use crate::token;
    use crate::transpiler::compile;

    fn evaluator_with(
        body: Vec<Statement>,
        projectors: Vec<ProjectorDecl>,
        options: Options,
    ) -> Evaluator {
        let unit = Unit {
            name: "Main".into(),
            params: vec!["src".into()],
            body,
            projectors,
        };
        let mut registry = Registry::with_builtins().unwrap();
        let mut program = Program::new();
        compile(&unit, &mut registry, &mut program).unwrap();
        Evaluator::with_options(Arc::new(registry), Arc::new(program), options)
    }

    fn evaluator(body: Vec<Statement>) -> Evaluator {
        evaluator_with(body, vec![], Options::default())
    }

    fn projector(name: &str, params: &[&str], body: Vec<Statement>) -> ProjectorDecl {
        ProjectorDecl {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            variadic: false,
            body,
        }
    }

    #[test]
    fn test_output_append_and_merge() {
        let mut out = Output::default();
        let xs = [Segment::Key("xs".into())];
        out.assign(&xs, true, token!(1i64)).unwrap();
        out.assign(&xs, true, Token::Null).unwrap();
        out.assign(&[Segment::Key("a".into())], false, token!({"x": 1i64}))
            .unwrap();
        out.assign(&[Segment::Key("a".into())], false, token!({"y": 2i64}))
            .unwrap();
        out.assign(&[Segment::Key("skip".into())], false, Token::Null)
            .unwrap();
        assert_eq!(
            out.value,
            token!({"xs": [1i64, null], "a": {"x": 1i64, "y": 2i64}})
        );
    }

    #[test]
    fn test_output_shape_conflict() {
        let mut out = Output::default();
        let a = [Segment::Key("a".into())];
        out.assign(&a, false, token!("text")).unwrap();
        let err = out.assign(&a, false, token!({"x": 1i64})).unwrap_err();
        assert!(matches!(err, EngineError::TargetConflict { target, .. } if target == "a"));

        let err = out.assign(&a, true, token!(1i64)).unwrap_err();
        assert!(matches!(err, EngineError::TargetConflict { .. }));
    }

    #[test]
    fn test_fields_and_variables() {
        let ev = evaluator(vec![
            Statement::assign(TargetNode::var("tmp"), Expr::path("src.name")),
            Statement::assign(TargetNode::field("patient.name"), Expr::path("tmp")),
            Statement::assign(TargetNode::field("patient.id"), Expr::path("$root.id")),
        ]);
        let out = ev
            .execute("Main", &token!({"name": "Ann", "id": 7i64}))
            .unwrap();
        assert_eq!(out, token!({"patient": {"name": "Ann", "id": 7i64}}));
    }

    #[test]
    fn test_iteration_appends_in_order() {
        let ev = evaluator(vec![Statement::assign(
            TargetNode::field("doubled[]"),
            Expr::call("$Mul", vec![Expr::path("src.xs[]"), Expr::constant(2.0)]),
        )]);
        let out = ev.execute("Main", &token!({"xs": [1i64, 2i64, 3i64]})).unwrap();
        assert_eq!(out, token!({"doubled": [2i64, 4i64, 6i64]}));

        let out = ev.execute("Main", &token!({"xs": null})).unwrap();
        assert_eq!(out, Token::Null);
    }

    #[test]
    fn test_zipped_iteration_lengths() {
        let ev = evaluator(vec![Statement::assign(
            TargetNode::field("sums[]"),
            Expr::call("$Sum", vec![Expr::path("src.a[]"), Expr::path("src.b[]")]),
        )]);
        let out = ev
            .execute("Main", &token!({"a": [1i64, 2i64], "b": [10i64, 20i64]}))
            .unwrap();
        assert_eq!(out, token!({"sums": [11i64, 22i64]}));

        let err = ev
            .execute("Main", &token!({"a": [1i64], "b": [10i64, 20i64]}))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(_)));
    }

    #[test]
    fn test_iterating_a_scalar_is_type_mismatch() {
        let ev = evaluator(vec![Statement::assign(
            TargetNode::field("xs[]"),
            Expr::path("src.x[]"),
        )]);
        let err = ev.execute("Main", &token!({"x": 5i64})).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn test_guards() {
        let ev = evaluator(vec![
            Statement::assign_if(
                TargetNode::field("a"),
                Expr::constant("yes"),
                Expr::path("src.flag"),
            ),
            Statement::If {
                condition: Expr::call("$Gt", vec![Expr::path("src.n"), Expr::constant(1.0)]),
                then: vec![Statement::assign(TargetNode::field("big"), Expr::constant(true))],
                otherwise: vec![Statement::assign(TargetNode::field("big"), Expr::constant(false))],
            },
        ]);
        let out = ev
            .execute("Main", &token!({"flag": {}, "n": 0i64}))
            .unwrap();
        assert_eq!(out, token!({"big": false}));

        let out = ev
            .execute("Main", &token!({"flag": [1i64], "n": 3i64}))
            .unwrap();
        assert_eq!(out, token!({"a": "yes", "big": true}));
    }

    #[test]
    fn test_projector_guard_must_be_boolean() {
        let ev = evaluator(vec![Statement::assign_if(
            TargetNode::field("a"),
            Expr::constant(1.0),
            Expr::call("$ListOf", vec![]),
        )]);
        let err = ev.execute("Main", &Token::Null).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn test_dsl_projector_and_root_targets() {
        let ev = evaluator_with(
            vec![
                Statement::assign(
                    TargetNode::field("person"),
                    Expr::call("Person", vec![Expr::path("src")]),
                ),
                Statement::assign(
                    TargetNode::Object("Log".into()),
                    Expr::path("src.name"),
                ),
            ],
            vec![projector(
                "Person",
                &["p"],
                vec![
                    Statement::assign(TargetNode::field("name"), Expr::path("p.name")),
                    Statement::assign(
                        TargetNode::RootField("seen[]".into()),
                        Expr::path("p.name"),
                    ),
                ],
            )],
            Options::default(),
        );
        let out = ev.execute("Main", &token!({"name": "Bo"})).unwrap();
        assert_eq!(
            out,
            token!({"seen": ["Bo"], "person": {"name": "Bo"}, "Log": ["Bo"]})
        );
    }

    #[test]
    fn test_dest_reads_run_after_direct_writes() {
        let ev = evaluator(vec![
            Statement::assign(
                TargetNode::field("ref"),
                Expr::call("$StrCat", vec![Expr::constant("Patient/"), Expr::dest("id")]),
            ),
            Statement::assign(
                TargetNode::field("id"),
                Expr::call("$Hash", vec![Expr::path("src")]),
            ),
        ]);
        let input = token!({"name": "x"});
        let out = ev.execute("Main", &input).unwrap();
        let id = out.get("id").and_then(Token::as_str).unwrap().to_string();
        assert_eq!(out.get("ref").unwrap(), &Token::from(format!("Patient/{}", id)));
    }

    #[test]
    fn test_locals_computed_from_dest_defer_their_readers() {
        let ev = evaluator(vec![
            Statement::assign(TargetNode::field("x"), Expr::path("src.a")),
            Statement::assign(
                TargetNode::var("h"),
                Expr::call("$StrCat", vec![Expr::constant("ref/"), Expr::dest("x")]),
            ),
            Statement::assign(TargetNode::var("g"), Expr::path("h")),
            Statement::assign_if(TargetNode::field("y"), Expr::path("g"), Expr::path("h")),
            Statement::assign(TargetNode::field("z"), Expr::path("src.a")),
        ]);
        let out = ev.execute("Main", &token!({"a": "x1"})).unwrap();
        assert_eq!(out, token!({"x": "x1", "z": "x1", "y": "ref/x1"}));

        let body = &ev.program().get("Main").unwrap().body;
        let (direct, deferred) = phases(body);
        assert_eq!(direct.len(), 2);
        assert_eq!(deferred.len(), 3);
    }

    #[test]
    fn test_scalar_rewrite_must_agree() {
        let ev = evaluator(vec![
            Statement::assign(TargetNode::field("id"), Expr::path("src.a")),
            Statement::assign(TargetNode::field("id"), Expr::path("src.b")),
        ]);
        let err = ev
            .execute("Main", &token!({"a": "x", "b": "y"}))
            .unwrap_err();
        assert!(matches!(err, EngineError::TargetConflict { target, .. } if target == "id"));

        let out = ev.execute("Main", &token!({"a": "x", "b": "x"})).unwrap();
        assert_eq!(out, token!({"id": "x"}));

        let out = ev.execute("Main", &token!({"a": "x"})).unwrap();
        assert_eq!(out, token!({"id": "x"}));
    }

    #[test]
    fn test_empty_array_guard_skips() {
        let ev = evaluator(vec![
            Statement::assign_if(
                TargetNode::field("flagged"),
                Expr::constant(true),
                Expr::path("src.flag"),
            ),
            Statement::assign(TargetNode::field("n"), Expr::path("src.n")),
        ]);
        let out = ev.execute("Main", &token!({"flag": [], "n": 1i64})).unwrap();
        assert_eq!(out, token!({"n": 1i64}));

        let out = ev.execute("Main", &token!({"flag": [0i64], "n": 1i64})).unwrap();
        assert_eq!(out, token!({"flagged": true, "n": 1i64}));
    }

    #[test]
    fn test_dsl_arity_and_variadic() {
        let mut collect = projector(
            "Collect",
            &["first", "rest"],
            vec![
                Statement::assign(TargetNode::field("first"), Expr::path("first")),
                Statement::assign(TargetNode::field("rest"), Expr::path("rest")),
            ],
        );
        collect.variadic = true;
        let ev = evaluator_with(vec![], vec![collect], Options::default());

        let out = ev
            .call("Collect", vec![token!(1i64), token!(2i64), token!(3i64)])
            .unwrap();
        assert_eq!(out, token!({"first": 1i64, "rest": [2i64, 3i64]}));

        let err = ev.call("Collect", vec![]).unwrap_err();
        assert!(matches!(err, EngineError::ArityMismatch { actual: 0, .. }));
    }

    #[test]
    fn test_call_depth_limit() {
        let options = Options {
            max_call_depth: 8,
            ..Options::default()
        };
        let ev = evaluator_with(
            vec![Statement::assign(
                TargetNode::field("x"),
                Expr::call("Loop", vec![Expr::path("src")]),
            )],
            vec![projector(
                "Loop",
                &["v"],
                vec![Statement::assign(
                    TargetNode::This,
                    Expr::call("Loop", vec![Expr::path("v")]),
                )],
            )],
            options,
        );
        let err = ev.execute("Main", &token!(1i64)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg.contains("call depth")));
    }

    #[test]
    fn test_unknown_names() {
        let ev = evaluator(vec![Statement::assign(
            TargetNode::field("x"),
            Expr::call("$Missing", vec![]),
        )]);
        assert_eq!(
            ev.execute("Main", &Token::Null).unwrap_err(),
            EngineError::UnknownProjector("$Missing".into())
        );
        assert_eq!(
            ev.execute("Nope", &Token::Null).unwrap_err(),
            EngineError::UnknownProjector("Nope".into())
        );
    }
}
