// Transpiler: lowers a parsed compilation unit into IR
//
// Validation that can be done statically happens here: variable
// declarations, root-target misuse, append-marker consistency, iteration in
// conditions and path syntax. Nothing is registered unless the whole unit
// lowers cleanly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::ast::{Expr, ProjectorDecl, Statement, TargetNode, Unit};
use crate::ir::{FieldMapping, Guard, MappingDef, Program, Source, Target};
use crate::path::{PathError, PathSpec};
use crate::registry::{Projector, Registry};

/// Compile-time errors. Any of these aborts compiling the unit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("{mapping}: undeclared variable {name}")]
    UndeclaredVariable { mapping: String, name: String },

    #[error("{mapping}: using the root keyword in a root mapping is redundant")]
    RedundantRoot { mapping: String },

    #[error("malformed path {path:?}: {source}")]
    MalformedPath { path: String, source: PathError },

    #[error("{mapping}: target {target} is used both with and without the append marker")]
    TargetRedeclared { mapping: String, target: String },

    #[error("{mapping}: conditions cannot iterate over arrays")]
    IterationInCondition { mapping: String },

    #[error("{mapping}: duplicate parameter {name}")]
    DuplicateParameter { mapping: String, name: String },

    #[error("{0} is already defined")]
    DuplicateName(String),

    #[error("{0}: a variadic mapping needs at least one parameter")]
    VariadicWithoutParameter(String),
}

const ROOT_INPUT: &str = "$root";
const THIS: &str = "$this";

fn parse_path(text: &str) -> Result<PathSpec, CompileError> {
    PathSpec::parse(text).map_err(|source| CompileError::MalformedPath {
        path: text.to_string(),
        source,
    })
}

/// Declarations visible while lowering one mapping body.
struct Scope {
    mapping: String,
    top_level: bool,
    declared: HashSet<String>,
    /// Target path (without append marker) -> whether it appends.
    targets: HashMap<String, bool>,
}

impl Scope {
    fn new(mapping: &str, params: &[String], top_level: bool) -> Result<Self, CompileError> {
        let mut declared = HashSet::new();
        for p in params {
            if !declared.insert(p.clone()) {
                return Err(CompileError::DuplicateParameter {
                    mapping: mapping.to_string(),
                    name: p.clone(),
                });
            }
        }
        Ok(Scope {
            mapping: mapping.to_string(),
            top_level,
            declared,
            targets: HashMap::new(),
        })
    }

    fn declare_target(&mut self, kind: &str, path: &PathSpec) -> Result<(), CompileError> {
        let key = format!("{} {}", kind, path.target_key());
        let append = path.iterates();
        match self.targets.get(&key) {
            Some(&seen) if seen != append => Err(CompileError::TargetRedeclared {
                mapping: self.mapping.clone(),
                target: path.target_key(),
            }),
            Some(_) => Ok(()),
            None => {
                self.targets.insert(key, append);
                Ok(())
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn lower_expr(&self, expr: &Expr) -> Result<Source, CompileError> {
        match expr {
            Expr::Const(token) => Ok(Source::Constant(token.clone())),
            Expr::Path(text) => {
                let mut path = parse_path(text)?;
                match path.root.as_str() {
                    ROOT_INPUT => {
                        path.root.clear();
                        Ok(Source::Field(path))
                    }
                    THIS => {
                        path.root.clear();
                        Ok(Source::Field(path.with_dest(true)))
                    }
                    "" => Ok(Source::Field(path.with_dest(true))),
                    name if self.declared.contains(name) => Ok(Source::LocalVar(path)),
                    name => Err(CompileError::UndeclaredVariable {
                        mapping: self.mapping.clone(),
                        name: name.to_string(),
                    }),
                }
            }
            Expr::Dest(text) => Ok(Source::Field(parse_path(text)?.with_dest(true))),
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Source::Call {
                    projector: name.clone(),
                    args,
                })
            }
        }
    }

    fn lower_condition(&self, expr: &Expr) -> Result<Source, CompileError> {
        let source = self.lower_expr(expr)?;
        if source.iterates() {
            return Err(CompileError::IterationInCondition {
                mapping: self.mapping.clone(),
            });
        }
        Ok(source)
    }

    // ── Targets ─────────────────────────────────────────────────────────

    fn lower_target(&mut self, target: &TargetNode) -> Result<Target, CompileError> {
        match target {
            TargetNode::Var(text) => {
                let path = parse_path(text)?;
                if path.root.is_empty() {
                    return Err(CompileError::MalformedPath {
                        path: text.clone(),
                        source: PathError::EmptySegment,
                    });
                }
                self.declare_target("var", &path)?;
                self.declared.insert(path.root.clone());
                Ok(Target::LocalVar(path))
            }
            TargetNode::RootField(text) => {
                if self.top_level {
                    return Err(CompileError::RedundantRoot {
                        mapping: self.mapping.clone(),
                    });
                }
                let path = parse_path(text)?;
                self.declare_target("root", &path)?;
                Ok(Target::RootField(path))
            }
            TargetNode::Object(name) => Ok(Target::Object(name.clone())),
            TargetNode::This => Ok(Target::Field(PathSpec::whole())),
            TargetNode::Field(text) => {
                let path = parse_path(text)?;
                self.declare_target("field", &path)?;
                Ok(Target::Field(path))
            }
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn lower_statements(
        &mut self,
        statements: &[Statement],
        guards: &[Guard],
        out: &mut Vec<FieldMapping>,
    ) -> Result<(), CompileError> {
        for statement in statements {
            match statement {
                Statement::Assign {
                    target,
                    value,
                    condition,
                } => {
                    let mut condition_guards = guards.to_vec();
                    if let Some(cond) = condition {
                        condition_guards.push(Guard {
                            source: self.lower_condition(cond)?,
                            negated: false,
                        });
                    }
                    // The source is lowered before the target declares its
                    // variable, so `var x: $Inc(x)` needs an earlier `x`.
                    let source = self.lower_expr(value)?;
                    let target = self.lower_target(target)?;
                    out.push(FieldMapping {
                        source,
                        target,
                        condition: condition_guards,
                    });
                }
                Statement::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let source = self.lower_condition(condition)?;
                    let mut branch = guards.to_vec();
                    branch.push(Guard {
                        source: source.clone(),
                        negated: false,
                    });
                    self.lower_statements(then, &branch, out)?;

                    if !otherwise.is_empty() {
                        let mut branch = guards.to_vec();
                        branch.push(Guard {
                            source,
                            negated: true,
                        });
                        self.lower_statements(otherwise, &branch, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn lower_mapping(
    name: &str,
    params: &[String],
    variadic: bool,
    body: &[Statement],
    top_level: bool,
) -> Result<MappingDef, CompileError> {
    if variadic && params.is_empty() {
        return Err(CompileError::VariadicWithoutParameter(name.to_string()));
    }
    let mut scope = Scope::new(name, params, top_level)?;
    let mut lowered = Vec::with_capacity(body.len());
    scope.lower_statements(body, &[], &mut lowered)?;
    Ok(MappingDef {
        name: name.to_string(),
        params: params.to_vec(),
        variadic,
        body: lowered,
        top_level,
    })
}

/// Lower one projector declaration.
pub fn lower_projector(decl: &ProjectorDecl) -> Result<MappingDef, CompileError> {
    lower_mapping(&decl.name, &decl.params, decl.variadic, &decl.body, false)
}

/// Lower a unit's top-level mapping.
pub fn lower_unit(unit: &Unit) -> Result<MappingDef, CompileError> {
    lower_mapping(&unit.name, &unit.params, false, &unit.body, true)
}

/// Compile `unit`: its projectors go into `registry`, its top-level mapping
/// into `program`. Either everything is added or nothing is.
pub fn compile(
    unit: &Unit,
    registry: &mut Registry,
    program: &mut Program,
) -> Result<(), CompileError> {
    let mut projectors = Vec::with_capacity(unit.projectors.len());
    let mut seen = HashSet::new();
    for decl in &unit.projectors {
        if registry.contains(&decl.name) || !seen.insert(decl.name.as_str()) {
            return Err(CompileError::DuplicateName(decl.name.clone()));
        }
        projectors.push(lower_projector(decl)?);
    }
    if program.contains(&unit.name) {
        return Err(CompileError::DuplicateName(unit.name.clone()));
    }
    let main = lower_unit(unit)?;

    debug!(
        "compiled {} ({} statements, {} projectors)",
        unit.name,
        main.body.len(),
        projectors.len()
    );

    for def in projectors {
        let name = def.name.clone();
        registry
            .register_projector(name.clone(), Projector::Mapping(Arc::new(def)))
            .map_err(|_| CompileError::DuplicateName(name))?;
    }
    program
        .insert(main)
        .map_err(|_| CompileError::DuplicateName(unit.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::IndexSpec;

    fn unit(body: Vec<Statement>) -> Unit {
        Unit {
            name: "Main".into(),
            params: vec!["src".into()],
            body,
            projectors: vec![],
        }
    }

    #[test]
    fn test_lower_sources() {
        let def = lower_unit(&unit(vec![
            Statement::assign(TargetNode::field("a"), Expr::path("src.x")),
            Statement::assign(TargetNode::field("b"), Expr::path("$root.y[]")),
            Statement::assign(TargetNode::field("c"), Expr::dest("a")),
        ]))
        .unwrap();

        assert!(matches!(&def.body[0].source, Source::LocalVar(p) if p.root == "src"));
        match &def.body[1].source {
            Source::Field(p) => {
                assert_eq!(p.root, "");
                assert_eq!(p.index, IndexSpec::Wildcard);
                assert!(!p.dest);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert!(def.body[2].uses_dest());
    }

    #[test]
    fn test_undeclared_variable() {
        let err = lower_unit(&unit(vec![Statement::assign(
            TargetNode::field("a"),
            Expr::path("nope.x"),
        )]))
        .unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredVariable { name, .. } if name == "nope"));
    }

    #[test]
    fn test_var_declared_after_its_source() {
        let err = lower_unit(&unit(vec![Statement::assign(
            TargetNode::var("x"),
            Expr::path("x"),
        )]))
        .unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredVariable { .. }));

        assert!(lower_unit(&unit(vec![
            Statement::assign(TargetNode::var("x"), Expr::constant(1.0)),
            Statement::assign(TargetNode::field("y"), Expr::path("x")),
        ]))
        .is_ok());
    }

    #[test]
    fn test_redundant_root() {
        let err = lower_unit(&unit(vec![Statement::assign(
            TargetNode::RootField("a".into()),
            Expr::constant(1.0),
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::RedundantRoot {
                mapping: "Main".into()
            }
        );

        let decl = ProjectorDecl {
            name: "P".into(),
            params: vec![],
            variadic: false,
            body: vec![Statement::assign(
                TargetNode::RootField("a".into()),
                Expr::constant(1.0),
            )],
        };
        assert!(lower_projector(&decl).is_ok());
    }

    #[test]
    fn test_target_redeclared() {
        let err = lower_unit(&unit(vec![
            Statement::assign(TargetNode::field("xs[]"), Expr::constant(1.0)),
            Statement::assign(TargetNode::field("xs"), Expr::constant(2.0)),
        ]))
        .unwrap_err();
        assert!(matches!(err, CompileError::TargetRedeclared { target, .. } if target == "xs"));
    }

    #[test]
    fn test_malformed_path() {
        let err = lower_unit(&unit(vec![Statement::assign(
            TargetNode::field("a..b"),
            Expr::constant(1.0),
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::MalformedPath {
                source: PathError::EmptySegment,
                ..
            }
        ));
    }

    #[test]
    fn test_if_flattening() {
        let def = lower_unit(&unit(vec![Statement::If {
            condition: Expr::path("src.flag"),
            then: vec![Statement::assign_if(
                TargetNode::field("a"),
                Expr::constant(1.0),
                Expr::path("src.other"),
            )],
            otherwise: vec![Statement::assign(TargetNode::field("b"), Expr::constant(2.0))],
        }]))
        .unwrap();

        assert_eq!(def.body.len(), 2);
        let then_guards = &def.body[0].condition;
        assert_eq!(then_guards.len(), 2);
        assert!(!then_guards[0].negated);
        assert!(matches!(&then_guards[0].source, Source::LocalVar(p) if p.field.len() == 1));
        let else_guards = &def.body[1].condition;
        assert_eq!(else_guards.len(), 1);
        assert!(else_guards[0].negated);
    }

    #[test]
    fn test_iteration_in_condition() {
        let err = lower_unit(&unit(vec![Statement::assign_if(
            TargetNode::field("a"),
            Expr::constant(1.0),
            Expr::call("$IsNil", vec![Expr::path("src.items[]")]),
        )]))
        .unwrap_err();
        assert!(matches!(err, CompileError::IterationInCondition { .. }));
    }

    #[test]
    fn test_compile_is_all_or_nothing() {
        let mut registry = Registry::new();
        let mut program = Program::new();
        let mut u = unit(vec![Statement::assign(
            TargetNode::field("a"),
            Expr::path("nope"),
        )]);
        u.projectors.push(ProjectorDecl {
            name: "Helper".into(),
            params: vec!["x".into()],
            variadic: false,
            body: vec![],
        });

        assert!(compile(&u, &mut registry, &mut program).is_err());
        assert!(registry.is_empty());
        assert!(program.is_empty());

        u.body.clear();
        compile(&u, &mut registry, &mut program).unwrap();
        assert!(registry.contains("Helper"));
        assert!(program.contains("Main"));

        u.name = "Other".into();
        assert_eq!(
            compile(&u, &mut registry, &mut program).unwrap_err(),
            CompileError::DuplicateName("Helper".into())
        );
    }

    #[test]
    fn test_duplicate_parameter_and_variadic() {
        let decl = ProjectorDecl {
            name: "P".into(),
            params: vec!["a".into(), "a".into()],
            variadic: false,
            body: vec![],
        };
        assert!(matches!(
            lower_projector(&decl),
            Err(CompileError::DuplicateParameter { .. })
        ));

        let decl = ProjectorDecl {
            name: "V".into(),
            params: vec![],
            variadic: true,
            body: vec![],
        };
        assert_eq!(
            lower_projector(&decl).unwrap_err(),
            CompileError::VariadicWithoutParameter("V".into())
        );
    }
}
