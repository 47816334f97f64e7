// Parse tree handed over by the mapping-language parser
//
// The parser itself lives outside this crate. Trees arrive either built in
// code or as JSON, e.g.
//
//   {"name": "Main", "params": ["src"],
//    "body": [{"assign": {"target": {"field": "id"},
//                         "value": {"path": "src.id"}}}]}

use serde::{Deserialize, Serialize};

use crate::value::Token;

/// One compilation unit: a named top-level mapping plus its projectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<Statement>,
    #[serde(default)]
    pub projectors: Vec<ProjectorDecl>,
}

impl Unit {
    pub fn from_json_str(s: &str) -> Result<Unit, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// A user-defined projector (`def Name(a, b...) { ... }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectorDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// The last parameter is variadic.
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// `target: value` with an optional `if` guard.
    Assign {
        target: TargetNode,
        value: Expr,
        #[serde(default)]
        condition: Option<Expr>,
    },

    /// `if cond { ... } else { ... }`
    If {
        condition: Expr,
        #[serde(default)]
        then: Vec<Statement>,
        #[serde(default)]
        otherwise: Vec<Statement>,
    },
}

impl Statement {
    pub fn assign(target: TargetNode, value: Expr) -> Self {
        Statement::Assign {
            target,
            value,
            condition: None,
        }
    }

    pub fn assign_if(target: TargetNode, value: Expr, condition: Expr) -> Self {
        Statement::Assign {
            target,
            value,
            condition: Some(condition),
        }
    }
}

/// Assignment targets. Paths use the textual path grammar (`a.b[0]`, `xs[]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetNode {
    /// `var x.y: ...`
    Var(String),
    /// `root x.y: ...`
    RootField(String),
    /// `out Name: ...`
    Object(String),
    /// `$this: ...`
    This,
    /// `x.y: ...`
    Field(String),
}

impl TargetNode {
    pub fn var(path: &str) -> Self {
        TargetNode::Var(path.to_string())
    }

    pub fn field(path: &str) -> Self {
        TargetNode::Field(path.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(Token),
    /// A variable, parameter or `$root` path.
    Path(String),
    /// `dest x.y`: read back the output under construction.
    Dest(String),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn constant(value: impl Into<Token>) -> Self {
        Expr::Const(value.into())
    }

    pub fn path(path: &str) -> Self {
        Expr::Path(path.to_string())
    }

    pub fn dest(path: &str) -> Self {
        Expr::Dest(path.to_string())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }
}
