// Projector registry: name -> callable, built once and read-only afterwards

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::EngineError;
use crate::ir::MappingDef;
use crate::options::Options;
use crate::signature::Signature;
use crate::value::Token;

type NativeFn = dyn Fn(&[Token]) -> Result<Token, EngineError> + Send + Sync;

/// A native function wrapped into the uniform `(&[Token]) -> Result<Token>`
/// shape, with its signature checked before every call.
///
/// Usually built with [`native!`](crate::native), which derives the
/// signature and the per-argument coercions from the parameter list.
pub struct NativeProjector {
    name: String,
    signature: Signature,
    func: Box<NativeFn>,
}

impl NativeProjector {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(&[Token]) -> Result<Token, EngineError> + Send + Sync + 'static,
    {
        NativeProjector {
            name: name.into(),
            signature,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Check arity, coerce and invoke. Coercion failures name the projector.
    pub fn call(&self, args: &[Token]) -> Result<Token, EngineError> {
        self.signature.check_arity(&self.name, args.len())?;
        (self.func)(args).map_err(|e| match e {
            EngineError::TypeMismatch(msg) => {
                EngineError::TypeMismatch(format!("{}: {}", self.name, msg))
            }
            other => other,
        })
    }
}

impl fmt::Debug for NativeProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProjector")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Wrap a native function into a [`NativeProjector`].
///
/// ```ignore
/// native!("$Div", (l: f64, r: f64) => arithmetic::div(l, r));
/// native!("$StrJoin", (sep: String; args: Token) => strings::join(&sep, &args));
/// ```
///
/// Parameters after `;` form the trailing variadic parameter and arrive as a
/// `Vec`. The body must evaluate to `Result<R, EngineError>` with
/// `R: IntoToken`.
#[macro_export]
macro_rules! native {
    ($name:expr, ($($arg:ident : $ty:ty),* $(; $rest:ident : $rty:ty)?) => $body:expr) => {{
        let variadic = None $( .or(Some(<$rty as $crate::signature::FromToken>::KIND)) )?;
        $crate::registry::NativeProjector::new(
            $name,
            $crate::signature::Signature::new(
                vec![$(<$ty as $crate::signature::FromToken>::KIND),*],
                variadic,
            ),
            move |args: &[$crate::value::Token]| {
                #[allow(unused_mut, unused_variables)]
                let mut supplied = args.iter().enumerate();
                $(
                    let $arg = match supplied.next() {
                        Some((i, t)) => <$ty as $crate::signature::FromToken>::from_token(t, i)?,
                        None => return Err($crate::error::EngineError::InvalidOperation(
                            "missing argument".to_string(),
                        )),
                    };
                )*
                $(
                    let $rest = supplied
                        .map(|(i, t)| <$rty as $crate::signature::FromToken>::from_token(t, i))
                        .collect::<Result<Vec<$rty>, $crate::error::EngineError>>()?;
                )?
                let result = $body;
                result.map($crate::signature::IntoToken::into_token)
            },
        )
    }};
}

/// A callable the evaluator can dispatch to.
#[derive(Clone, Debug)]
pub enum Projector {
    Native(Arc<NativeProjector>),
    /// A mapping defined in the DSL; invoked by the evaluator.
    Mapping(Arc<MappingDef>),
}

impl Projector {
    pub fn from_native(native: NativeProjector) -> Self {
        Projector::Native(Arc::new(native))
    }
}

/// Name -> projector table.
///
/// Built once (built-ins, then user mappings from the transpiler) and then
/// shared immutably, typically behind an `Arc`, by every evaluation.
#[derive(Debug, Default)]
pub struct Registry {
    projectors: HashMap<String, Projector>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry holding the whole built-in catalog.
    pub fn with_builtins() -> Result<Self, EngineError> {
        Registry::with_options(&Options::default())
    }

    /// Like [`Registry::with_builtins`], with time built-ins configured
    /// from `options`.
    pub fn with_options(options: &Options) -> Result<Self, EngineError> {
        let mut registry = Registry::new();
        crate::functions::register_all(&mut registry)?;
        crate::datetime::register_all(&mut registry, &options.default_time_layout)?;
        debug!("registered {} built-in projectors", registry.len());
        Ok(registry)
    }

    /// Bind `name`; an existing binding is never replaced.
    pub fn register_projector(
        &mut self,
        name: impl Into<String>,
        projector: Projector,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if self.projectors.contains_key(&name) {
            return Err(EngineError::DuplicateName(name));
        }
        self.projectors.insert(name, projector);
        Ok(())
    }

    /// Register a native projector under its own name.
    pub fn register_native(&mut self, native: NativeProjector) -> Result<(), EngineError> {
        let name = native.name().to_string();
        self.register_projector(name, Projector::from_native(native))
    }

    pub fn get(&self, name: &str) -> Option<&Projector> {
        self.projectors.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&Projector, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownProjector(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.projectors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.projectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectors.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.projectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
