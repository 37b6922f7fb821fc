//! Extensible script-level macro system.
//!
//! A module is a named, arity-checked handler invoked from script text via
//! `CALL`/`SAFE_CALL`. Handlers are plain closures in a registry table; each
//! one reads the session tables plus its raw arguments/body and either
//! mutates the tables directly or returns a new script fragment that the
//! compiler splices back in and compiles recursively.

pub mod abort;
pub mod conditionals;
pub mod format_ops;
pub mod spectral;
pub mod structural;

use std::collections::HashMap;

use crate::error::{CompileError, SourcePos};
use crate::script::element::{Body, Req, Shape, check_shape};
use crate::tables::CompilerTables;

/// Everything a handler may see and touch during one invocation. Modules are
/// stateless across invocations; this context is their only ambient state.
pub struct ModuleContext<'s> {
    pub tables: &'s mut CompilerTables,
    pub args: &'s [String],
    pub body: Option<&'s Body>,
    pub at: &'s SourcePos,
    /// Name of the session's main pipeline; a module may designate one.
    pub main_pipeline: &'s mut Option<String>,
}

impl ModuleContext<'_> {
    pub fn arg(&self, index: usize) -> &str {
        &self.args[index]
    }

    pub fn arg_u32(&self, index: usize, what: &'static str) -> Result<u32, CompileError> {
        self.args[index]
            .parse::<u32>()
            .map_err(|_| CompileError::InvalidValue {
                what,
                value: self.args[index].clone(),
                at: self.at.clone(),
            })
    }

    pub fn arg_f64(&self, index: usize, what: &'static str) -> Result<f64, CompileError> {
        match self.args[index].parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
            _ => Err(CompileError::InvalidValue {
                what,
                value: self.args[index].clone(),
                at: self.at.clone(),
            }),
        }
    }
}

/// What a handler produced: either direct table mutation (done) or generated
/// script text to compile in place of the invocation.
pub enum ModuleOutcome {
    Done,
    Fragment(String),
}

type ModuleFn = Box<dyn Fn(&mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> + Send + Sync>;

/// A registered module: identity, argument-count range, body-presence
/// requirement and behavior.
pub struct Module {
    name: String,
    shape: Shape,
    handler: ModuleFn,
}

impl Module {
    /// Shape of a `CALL:name(args){body}` element invoking this module.
    pub(crate) fn shape(&self) -> &Shape {
        &self.shape
    }
}

/// Name → module table. No trait objects per module kind; a closure table is
/// all the dispatch this needs.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Module>,
}

impl ModuleRegistry {
    /// An empty registry, for hosts that want full control over the module
    /// vocabulary.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        conditionals::register(&mut registry);
        format_ops::register(&mut registry);
        structural::register(&mut registry);
        spectral::register(&mut registry);
        abort::register(&mut registry);
        registry
    }

    /// Register a module. Re-registering a taken name is an error; hosts that
    /// want to shadow a built-in must pick another name.
    pub fn register<F>(
        &mut self,
        name: &str,
        min_args: usize,
        max_args: usize,
        body: Req,
        handler: F,
    ) -> Result<(), CompileError>
    where
        F: Fn(&mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> + Send + Sync + 'static,
    {
        if self.modules.contains_key(name) {
            return Err(CompileError::DuplicateSymbol {
                kind: "module",
                name: name.to_string(),
                at: SourcePos::new("<host>", 0),
            });
        }
        self.modules.insert(
            name.to_string(),
            Module {
                name: name.to_string(),
                // Module name arrives as the element name of the CALL.
                shape: Shape::new(Req::Mandatory, body, min_args, max_args),
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    /// Built-in registration path. Names are compile-time literals, so the
    /// duplicate check is a debug assertion rather than an error path.
    pub(crate) fn define<F>(&mut self, name: &str, min_args: usize, max_args: usize, body: Req, handler: F)
    where
        F: Fn(&mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> + Send + Sync + 'static,
    {
        let previous = self.modules.insert(
            name.to_string(),
            Module {
                name: name.to_string(),
                shape: Shape::new(Req::Mandatory, body, min_args, max_args),
                handler: Box::new(handler),
            },
        );
        debug_assert!(previous.is_none(), "builtin {name} defined twice");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Validate the invocation element against the module's declared shape,
    /// then run the handler.
    pub(crate) fn apply(
        &self,
        module: &Module,
        invocation: &crate::script::element::Element,
        ctx: &mut ModuleContext<'_>,
    ) -> Result<ModuleOutcome, CompileError> {
        check_shape(invocation, &format!("module {}", module.name), module.shape())?;
        (module.handler)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_all_categories() {
        let registry = ModuleRegistry::with_builtins();
        for name in [
            "IF_DEFINED",
            "IF_EQUAL",
            "IF_GREATER",
            "FORMAT_RESIZE",
            "FORMAT_SCALE",
            "FORMAT_SELECT",
            "GEOMETRY_FROM_FORMAT",
            "CHAIN",
            "CHAIN_STRICT",
            "SHADER_PIPELINE",
            "FFT",
            "ABORT",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ModuleRegistry::empty();
        registry
            .register("M", 0, 0, Req::Forbidden, |_| Ok(ModuleOutcome::Done))
            .unwrap();
        assert!(
            registry
                .register("M", 0, 0, Req::Forbidden, |_| Ok(ModuleOutcome::Done))
                .is_err()
        );
    }
}
