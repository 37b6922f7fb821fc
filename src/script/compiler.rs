//! Script compilation sessions.
//!
//! One session processes one script in a single left-to-right pass: each
//! top-level element is classified by keyword and dispatched to a declaration
//! builder or module invocation. Includes run in sub-sessions whose local
//! tables merge back into the parent; module-generated fragments compile
//! recursively in the same session, depth-bounded.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{CompileError, SourcePos};
use crate::layout::{ComponentLayout, PipelineLayout};
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::declarations;
use crate::script::element::{Element, Req, Shape, check_shape};
use crate::script::lexer;
use crate::tables::CompilerTables;

/// Upper bound on nested recursive compiles (includes and module-generated
/// fragments). A module emitting text that re-invokes itself terminates with
/// a typed error instead of exhausting the stack.
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// Front door for script compilation. Hosts inject required elements and
/// extra modules, then compile any number of scripts; each compile runs in a
/// fresh session seeded with the injected required tier.
pub struct ScriptCompiler {
    registry: ModuleRegistry,
    tables: CompilerTables,
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptCompiler {
    pub fn new() -> Self {
        Self {
            registry: ModuleRegistry::with_builtins(),
            tables: CompilerTables::new(),
        }
    }

    pub fn with_registry(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            tables: CompilerTables::new(),
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Host-injection surface; see [`CompilerTables`] for the per-kind calls.
    pub fn required(&mut self) -> &mut CompilerTables {
        &mut self.tables
    }

    /// Compile script text. A main pipeline is optional.
    pub fn compile_text(&self, text: &str, source_name: &str) -> Result<Compilation, CompileError> {
        self.compile_inner(text, source_name, None, false)
    }

    /// Compile script text that must declare a main pipeline.
    pub fn compile_main_text(
        &self,
        text: &str,
        source_name: &str,
    ) -> Result<Compilation, CompileError> {
        self.compile_inner(text, source_name, None, true)
    }

    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Compilation, CompileError> {
        self.compile_file_inner(path.as_ref(), false)
    }

    pub fn compile_main_file(&self, path: impl AsRef<Path>) -> Result<Compilation, CompileError> {
        self.compile_file_inner(path.as_ref(), true)
    }

    fn compile_file_inner(&self, path: &Path, require_main: bool) -> Result<Compilation, CompileError> {
        let text = std::fs::read_to_string(path).map_err(|source| CompileError::Include {
            path: path.display().to_string(),
            source,
        })?;
        self.compile_inner(
            &text,
            &path.display().to_string(),
            path.parent().map(Path::to_path_buf),
            require_main,
        )
    }

    fn compile_inner(
        &self,
        text: &str,
        source_name: &str,
        base: Option<PathBuf>,
        require_main: bool,
    ) -> Result<Compilation, CompileError> {
        let mut session = Session {
            registry: &self.registry,
            tables: self.tables.clone(),
            search_paths: base.into_iter().collect(),
            main: None,
            depth: 0,
        };
        session.compile_source(text, source_name, 1)?;
        if require_main && session.main.is_none() {
            return Err(CompileError::MissingMainPipeline {
                source_name: source_name.to_string(),
            });
        }
        Ok(Compilation {
            tables: session.tables,
            main: session.main,
        })
    }
}

/// Result of one successful session: the populated tables and the name of the
/// main pipeline, if one was designated. Extracting a layout clones it;
/// the compilation is discardable afterwards.
#[derive(Debug)]
pub struct Compilation {
    pub tables: CompilerTables,
    pub main: Option<String>,
}

impl Compilation {
    pub fn layout(&self, name: &str) -> Option<ComponentLayout> {
        self.tables.layouts.lookup(name).cloned()
    }

    pub fn pipeline(&self, name: &str) -> Option<PipelineLayout> {
        match self.tables.layouts.lookup(name) {
            Some(ComponentLayout::Pipeline(p)) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn main_pipeline(&self) -> Option<PipelineLayout> {
        self.pipeline(self.main.as_deref()?)
    }
}

pub(crate) struct Session<'r> {
    pub(crate) registry: &'r ModuleRegistry,
    pub(crate) tables: CompilerTables,
    pub(crate) search_paths: Vec<PathBuf>,
    pub(crate) main: Option<String>,
    pub(crate) depth: usize,
}

const PATH_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, 1);
const INCLUDE_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, 1);

impl Session<'_> {
    pub(crate) fn compile_source(
        &mut self,
        text: &str,
        source_name: &str,
        start_line: usize,
    ) -> Result<(), CompileError> {
        let elements = lexer::lex(text, source_name, start_line)?;
        for element in elements {
            self.dispatch(&element)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, element: &Element) -> Result<(), CompileError> {
        debug!(
            "element {}{} at {}",
            element.keyword,
            element
                .name
                .as_deref()
                .map(|n| format!(":{n}"))
                .unwrap_or_default(),
            element.at
        );
        match element.keyword.as_str() {
            "PATH" => {
                check_shape(element, "PATH", &PATH_SHAPE)?;
                self.search_paths.push(PathBuf::from(element.arg(0)));
                Ok(())
            }
            "INCLUDE" => {
                check_shape(element, "INCLUDE", &INCLUDE_SHAPE)?;
                self.include(element)
            }
            "FORMAT" => declarations::declare_format(self, element),
            "SHADER" => declarations::declare_shader(self, element),
            "GEOMETRY" => declarations::declare_geometry(self, element),
            "FILTER" => declarations::declare_filter(self, element),
            "PIPELINE" => declarations::declare_pipeline(self, element, false),
            "MAIN_PIPELINE" => declarations::declare_pipeline(self, element, true),
            "REQUIRED_FORMAT" => declarations::required_format(self, element),
            "REQUIRED_SHADER" => declarations::required_shader(self, element),
            "REQUIRED_GEOMETRY" => declarations::required_geometry(self, element),
            "REQUIRED_PIPELINE" => declarations::required_pipeline(self, element),
            "CALL" => self.invoke(element, false),
            "SAFE_CALL" => self.invoke(element, true),
            other => Err(CompileError::UnknownKeyword {
                keyword: other.to_string(),
                at: element.at.clone(),
            }),
        }
    }

    fn resolve_include(&self, path: &str, at: &SourcePos) -> Result<PathBuf, CompileError> {
        let direct = PathBuf::from(path);
        if direct.is_absolute() {
            return Ok(direct);
        }
        for base in &self.search_paths {
            let candidate = base.join(path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if direct.is_file() {
            return Ok(direct);
        }
        Err(CompileError::Include {
            path: format!("{path} (at {at})"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in any search path"),
        })
    }

    fn include(&mut self, element: &Element) -> Result<(), CompileError> {
        let raw_path = element.arg(0);
        if self.depth >= MAX_EXPANSION_DEPTH {
            return Err(CompileError::ExpansionDepth {
                module: format!("INCLUDE {raw_path}"),
                depth: MAX_EXPANSION_DEPTH,
                at: element.at.clone(),
            });
        }
        let path = self.resolve_include(raw_path, &element.at)?;
        let text = std::fs::read_to_string(&path).map_err(|source| CompileError::Include {
            path: path.display().to_string(),
            source,
        })?;

        let mut search_paths = self.search_paths.clone();
        if let Some(parent) = path.parent() {
            search_paths.push(parent.to_path_buf());
        }
        let mut sub = Session {
            registry: self.registry,
            tables: self.tables.sub_session(),
            search_paths,
            main: None,
            depth: self.depth + 1,
        };
        let source_name = path.display().to_string();
        sub.compile_source(&text, &source_name, 1)
            .map_err(|e| e.with_context(format!("while including {source_name} ({})", element.at)))?;

        self.tables.merge_locals(sub.tables, &element.at)?;
        if let Some(main) = sub.main {
            if self.main.is_some() {
                return Err(CompileError::DuplicateSymbol {
                    kind: "main pipeline",
                    name: main,
                    at: element.at.clone(),
                });
            }
            self.main = Some(main);
        }
        Ok(())
    }

    fn invoke(&mut self, element: &Element, safe: bool) -> Result<(), CompileError> {
        let Some(name) = element.name.clone() else {
            return Err(CompileError::Shape {
                message: format!("{} must have a name", element.keyword),
                at: element.at.clone(),
            });
        };
        let Some(module) = self.registry.get(&name) else {
            if safe {
                // The one documented silent path: scripts stay portable
                // across hosts with different module sets.
                warn!("SAFE_CALL:{name} skipped, module not registered ({})", element.at);
                return Ok(());
            }
            return Err(CompileError::UnknownModule {
                module: name,
                at: element.at.clone(),
            });
        };

        let outcome = {
            let mut ctx = ModuleContext {
                tables: &mut self.tables,
                args: &element.args,
                body: element.body.as_ref(),
                at: &element.at,
                main_pipeline: &mut self.main,
            };
            self.registry.apply(module, element, &mut ctx)?
        };

        match outcome {
            ModuleOutcome::Done => Ok(()),
            ModuleOutcome::Fragment(fragment) => {
                if self.depth >= MAX_EXPANSION_DEPTH {
                    return Err(CompileError::ExpansionDepth {
                        module: name,
                        depth: MAX_EXPANSION_DEPTH,
                        at: element.at.clone(),
                    });
                }
                debug!("module {name} expanded to {} bytes", fragment.len());
                self.depth += 1;
                let result = self
                    .compile_source(&fragment, &format!("<{name}>"), 1)
                    .map_err(|e| {
                        e.with_context(format!("while expanding module {name} ({})", element.at))
                    });
                self.depth -= 1;
                result
            }
        }
    }
}
