//! Named resource tables populated during one compiler session.
//!
//! Each table has two tiers: *local* symbols declared by the script being
//! compiled, and *required* symbols injected by the host before compilation
//! starts. Lookups consult the required tier first, so a host-supplied value
//! wins over a same-named local declaration. Registering a local symbol under
//! an already-taken name (either tier) is a hard error; required names are
//! immutable for the session unless the host passes `replace = true`.

use std::collections::HashMap;

use crate::error::{CompileError, SourcePos};
use crate::format::TextureFormat;
use crate::geometry::GeometryModel;
use crate::layout::shader::ShaderSource;
use crate::layout::{ComponentLayout, PipelineLayout};

/// Position reported for host-side (non-script) registrations.
fn host_pos() -> SourcePos {
    SourcePos::new("<host>", 0)
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable<T> {
    kind: &'static str,
    local: HashMap<String, T>,
    required: HashMap<String, T>,
}

impl<T: Clone> SymbolTable<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            local: HashMap::new(),
            required: HashMap::new(),
        }
    }

    /// Register a script-declared symbol. All-or-nothing: on error the table
    /// is untouched.
    pub fn insert_local(&mut self, name: &str, value: T, at: &SourcePos) -> Result<(), CompileError> {
        if self.required.contains_key(name) || self.local.contains_key(name) {
            return Err(CompileError::DuplicateSymbol {
                kind: self.kind,
                name: name.to_string(),
                at: at.clone(),
            });
        }
        self.local.insert(name.to_string(), value);
        Ok(())
    }

    /// Register a host-injected symbol. Fails if the name is already bound,
    /// unless `replace` is set.
    pub fn insert_required(&mut self, name: &str, value: T, replace: bool) -> Result<(), CompileError> {
        if !replace && self.required.contains_key(name) {
            return Err(CompileError::DuplicateSymbol {
                kind: self.kind,
                name: name.to_string(),
                at: host_pos(),
            });
        }
        self.required.insert(name.to_string(), value);
        Ok(())
    }

    /// Required tier first, then locals.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.required.get(name).or_else(|| self.local.get(name))
    }

    pub fn lookup_required(&self, name: &str) -> Option<&T> {
        self.required.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.required.contains_key(name) || self.local.contains_key(name)
    }

    pub fn clear_required(&mut self) {
        self.required.clear();
    }

    /// Resolve or fail loudly; `at` names the referencing element.
    pub fn resolve(&self, name: &str, at: &SourcePos) -> Result<&T, CompileError> {
        self.lookup(name).ok_or_else(|| CompileError::UnresolvedSymbol {
            kind: self.kind,
            name: name.to_string(),
            at: at.clone(),
        })
    }

    /// Merge the locals of an included sub-session into this table.
    /// A name collision (against either tier) aborts with a duplicate-symbol
    /// error positioned at the include element.
    pub fn merge_locals(&mut self, other: SymbolTable<T>, at: &SourcePos) -> Result<(), CompileError> {
        for (name, value) in other.local {
            if self.required.contains_key(&name) || self.local.contains_key(&name) {
                return Err(CompileError::DuplicateSymbol {
                    kind: self.kind,
                    name,
                    at: at.clone(),
                });
            }
            self.local.insert(name, value);
        }
        Ok(())
    }

    /// Fresh table for a sub-session: required tier carried over, no locals.
    pub fn sub_session(&self) -> SymbolTable<T> {
        SymbolTable {
            kind: self.kind,
            local: HashMap::new(),
            required: self.required.clone(),
        }
    }
}

/// The four resource tables of one compiler session.
#[derive(Debug, Clone)]
pub struct CompilerTables {
    pub formats: SymbolTable<TextureFormat>,
    pub shaders: SymbolTable<ShaderSource>,
    pub geometries: SymbolTable<GeometryModel>,
    /// Filter and pipeline layouts share one table: both are component types
    /// a pipeline body may instantiate.
    pub layouts: SymbolTable<ComponentLayout>,
}

impl Default for CompilerTables {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerTables {
    pub fn new() -> Self {
        Self {
            formats: SymbolTable::new("format"),
            shaders: SymbolTable::new("shader"),
            geometries: SymbolTable::new("geometry"),
            layouts: SymbolTable::new("layout"),
        }
    }

    // Host-injection surface. This is the only way script text receives
    // host-provided parameters.

    pub fn add_required_format(
        &mut self,
        name: &str,
        value: TextureFormat,
        replace: bool,
    ) -> Result<(), CompileError> {
        self.formats.insert_required(name, value, replace)
    }

    pub fn add_required_shader(
        &mut self,
        name: &str,
        value: ShaderSource,
        replace: bool,
    ) -> Result<(), CompileError> {
        self.shaders.insert_required(name, value, replace)
    }

    pub fn add_required_geometry(
        &mut self,
        name: &str,
        value: GeometryModel,
        replace: bool,
    ) -> Result<(), CompileError> {
        self.geometries.insert_required(name, value, replace)
    }

    pub fn add_required_pipeline(
        &mut self,
        name: &str,
        value: PipelineLayout,
        replace: bool,
    ) -> Result<(), CompileError> {
        self.layouts
            .insert_required(name, ComponentLayout::Pipeline(value), replace)
    }

    pub fn clear_required(&mut self) {
        self.formats.clear_required();
        self.shaders.clear_required();
        self.geometries.clear_required();
        self.layouts.clear_required();
    }

    pub(crate) fn sub_session(&self) -> CompilerTables {
        CompilerTables {
            formats: self.formats.sub_session(),
            shaders: self.shaders.sub_session(),
            geometries: self.geometries.sub_session(),
            layouts: self.layouts.sub_session(),
        }
    }

    pub(crate) fn merge_locals(
        &mut self,
        other: CompilerTables,
        at: &SourcePos,
    ) -> Result<(), CompileError> {
        self.formats.merge_locals(other.formats, at)?;
        self.shaders.merge_locals(other.shaders, at)?;
        self.geometries.merge_locals(other.geometries, at)?;
        self.layouts.merge_locals(other.layouts, at)?;
        Ok(())
    }
}
