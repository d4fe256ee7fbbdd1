//! Module resolution: a handful of native `std` tables plus `.rab`
//! source files looked up on the search paths.

use std::path::PathBuf;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use super::builtin;
use super::runtime_value::RuntimeValue;
use crate::arena::{Arena, ArenaId};
use crate::ast::node::Ident;
use crate::number::{self, Number};

pub type ModuleId = ArenaId<SmolStr>;

pub const TOP_LEVEL_MODULE: &str = "top-level";

const MODULE_EXTENSION: &str = "rab";

#[derive(Error, Debug, PartialEq)]
pub enum ModuleError {
    #[error("Module \"{0}\" not found")]
    NotFound(String),
    #[error("Failed to read module \"{0}\": {1}")]
    IOError(String, String),
}

/// Registry of everything loadable through `use std/<name>`.
///
/// Names are interned in an [`Arena`] so tokens can carry a compact
/// [`ModuleId`] back to the source they came from.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    pub(crate) search_paths: Option<Vec<PathBuf>>,
    names: Arena<SmolStr>,
    sources: FxHashMap<SmolStr, String>,
}

impl ModuleLoader {
    pub const TOP_LEVEL: ModuleId = ModuleId::new(0);

    pub fn new(search_paths: Option<Vec<PathBuf>>) -> Self {
        let mut names = Arena::new(4);
        names.alloc(SmolStr::new(TOP_LEVEL_MODULE));
        Self {
            search_paths,
            names,
            sources: FxHashMap::default(),
        }
    }

    pub fn module_name(&self, module_id: ModuleId) -> SmolStr {
        self.names
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| SmolStr::new(TOP_LEVEL_MODULE))
    }

    /// Every file module loaded so far, with its source text.
    pub fn loaded_sources(&self) -> impl Iterator<Item = (&SmolStr, &String)> {
        self.sources.iter()
    }

    /// The source text of a loaded file module, kept for diagnostics.
    pub fn module_source(&self, module_id: ModuleId) -> Option<&str> {
        self.names
            .get(module_id)
            .and_then(|name| self.sources.get(name))
            .map(|s| s.as_str())
    }

    /// Reads `{name}.rab` from the search paths and interns the module,
    /// returning its source and id. Re-reading a loaded module returns
    /// the cached source.
    pub fn load_file(&mut self, name: &str) -> Result<(String, ModuleId), ModuleError> {
        let interned = SmolStr::new(name);
        if let Some(source) = self.sources.get(&interned) {
            let module_id = self
                .names
                .iter()
                .position(|n| *n == interned)
                .map(ModuleId::from)
                .unwrap_or(Self::TOP_LEVEL);
            return Ok((source.clone(), module_id));
        }

        let path = self
            .find(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        let source = std::fs::read_to_string(&path)
            .map_err(|e| ModuleError::IOError(name.to_string(), e.to_string()))?;

        let module_id = self.names.alloc(interned.clone());
        self.sources.insert(interned, source.clone());

        Ok((source, module_id))
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}.{}", name, MODULE_EXTENSION);
        self.search_paths
            .clone()
            .unwrap_or_else(Self::default_search_paths)
            .into_iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rabbit").join("modules"));
        }
        paths.push(PathBuf::from("."));
        paths
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// The built-in `std` modules that need no file lookup. Each resolves
/// to a map of natives, so `math.sqrt(2)` goes through the same access
/// path as any other map.
pub fn native_module(name: &str) -> Option<RuntimeValue> {
    match name {
        "math" => {
            let mut table = FxHashMap::default();
            for func in ["sqrt", "pow", "sin", "cos", "tan", "abs", "min", "max"] {
                table.insert(
                    func.to_string(),
                    RuntimeValue::NativeFunction(Ident::new(func)),
                );
            }
            table.insert(
                "pi".to_string(),
                RuntimeValue::Number(Number::new(std::f64::consts::PI)),
            );
            table.insert(
                "e".to_string(),
                RuntimeValue::Number(Number::new(std::f64::consts::E)),
            );
            table.insert("inf".to_string(), RuntimeValue::Number(number::INFINITE));
            Some(RuntimeValue::map(table))
        }
        "string" => {
            let mut table = FxHashMap::default();
            for func in ["split", "join", "trim", "upper", "lower", "len", "reverse"] {
                table.insert(
                    func.to_string(),
                    RuntimeValue::NativeFunction(Ident::new(func)),
                );
            }
            Some(RuntimeValue::map(table))
        }
        "json" => Some(builtin::json_module()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_top_level_module_name() {
        let loader = ModuleLoader::default();
        assert_eq!(
            loader.module_name(ModuleLoader::TOP_LEVEL),
            SmolStr::new(TOP_LEVEL_MODULE)
        );
    }

    #[test]
    fn test_load_file_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpers.rab");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "def twice(x) {{ x * 2 }}").unwrap();

        let mut loader = ModuleLoader::new(Some(vec![dir.path().to_path_buf()]));
        let (source, module_id) = loader.load_file("helpers").unwrap();
        assert!(source.contains("twice"));
        assert_eq!(loader.module_name(module_id), SmolStr::new("helpers"));
        assert_eq!(loader.module_source(module_id), Some(source.as_str()));

        let (cached, cached_id) = loader.load_file("helpers").unwrap();
        assert_eq!(cached, source);
        assert_eq!(cached_id, module_id);
    }

    #[test]
    fn test_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = ModuleLoader::new(Some(vec![dir.path().to_path_buf()]));
        assert_eq!(
            loader.load_file("nope"),
            Err(ModuleError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_native_modules() {
        assert!(matches!(native_module("math"), Some(RuntimeValue::Map(_))));
        assert!(matches!(native_module("string"), Some(RuntimeValue::Map(_))));
        assert!(matches!(native_module("json"), Some(RuntimeValue::Map(_))));
        assert_eq!(native_module("nope"), None);
    }
}
