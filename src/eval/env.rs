use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxBuildHasher, FxHashMap};
use thiserror::Error;

use super::builtin;
use super::runtime_value::RuntimeValue;
use crate::ast::node::Ident;

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("\"{0}\" is not defined")]
    NotDefined(String),
}

/// One scope in the lexical chain. The parent link is strong: a closure
/// escaping its defining frame must keep the whole chain alive.
#[derive(Debug, Clone, Default)]
pub struct Env {
    context: FxHashMap<Ident, RuntimeValue>,
    parent: Option<Rc<RefCell<Env>>>,
}

impl Env {
    pub fn with_parent(parent: Rc<RefCell<Env>>) -> Self {
        Self {
            context: FxHashMap::with_capacity_and_hasher(8, FxBuildHasher),
            parent: Some(parent),
        }
    }

    #[inline(always)]
    pub fn define(&mut self, ident: Ident, runtime_value: RuntimeValue) {
        self.context.insert(ident, runtime_value);
    }

    /// Rebinds the nearest enclosing definition of `ident`. Returns
    /// `false` if no scope in the chain defines it.
    pub fn update(&mut self, ident: &Ident, runtime_value: RuntimeValue) -> bool {
        if let Some(slot) = self.context.get_mut(ident) {
            *slot = runtime_value;
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().update(ident, runtime_value)
        } else {
            false
        }
    }

    /// Copies out every binding in this scope, used to export a
    /// module's top level as a map.
    pub fn exports(&self) -> FxHashMap<String, RuntimeValue> {
        self.context
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Walks the scope chain, falling back to the builtin registry at
    /// the root.
    #[inline(always)]
    pub fn resolve(&self, ident: &Ident) -> Result<RuntimeValue, EnvError> {
        match self.context.get(ident) {
            Some(value) => Ok(value.clone()),
            None => match &self.parent {
                Some(parent) => parent.borrow().resolve(ident),
                None => builtin::lookup(ident)
                    .ok_or_else(|| EnvError::NotDefined(ident.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;

    #[test]
    fn test_define_and_resolve() {
        let mut env = Env::default();
        env.define(Ident::new("x"), RuntimeValue::Number(Number::new(42.0)));

        assert_eq!(
            env.resolve(&Ident::new("x")),
            Ok(RuntimeValue::Number(Number::new(42.0)))
        );
        assert_eq!(
            env.resolve(&Ident::new("missing")),
            Err(EnvError::NotDefined("missing".to_string()))
        );
    }

    #[test]
    fn test_resolve_from_parent_and_shadow() {
        let parent = Rc::new(RefCell::new(Env::default()));
        parent
            .borrow_mut()
            .define(Ident::new("x"), RuntimeValue::Number(Number::new(1.0)));

        let mut child = Env::with_parent(Rc::clone(&parent));
        assert_eq!(
            child.resolve(&Ident::new("x")),
            Ok(RuntimeValue::Number(Number::new(1.0)))
        );

        child.define(Ident::new("x"), RuntimeValue::Number(Number::new(2.0)));
        assert_eq!(
            child.resolve(&Ident::new("x")),
            Ok(RuntimeValue::Number(Number::new(2.0)))
        );
    }

    #[test]
    fn test_update_rebinds_nearest_definition() {
        let parent = Rc::new(RefCell::new(Env::default()));
        parent
            .borrow_mut()
            .define(Ident::new("total"), RuntimeValue::Number(Number::new(0.0)));

        let mut child = Env::with_parent(Rc::clone(&parent));
        assert!(child.update(&Ident::new("total"), RuntimeValue::Number(Number::new(5.0))));
        assert!(!child.update(&Ident::new("missing"), RuntimeValue::Nil));

        assert_eq!(
            parent.borrow().resolve(&Ident::new("total")),
            Ok(RuntimeValue::Number(Number::new(5.0)))
        );
    }

    #[test]
    fn test_builtin_fallback_at_root() {
        let env = Env::default();
        assert!(matches!(
            env.resolve(&Ident::new("len")),
            Ok(RuntimeValue::NativeFunction(_))
        ));
        assert!(matches!(
            env.resolve(&Ident::new("pi")),
            Ok(RuntimeValue::Number(_))
        ));
    }
}
