use crate::types::Type;
use std::collections::HashMap;

/// Local scopes, innermost last. Globals are resolved through the
/// `GlobalTable` once the chain is exhausted.
#[derive(Debug, Default, Clone)]
pub struct ScopeChain {
    frames: Vec<HashMap<String, Type>>,
}

impl ScopeChain {
    /// Chain for top-level code: no local frames.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Binds `name` in the innermost frame. Returns false if it is already
    /// bound there.
    pub fn define(&mut self, name: &str, ty: Type) -> bool {
        match self.frames.last_mut() {
            Some(frame) if frame.contains_key(name) => false,
            Some(frame) => {
                frame.insert(name.to_string(), ty);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    pub fn is_top_level(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_wins() {
        let mut scope = ScopeChain::new();
        assert!(scope.is_top_level());
        scope.push();
        assert!(scope.define("x", Type::Number));
        scope.push();
        assert!(scope.define("x", Type::Bool));
        assert_eq!(scope.lookup("x"), Some(&Type::Bool));
        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&Type::Number));
        assert!(!scope.define("x", Type::Bool));
        assert_eq!(scope.lookup("y"), None);
    }
}
