use crate::source::ScopeDefaults;

/// Override stack of scope defaults, outermost first
///
/// Lookups return the value of the nearest scope that sets one. A scope that
/// leaves a value unset inherits it; it can never clear it.
#[derive(Debug, Clone, Default)]
pub struct DefaultsStack {
    scopes: Vec<ScopeDefaults>,
}

impl DefaultsStack {
    pub fn new(root: ScopeDefaults) -> Self {
        Self { scopes: vec![root] }
    }

    /// A stack with `scope` nested inside this one
    pub fn nested(&self, scope: &ScopeDefaults) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(scope.clone());
        Self { scopes }
    }

    pub fn schema(&self) -> Option<&str> {
        self.nearest(|scope| scope.schema.as_deref())
    }

    pub fn catalog(&self) -> Option<&str> {
        self.nearest(|scope| scope.catalog.as_deref())
    }

    pub fn access(&self) -> Option<&str> {
        self.nearest(|scope| scope.access.as_deref())
    }

    pub fn cascade(&self) -> Option<&str> {
        self.nearest(|scope| scope.cascade.as_deref())
    }

    fn nearest<'a, F>(&'a self, select: F) -> Option<&'a str>
    where
        F: Fn(&'a ScopeDefaults) -> Option<&'a str>,
    {
        self.scopes.iter().rev().find_map(select)
    }
}
