//! Per-request context: the request, per-request state, and the child-action flag.
//!
//! A [`Context`] is created once per action execution. Filters may stash
//! values in its [`Extensions`] during the pre-execution hook and read them
//! back after the result has executed.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map: used to carry per-request state
/// between filter hooks without the hooks knowing about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type if any.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value in the extensions map
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Per-request context handed to filters and handlers.
///
/// A *child action* is an action executed while a parent request is being
/// rendered (a partial pulled into a page, for example). Its result is
/// embedded in the parent's output and has no URL of its own.
#[derive(Debug)]
pub struct Context {
    request: Request,
    extensions: Extensions,
    child_action: bool,
}

impl Context {
    /// Create the context of a top-level request.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
            child_action: false,
        }
    }

    /// Create the context of a child action nested in a parent request.
    pub fn child(request: Request) -> Self {
        Self {
            child_action: true,
            ..Self::new(request)
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns `true` when this execution is nested inside a parent request.
    pub fn is_child_action(&self) -> bool {
        self.child_action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[derive(Debug, PartialEq)]
    struct Marker(&'static str);

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        assert_eq!(ext.insert(Marker("a")), None);
        assert_eq!(ext.insert(Marker("b")), Some(Marker("a")));
        assert_eq!(ext.get::<Marker>(), Some(&Marker("b")));
        assert_eq!(ext.get::<u32>(), None);
        ext.get_mut::<Marker>().unwrap().0 = "c";
        assert_eq!(ext.get::<Marker>(), Some(&Marker("c")));
        assert!(ext.get_mut::<u32>().is_none());
    }

    #[test]
    fn child_flag() {
        let top = Context::new(Request::new(Method::Get, "/"));
        let nested = Context::child(Request::new(Method::Get, "/sidebar"));
        assert!(!top.is_child_action());
        assert!(nested.is_child_action());
        assert_eq!(nested.request().path(), "/sidebar");
    }
}
