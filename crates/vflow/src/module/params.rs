// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local mirror of a module's typed parameters.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::message::ParamValue;

/// Typed parameter values keyed by name.
///
/// A parameter keeps the type it was declared with; updates of another type
/// are rejected.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: BTreeMap<String, ParamValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter with its initial value.
    pub fn add(&mut self, name: &str, value: ParamValue) -> Result<()> {
        if self.values.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_owned()));
        }
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    /// Update a declared parameter.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let Some(current) = self.values.get_mut(name) else {
            return Err(Error::NotFound(name.to_owned()));
        };
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(Error::Protocol(format!(
                "parameter {} is {}, not {}",
                name,
                current.type_name(),
                value.type_name()
            )));
        }
        *current = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    // Typed getters fall back to the type's default on a missing name or a
    // type mismatch.

    pub fn file(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(ParamValue::File(path)) => path.clone(),
            _ => String::new(),
        }
    }

    pub fn float(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn vector(&self, name: &str) -> [f64; 3] {
        match self.values.get(name) {
            Some(ParamValue::Vector(v)) => *v,
            _ => [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_set() {
        let mut params = Parameters::new();
        params.add("iso", ParamValue::Float(0.5)).unwrap();
        params.set("iso", ParamValue::Float(0.75)).unwrap();
        assert_eq!(params.float("iso"), 0.75);
        assert!(matches!(
            params.add("iso", ParamValue::Float(1.0)),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_set_rejects_unknown_and_mistyped() {
        let mut params = Parameters::new();
        params.add("steps", ParamValue::Int(10)).unwrap();
        assert!(matches!(
            params.set("missing", ParamValue::Int(1)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            params.set("steps", ParamValue::Float(1.0)),
            Err(Error::Protocol(_))
        ));
        assert_eq!(params.int("steps"), 10);
    }

    #[test]
    fn test_getters_default_on_miss() {
        let mut params = Parameters::new();
        params.add("path", ParamValue::File("/data/in.vtk".into())).unwrap();
        assert_eq!(params.file("path"), "/data/in.vtk");
        assert_eq!(params.file("nope"), "");
        assert_eq!(params.int("path"), 0);
        assert_eq!(params.vector("path"), [0.0; 3]);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["path"]);
    }
}
