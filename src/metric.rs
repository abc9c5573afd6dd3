// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metric identity.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

/// Named, typed definition of a measurable quantity.
///
/// `S` is the subject kind and `T` the value a source produces per subject
/// (usually a series). The name is unique within a [`Monitor`](crate::Monitor).
pub struct Metric<S, T> {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    _types: PhantomData<fn() -> (S, T)>,
}

impl<S, T> Metric<S, T> {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            description: Cow::Borrowed(description),
            _types: PhantomData,
        }
    }

    /// Metric whose name is only known at run time.
    pub fn dynamic(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            description: Cow::Owned(description.into()),
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<S, T> Clone for Metric<S, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            _types: PhantomData,
        }
    }
}

impl<S, T> PartialEq for Metric<S, T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<S, T> Eq for Metric<S, T> {}

impl<S, T> fmt::Debug for Metric<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl<S, T> fmt::Display for Metric<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
