//! Compile-time and scheduler-level diagnostics.
//!
//! - **`ErrorKind`** — the canonical set of error kinds surfaced to the host
//!   (InvalidName, EntityExists, ExpressionSyntax, ...).
//! - **`Diagnostic`** — one struct combining a kind, a human message, and optional
//!   source-text location, attached to the entity/expression that raised it.
//!
//! Diagnostics are accumulated, never thrown: a compile failure attaches a
//! diagnostic to the offending expression and the evaluator falls back to
//! [`crate::Value::Undefined`] for every timestep, rather than aborting the model.

use std::{error::Error, fmt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidName,
    EntityExists,
    ExpressionSyntax,
    UnresolvedReference,
    Cycle,
    OutOfBounds,
    SolverTimeout,
    SolverError,
    UnitConflict,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidName => "invalid-name",
            Self::EntityExists => "entity-exists",
            Self::ExpressionSyntax => "expression-syntax",
            Self::UnresolvedReference => "unresolved-reference",
            Self::Cycle => "cycle",
            Self::OutOfBounds => "out-of-bounds",
            Self::SolverTimeout => "solver-timeout",
            Self::SolverError => "solver-error",
            Self::UnitConflict => "unit-conflict",
        })
    }
}

/// Where a diagnostic occurred, for host-side reporting.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticContext {
    /// Name of the entity that owns the offending expression, if any.
    pub entity: Option<String>,
    /// Offset into the source text where the problem was detected.
    pub source_offset: Option<usize>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub context: DiagnosticContext,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: DiagnosticContext::default(),
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.context.entity = Some(entity.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.context.source_offset = Some(offset);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ref entity) = self.context.entity {
            write!(f, " (in {entity})")?;
        }
        if let Some(offset) = self.context.source_offset {
            write!(f, " at offset {offset}")?;
        }
        Ok(())
    }
}

impl Error for Diagnostic {}
