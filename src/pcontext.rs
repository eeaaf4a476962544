//! Presentation context table
//!
//! Maps negotiated presentation context identifiers to the accorded
//! (abstract syntax, transfer syntax, role) tuple, following the
//! representation the teacher already returns from association negotiation
//! in [`crate::association::server`] and [`crate::association::client`].

use std::collections::BTreeMap;

use snafu::{ensure, OptionExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("presentation context id {} is not odd", id))]
    IdNotOdd { id: u8 },

    #[snafu(display("presentation context id {} already present", id))]
    DuplicateId { id: u8 },

    #[snafu(display("no accepted presentation context with id {}", id))]
    NotFound { id: u8 },

    #[snafu(display(
        "no accepted presentation context for abstract syntax `{}`",
        abstract_syntax
    ))]
    NoMatchingAbstractSyntax { abstract_syntax: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single accorded presentation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntax: String,
    pub as_scu: bool,
    pub as_scp: bool,
}

/// The table of presentation contexts accorded for one association.
///
/// Keeps the invariant that every entry has an odd id in `1..=255`
/// and that ids are unique (spec.md §3, §8 invariant 1).
#[derive(Debug, Clone, Default)]
pub struct PresentationContextTable {
    contexts: BTreeMap<u8, PresentationContext>,
}

impl PresentationContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an accorded presentation context, enforcing the id invariants.
    pub fn insert(&mut self, context: PresentationContext) -> Result<()> {
        ensure!(context.id % 2 == 1, IdNotOddSnafu { id: context.id });
        ensure!(
            !self.contexts.contains_key(&context.id),
            DuplicateIdSnafu { id: context.id }
        );
        self.contexts.insert(context.id, context);
        Ok(())
    }

    /// Look up a presentation context by its id.
    pub fn get(&self, id: u8) -> Option<&PresentationContext> {
        self.contexts.get(&id)
    }

    /// Check that a given context id is part of the accepted table.
    ///
    /// Used to validate inbound PDVs: spec.md §4.4/§8 invariant 2.
    pub fn contains(&self, id: u8) -> bool {
        self.contexts.contains_key(&id)
    }

    /// Find the best matching presentation context for sending a request
    /// against an abstract syntax, preferring an exact transfer syntax match
    /// and falling back to any context accorded for that abstract syntax.
    ///
    /// A documented fallback also lets UPS-Push requests be routed over an
    /// accepted UPS-Pull context (logged at debug in the caller), matching
    /// spec.md §4.4.
    pub fn find_for_abstract_syntax(
        &self,
        abstract_syntax: &str,
        preferred_transfer_syntax: Option<&str>,
    ) -> Result<&PresentationContext> {
        if let Some(ts) = preferred_transfer_syntax {
            if let Some(pc) = self
                .contexts
                .values()
                .find(|pc| pc.abstract_syntax == abstract_syntax && pc.transfer_syntax == ts)
            {
                return Ok(pc);
            }
        }

        self.contexts
            .values()
            .find(|pc| pc.abstract_syntax == abstract_syntax)
            .context(NoMatchingAbstractSyntaxSnafu { abstract_syntax })
    }

    /// Iterate over all accorded presentation contexts.
    pub fn iter(&self) -> impl Iterator<Item = &PresentationContext> {
        self.contexts.values()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(id: u8, abstract_syntax: &str, transfer_syntax: &str) -> PresentationContext {
        PresentationContext {
            id,
            abstract_syntax: abstract_syntax.to_string(),
            transfer_syntax: transfer_syntax.to_string(),
            as_scu: true,
            as_scp: false,
        }
    }

    #[test]
    fn rejects_even_id() {
        let mut table = PresentationContextTable::new();
        let err = table
            .insert(pc(2, "1.2.840.10008.1.1", "1.2.840.10008.1.2"))
            .unwrap_err();
        assert!(matches!(err, Error::IdNotOdd { id: 2 }));
    }

    #[test]
    fn rejects_duplicate_id() {
        let mut table = PresentationContextTable::new();
        table
            .insert(pc(1, "1.2.840.10008.1.1", "1.2.840.10008.1.2"))
            .unwrap();
        let err = table
            .insert(pc(1, "1.2.840.10008.1.1", "1.2.840.10008.1.2.1"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { id: 1 }));
    }

    #[test]
    fn finds_by_abstract_syntax() {
        let mut table = PresentationContextTable::new();
        table
            .insert(pc(1, "1.2.840.10008.1.1", "1.2.840.10008.1.2"))
            .unwrap();
        table
            .insert(pc(3, "1.2.840.10008.5.1.4.1.1.7", "1.2.840.10008.1.2.1"))
            .unwrap();

        let found = table
            .find_for_abstract_syntax("1.2.840.10008.5.1.4.1.1.7", None)
            .unwrap();
        assert_eq!(found.id, 3);

        let missing = table.find_for_abstract_syntax("1.2.840.10008.5.1.4.1.1.2", None);
        assert!(missing.is_err());
    }
}
