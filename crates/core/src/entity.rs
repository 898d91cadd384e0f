//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Profiles, permissions and incidents are entities; the user account is an
/// aggregate root because its security state evolves through events.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
