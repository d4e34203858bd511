//! Temporal invariants (spec §3, §4.4).

use crate::event::EventType;

/// The kind of temporal relationship an [`Invariant`] asserts between two
/// event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum InvariantKind {
    /// Every occurrence of the left type is eventually followed by the
    /// right type, within the same trace.
    AlwaysFollowedBy,
    /// Every occurrence of the right type is preceded by the left type.
    AlwaysPrecedes,
    /// No occurrence of the left type is ever followed by the right type.
    NeverFollowedBy,
    /// The right type appears between every consecutive pair of left-type
    /// occurrences.
    InterruptedBy,
    /// On partially ordered input, the two types are never vector-clock
    /// incomparable in any trace.
    NeverConcurrent,
}

impl InvariantKind {
    /// Short mnemonic used by the invariant text formatter (spec §6).
    pub fn mnemonic(&self) -> &'static str {
        match self {
            InvariantKind::AlwaysFollowedBy => "AFby",
            InvariantKind::AlwaysPrecedes => "AP",
            InvariantKind::NeverFollowedBy => "NFby",
            InvariantKind::InterruptedBy => "IntrBy",
            InvariantKind::NeverConcurrent => "NeverConcurrent",
        }
    }
}

/// A mined temporal invariant over a pair of event types.
///
/// Equality and hashing ignore `support`, per spec §3: two invariants with
/// the same `(left, right, kind)` are the same invariant, possibly mined
/// with different evidence counts.
#[derive(Debug, Clone)]
pub struct Invariant {
    /// The left-hand operand. May be `EventType::INITIAL` only for
    /// `AlwaysFollowedBy` ("eventually x").
    pub left: EventType,
    /// The right-hand operand. May be `EventType::TERMINAL` only for
    /// `AlwaysFollowedBy`.
    pub right: EventType,
    /// Which temporal relationship this invariant asserts.
    pub kind: InvariantKind,
    /// Evidence count backing this invariant, when requested (spec §4.4:
    /// "the left-hand-side event count").
    pub support: Option<u64>,
}

impl Invariant {
    /// Constructs an invariant with no recorded support count.
    pub fn new(left: EventType, right: EventType, kind: InvariantKind) -> Self {
        Self {
            left,
            right,
            kind,
            support: None,
        }
    }

    /// Builder-style setter for the support count.
    pub fn with_support(mut self, support: u64) -> Self {
        self.support = Some(support);
        self
    }
}

impl PartialEq for Invariant {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.right == other.right && self.kind == other.kind
    }
}

impl Eq for Invariant {}

impl std::hash::Hash for Invariant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.left.hash(state);
        self.right.hash(state);
        self.kind.hash(state);
    }
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.kind.mnemonic(), self.right)?;
        if let Some(support) = self.support {
            write!(f, " [support={support}]")?;
        }
        Ok(())
    }
}

/// Formats a set of invariants as the §6 invariant-file text format: one
/// invariant per line, ordered by kind, then left label, then right label.
pub fn invariants_to_text(invariants: &[Invariant]) -> String {
    let mut sorted: Vec<&Invariant> = invariants.iter().collect();
    sorted.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.left.cmp(&b.left))
            .then_with(|| a.right.cmp(&b.right))
    });
    sorted
        .into_iter()
        .map(|inv| inv.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_support() {
        let a = Invariant::new(EventType::Label("open".into()), EventType::Label("close".into()), InvariantKind::AlwaysFollowedBy)
            .with_support(3);
        let b = Invariant::new(EventType::Label("open".into()), EventType::Label("close".into()), InvariantKind::AlwaysFollowedBy)
            .with_support(99);
        assert_eq!(a, b);
    }

    #[test]
    fn text_format_matches_spec_line_shape() {
        let inv = Invariant::new(EventType::Label("open".into()), EventType::Label("close".into()), InvariantKind::AlwaysFollowedBy)
            .with_support(2);
        assert_eq!(inv.to_string(), "open AFby close [support=2]");
    }

    #[test]
    fn text_ordering_is_by_kind_then_left_then_right() {
        let a = Invariant::new(EventType::Label("b".into()), EventType::Label("c".into()), InvariantKind::AlwaysFollowedBy);
        let b = Invariant::new(EventType::Label("a".into()), EventType::Label("c".into()), InvariantKind::AlwaysFollowedBy);
        let c = Invariant::new(EventType::Label("a".into()), EventType::Label("b".into()), InvariantKind::NeverFollowedBy);
        let text = invariants_to_text(&[c.clone(), a.clone(), b.clone()]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["a AFby c", "b AFby c", "a NFby b"]);
    }
}
