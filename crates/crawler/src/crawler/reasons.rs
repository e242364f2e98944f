//
// crawler/reasons.rs
//
// Invocation reasons: why a scope needs reanalysis
//

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of independent reanalysis flags.
///
/// The empty set is a real value: the differ drops any item whose reasons
/// end up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationReasons(u32);

impl InvocationReasons {
    pub const EMPTY: Self = Self(0);
    pub const DOCUMENT_ADDED: Self = Self(1 << 0);
    pub const DOCUMENT_REMOVED: Self = Self(1 << 1);
    pub const DOCUMENT_OPENED: Self = Self(1 << 2);
    pub const DOCUMENT_CLOSED: Self = Self(1 << 3);
    pub const SYNTAX_CHANGED: Self = Self(1 << 4);
    pub const SEMANTIC_CHANGED: Self = Self(1 << 5);
    pub const PROJECT_PARSE_OPTION_CHANGED: Self = Self(1 << 6);
    pub const PROJECT_CONFIGURATION_CHANGED: Self = Self(1 << 7);
    pub const ADDITIONAL_DOCUMENT_CHANGED: Self = Self(1 << 8);
    pub const SOLUTION_REMOVED: Self = Self(1 << 9);

    /// Content edit: both syntax and semantics are stale
    pub const DOCUMENT_CHANGED: Self = Self(Self::SYNTAX_CHANGED.0 | Self::SEMANTIC_CHANGED.0);

    const NAMES: [(Self, &'static str); 10] = [
        (Self::DOCUMENT_ADDED, "DocumentAdded"),
        (Self::DOCUMENT_REMOVED, "DocumentRemoved"),
        (Self::DOCUMENT_OPENED, "DocumentOpened"),
        (Self::DOCUMENT_CLOSED, "DocumentClosed"),
        (Self::SYNTAX_CHANGED, "SyntaxChanged"),
        (Self::SEMANTIC_CHANGED, "SemanticChanged"),
        (Self::PROJECT_PARSE_OPTION_CHANGED, "ProjectParseOptionChanged"),
        (Self::PROJECT_CONFIGURATION_CHANGED, "ProjectConfigurationChanged"),
        (Self::ADDITIONAL_DOCUMENT_CHANGED, "AdditionalDocumentChanged"),
        (Self::SOLUTION_REMOVED, "SolutionRemoved"),
    ];

    /// Union of two reason sets
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every flag of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Iterate over the names of the set flags
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for InvocationReasons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for InvocationReasons {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

impl fmt::Display for InvocationReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Empty");
        }
        let names: Vec<_> = self.names().collect();
        write!(f, "{}", names.join("|"))
    }
}
