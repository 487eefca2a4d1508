use parse_display::Display;

/// Boundary errors surfaced by the renderer and its collaborators.
#[derive(Debug, Display)]
pub enum Error {
    /// A component's render function failed. The renderer logs it and
    /// substitutes a comment placeholder for the subtree.
    #[display("render error: {0}")]
    Render(String),
    /// An async component loader resolved to nothing.
    #[display("failed to resolve async component for slot `{slot}`: {path}")]
    AsyncComponentLoad { slot: String, path: String },
    #[display("{0}")]
    Navigation(NavigationFailure),
}

impl std::error::Error for Error {}

/// Navigation control-flow signal. These are propagation vehicles used by a
/// router, not failures; callers distinguish them from real errors via
/// [`is_navigation_failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[display("navigation failure (type {kind})")]
pub struct NavigationFailure {
    pub kind: u8,
}

impl NavigationFailure {
    pub const ABORTED: u8 = 4;
    pub const CANCELLED: u8 = 8;
    pub const DUPLICATED: u8 = 16;

    pub fn aborted() -> Self {
        Self {
            kind: Self::ABORTED,
        }
    }
    pub fn cancelled() -> Self {
        Self {
            kind: Self::CANCELLED,
        }
    }
    pub fn duplicated() -> Self {
        Self {
            kind: Self::DUPLICATED,
        }
    }
}

/// Whether `error` is a navigation signal matching any bit of `mask`.
pub fn is_navigation_failure(error: &Error, mask: u8) -> bool {
    matches!(error, Error::Navigation(f) if f.kind & mask != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_failure_mask() {
        let e = Error::Navigation(NavigationFailure::aborted());
        assert!(is_navigation_failure(&e, NavigationFailure::ABORTED));
        assert!(is_navigation_failure(
            &e,
            NavigationFailure::ABORTED | NavigationFailure::CANCELLED
        ));
        assert!(!is_navigation_failure(&e, NavigationFailure::DUPLICATED));
        let e = Error::Render("boom".into());
        assert!(!is_navigation_failure(&e, NavigationFailure::ABORTED));
    }

    #[test]
    fn display_names_slot_and_path() {
        let e = Error::AsyncComponentLoad {
            slot: "default".into(),
            path: "/about".into(),
        };
        assert_eq!(
            e.to_string(),
            "failed to resolve async component for slot `default`: /about"
        );
    }
}
