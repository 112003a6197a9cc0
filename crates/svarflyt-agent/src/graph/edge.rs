use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use svarflyt_core::error::{Result, SvarflytError};

use super::node::NodeKey;
use super::state::GraphState;

/// Picks a branch name from the current state.
pub type Router = Arc<dyn Fn(&GraphState) -> Result<&'static str> + Send + Sync>;

/// The single outgoing rule of a node.
pub enum Edge<K> {
    /// Unconditional next step.
    Always(K),
    /// A router names a branch, looked up in a static table.
    Conditional {
        router: Router,
        branches: HashMap<&'static str, K>,
    },
    /// Fixed-arity split. Every branch runs, then `join` continues.
    Parallel { branches: Vec<K>, join: K },
    /// Terminal.
    End,
}

impl<K: NodeKey> Edge<K> {
    pub fn always(to: K) -> Self {
        Self::Always(to)
    }

    /// Create a conditional edge from a router and its branch table.
    pub fn conditional<F>(router: F, branches: &[(&'static str, K)]) -> Self
    where
        F: Fn(&GraphState) -> Result<&'static str> + Send + Sync + 'static,
    {
        Self::Conditional {
            router: Arc::new(router),
            branches: branches.iter().copied().collect(),
        }
    }

    pub fn parallel(branches: &[K], join: K) -> Self {
        Self::Parallel {
            branches: branches.to_vec(),
            join,
        }
    }

    /// Resolve a conditional edge against `state`.
    ///
    /// Returns the chosen branch name and its target. An unknown branch
    /// name is a wiring error.
    pub fn route(&self, from: K, state: &GraphState) -> Result<Option<(&'static str, K)>> {
        let Self::Conditional { router, branches } = self else {
            return Ok(None);
        };
        let branch = router(state)?;
        let target = branches
            .get(branch)
            .copied()
            .ok_or_else(|| SvarflytError::UnknownBranch {
                node: from.name().to_string(),
                branch: branch.to_string(),
            })?;
        Ok(Some((branch, target)))
    }

    /// Every node this edge can lead to.
    pub fn targets(&self) -> Vec<K> {
        match self {
            Self::Always(to) => vec![*to],
            Self::Conditional { branches, .. } => branches.values().copied().collect(),
            Self::Parallel { branches, join } => {
                let mut all = branches.clone();
                all.push(*join);
                all
            }
            Self::End => Vec::new(),
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for Edge<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always(to) => f.debug_tuple("Always").field(to).finish(),
            Self::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish_non_exhaustive(),
            Self::Parallel { branches, join } => f
                .debug_struct("Parallel")
                .field("branches", branches)
                .field("join", join)
                .finish(),
            Self::End => f.write_str("End"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::StatePatch;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum N {
        A,
        B,
        C,
    }

    impl NodeKey for N {
        fn name(self) -> &'static str {
            match self {
                N::A => "a",
                N::B => "b",
                N::C => "c",
            }
        }
    }

    fn flag_router(state: &GraphState) -> Result<&'static str> {
        Ok(if state.get::<bool>("flag")? { "yes" } else { "no" })
    }

    #[test]
    fn test_conditional_routes_by_state() {
        let edge = Edge::conditional(flag_router, &[("yes", N::B), ("no", N::C)]);
        let state = GraphState::seeded(StatePatch::new().set("flag", &true).unwrap()).unwrap();
        assert_eq!(edge.route(N::A, &state).unwrap(), Some(("yes", N::B)));

        let state = GraphState::seeded(StatePatch::new().set("flag", &false).unwrap()).unwrap();
        assert_eq!(edge.route(N::A, &state).unwrap(), Some(("no", N::C)));
    }

    #[test]
    fn test_unknown_branch_is_error() {
        let edge = Edge::conditional(|_: &GraphState| Ok("maybe"), &[("yes", N::B)]);
        let err = edge.route(N::A, &GraphState::new()).unwrap_err();
        assert!(matches!(err, SvarflytError::UnknownBranch { ref branch, .. } if branch == "maybe"));
    }

    #[test]
    fn test_router_error_propagates() {
        let edge = Edge::conditional(flag_router, &[("yes", N::B)]);
        assert!(matches!(
            edge.route(N::A, &GraphState::new()),
            Err(SvarflytError::MissingField(_))
        ));
    }

    #[test]
    fn test_targets() {
        assert_eq!(Edge::always(N::B).targets(), vec![N::B]);
        assert_eq!(Edge::parallel(&[N::A, N::B], N::C).targets(), vec![N::A, N::B, N::C]);
        assert!(Edge::<N>::End.targets().is_empty());
        assert!(Edge::always(N::C).route(N::A, &GraphState::new()).unwrap().is_none());
    }
}
