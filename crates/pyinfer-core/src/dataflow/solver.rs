//! Constraint solver for unannotated parameters
//!
//! Each parameter starts with the full universe of base kinds. Usages inside
//! the function body shrink it:
//! - `restrict` keeps only the kinds a usage accepts (operators against known
//!   operands, member access, iteration, calls to builtins)
//! - `pair` ties two parameters used as the operands of one binary operation:
//!   a kind survives only if some kind of the partner works with it
//!
//! [`ParamSolver::solve`] runs arc consistency over the pairs with a worklist,
//! which yields the largest domains consistent with every usage. A domain that
//! ends up full or empty carries no information and is reported as `None`.

use super::lattice::{supports, Kind, KindSet};
use crate::ast::BinOp;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Pair {
    left: usize,
    right: usize,
    op: BinOp,
}

#[derive(Debug, Clone)]
pub struct ParamSolver {
    domains: Vec<KindSet>,
    pairs: Vec<Pair>,
}

impl ParamSolver {
    pub fn new(count: usize) -> Self {
        Self {
            domains: vec![KindSet::FULL; count],
            pairs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Keep only the kinds in `allowed`
    pub fn restrict(&mut self, index: usize, allowed: KindSet) {
        if let Some(domain) = self.domains.get_mut(index) {
            *domain = domain.intersect(allowed);
        }
    }

    /// `left <op> right` where both operands are parameters
    pub fn pair(&mut self, left: usize, right: usize, op: BinOp) {
        if left < self.domains.len() && right < self.domains.len() {
            self.pairs.push(Pair { left, right, op });
        }
    }

    /// Largest consistent domains; `None` where nothing useful is known
    pub fn solve(&self) -> Vec<Option<KindSet>> {
        let mut domains = self.domains.clone();
        // (pair index, revise the left side)
        let mut worklist: VecDeque<(usize, bool)> = VecDeque::new();
        let mut queued: HashSet<(usize, bool)> = HashSet::new();
        for index in 0..self.pairs.len() {
            for side in [true, false] {
                worklist.push_back((index, side));
                queued.insert((index, side));
            }
        }

        let mut revisions = 0usize;
        while let Some(arc) = worklist.pop_front() {
            queued.remove(&arc);
            revisions += 1;
            let (index, revise_left) = arc;
            let pair = self.pairs[index];
            let (target, other) = if revise_left {
                (pair.left, pair.right)
            } else {
                (pair.right, pair.left)
            };
            let revised = revise(pair.op, domains[target], domains[other], revise_left);
            if revised == domains[target] {
                continue;
            }
            domains[target] = revised;
            // every arc that reads the shrunk domain must be revisited
            for (other_index, other_pair) in self.pairs.iter().enumerate() {
                for side in [true, false] {
                    let reads = if side { other_pair.right } else { other_pair.left };
                    let key = (other_index, side);
                    if reads == target && key != arc && queued.insert(key) {
                        worklist.push_back(key);
                    }
                }
            }
        }
        trace!(params = domains.len(), pairs = self.pairs.len(), revisions, "parameter constraints solved");

        domains
            .into_iter()
            .map(|domain| (!domain.is_empty() && !domain.is_full()).then_some(domain))
            .collect()
    }
}

/// Kinds of `domain` that work with at least one kind of `partner`
fn revise(op: BinOp, domain: KindSet, partner: KindSet, domain_on_left: bool) -> KindSet {
    domain
        .iter()
        .filter(|kind| {
            partner.iter().any(|p| {
                if domain_on_left {
                    supports(op, *kind, p)
                } else {
                    supports(op, p, *kind)
                }
            })
        })
        .collect()
}

/// Kinds of one operand for which `op` works with some kind of the other
///
/// `other` is `None` when the other operand is unknown, in which case every
/// kind is acceptable.
pub fn operand_kinds(op: BinOp, other: Option<KindSet>, on_left: bool) -> KindSet {
    match other {
        Some(other) if !other.is_empty() => revise(op, KindSet::FULL, other, on_left),
        _ => KindSet::FULL,
    }
}

/// Kinds accepted by unary minus and plus
pub fn numeric_kinds() -> KindSet {
    KindSet::of(&[Kind::Bool, Kind::Int, Kind::Float])
}

/// Kinds accepted by `~`
pub fn invertible_kinds() -> KindSet {
    KindSet::of(&[Kind::Bool, Kind::Int])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained_parameter_is_any() {
        let solver = ParamSolver::new(1);
        assert_eq!(solver.solve(), vec![None]);
    }

    #[test]
    fn test_add_int_restricts_to_numbers() {
        let mut solver = ParamSolver::new(1);
        solver.restrict(0, operand_kinds(BinOp::Add, Some(KindSet::of(&[Kind::Int])), true));
        assert_eq!(solver.solve(), vec![Some(numeric_kinds())]);
    }

    #[test]
    fn test_conflicting_usages_are_any() {
        let mut solver = ParamSolver::new(1);
        solver.restrict(0, KindSet::of(&[Kind::Str]));
        solver.restrict(0, KindSet::of(&[Kind::Int]));
        assert_eq!(solver.solve(), vec![None]);
    }

    #[test]
    fn test_pair_propagates_between_parameters() {
        let mut solver = ParamSolver::new(2);
        solver.restrict(0, KindSet::of(&[Kind::Str]));
        solver.pair(0, 1, BinOp::Add);
        let solved = solver.solve();
        assert_eq!(solved[0], Some(KindSet::of(&[Kind::Str])));
        assert_eq!(solved[1], Some(KindSet::of(&[Kind::Str])));
    }

    #[test]
    fn test_pair_of_unknowns_drops_unsupported_kinds() {
        let mut solver = ParamSolver::new(2);
        solver.pair(0, 1, BinOp::Sub);
        let solved = solver.solve();
        let left = solved[0].unwrap();
        assert!(left.contains(Kind::Int));
        assert!(left.contains(Kind::Set));
        assert!(!left.contains(Kind::Str));
    }

    #[test]
    fn test_operand_kinds_with_unknown_partner() {
        assert_eq!(operand_kinds(BinOp::Mult, None, false), KindSet::FULL);
        let kinds = operand_kinds(BinOp::Mult, Some(KindSet::of(&[Kind::Str])), false);
        assert_eq!(kinds, KindSet::of(&[Kind::Bool, Kind::Int]));
    }
}
