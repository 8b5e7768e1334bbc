// src/resolver/transaction.rs

//! Staged transactions and the session that owns them
//!
//! A [`ResolverSession`] stages install/update actions against a snapshot
//! and hands the result to a solver. Nothing is ever committed: the staged
//! transaction is discarded when the session is dropped, whichever way the
//! caller leaves.

use super::{Solver, SolverReport};
use crate::error::{Error, Result};
use crate::repository::snapshot::RepositorySnapshot;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// One staged action
///
/// Package indices refer to `RepositorySnapshot::available`, installed
/// indices to `RepositorySnapshot::installed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMember {
    /// Install a package that is not installed yet
    Install { package: usize },
    /// Replace an installed package with a newer build of itself
    Update { installed: usize, package: usize },
    /// Replace an installed package with one that obsoletes it
    Obsolete { installed: usize, package: usize },
}

impl TransactionMember {
    /// The available package this action brings in
    pub fn package(&self) -> usize {
        match *self {
            TransactionMember::Install { package }
            | TransactionMember::Update { package, .. }
            | TransactionMember::Obsolete { package, .. } => package,
        }
    }

    /// The installed package this action removes, if any
    pub fn replaces(&self) -> Option<usize> {
        match *self {
            TransactionMember::Install { .. } => None,
            TransactionMember::Update { installed, .. }
            | TransactionMember::Obsolete { installed, .. } => Some(installed),
        }
    }
}

/// A staged, uncommitted set of actions
#[derive(Debug, Default, Clone)]
pub struct Transaction {
    members: Vec<TransactionMember>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `member` unless its package or the installed package it
    /// replaces is already part of the transaction
    pub fn add(&mut self, member: TransactionMember) -> bool {
        let duplicate = self.members.iter().any(|m| {
            m.package() == member.package()
                || (member.replaces().is_some() && m.replaces() == member.replaces())
        });
        if duplicate {
            return false;
        }
        self.members.push(member);
        true
    }

    pub fn members(&self) -> &[TransactionMember] {
        &self.members
    }

    /// Installed packages this transaction removes
    pub fn replaced(&self) -> HashSet<usize> {
        self.members.iter().filter_map(TransactionMember::replaces).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

/// What staging a single name did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staging {
    Staged(TransactionMember),
    /// Installed and already at the newest available build
    AlreadyLatest,
    /// Named package is already part of the transaction
    AlreadyStaged,
    /// No enabled repository offers this name
    NotFound,
}

/// Exclusive handle on one simulated transaction
pub struct ResolverSession<'a> {
    snapshot: &'a RepositorySnapshot,
    transaction: Transaction,
}

impl<'a> ResolverSession<'a> {
    pub fn open(snapshot: &'a RepositorySnapshot) -> Self {
        debug!(
            "Opening resolver session over {} available and {} installed packages",
            snapshot.available.len(),
            snapshot.installed.len()
        );
        Self {
            snapshot,
            transaction: Transaction::new(),
        }
    }

    pub fn snapshot(&self) -> &'a RepositorySnapshot {
        self.snapshot
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Stage an install or update of the best available build of `name`
    pub fn stage_install(&mut self, name: &str) -> Staging {
        let Some(best) = self.snapshot.best_available(name) else {
            return Staging::NotFound;
        };

        let member = match self.snapshot.newest_installed(name) {
            None => TransactionMember::Install { package: best },
            Some(installed) => {
                if self.snapshot.available[best].evr <= self.snapshot.installed[installed].evr {
                    debug!("{} is already at the newest available version", name);
                    return Staging::AlreadyLatest;
                }
                TransactionMember::Update {
                    installed,
                    package: best,
                }
            }
        };

        if self.transaction.add(member) {
            debug!("Staged {:?} for {}", member, name);
            Staging::Staged(member)
        } else {
            Staging::AlreadyStaged
        }
    }

    /// Stage an update of every installed package that has one
    ///
    /// Packages without a newer build of their own are replaced by an
    /// available package that obsoletes them, if there is one.
    pub fn stage_update_all(&mut self) -> usize {
        let snapshot = self.snapshot;
        let mut staged = 0;

        for (installed, pkg) in snapshot.installed.iter().enumerate() {
            let update = snapshot
                .best_available(&pkg.name)
                .filter(|&best| snapshot.available[best].evr > pkg.evr)
                .map(|package| TransactionMember::Update { installed, package });

            let member = update.or_else(|| {
                snapshot
                    .available
                    .iter()
                    .enumerate()
                    .filter(|(_, candidate)| candidate.name != pkg.name && candidate.obsoletes_package(pkg))
                    .max_by(|(_, a), (_, b)| a.evr.cmp(&b.evr))
                    .map(|(package, _)| TransactionMember::Obsolete { installed, package })
            });

            if let Some(member) = member {
                if self.transaction.add(member) {
                    staged += 1;
                }
            }
        }

        debug!("Staged {} update(s) for installed packages", staged);
        staged
    }

    /// Hand the staged transaction to `solver`
    ///
    /// Solver errors and panics are both reported as `ResolutionCrashed`.
    pub fn build<S: Solver + ?Sized>(&self, solver: &mut S) -> Result<SolverReport> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            solver.build_transaction(self.snapshot, &self.transaction)
        }));

        match outcome {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(Error::ResolutionCrashed(e.to_string())),
            Err(payload) => Err(Error::ResolutionCrashed(panic_message(payload.as_ref()))),
        }
    }
}

impl Drop for ResolverSession<'_> {
    fn drop(&mut self) {
        let discarded = self.transaction.len();
        self.transaction.clear();
        debug!("Discarded uncommitted transaction with {} member(s)", discarded);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "resolver panicked".to_string()
    }
}
