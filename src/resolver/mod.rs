// src/resolver/mod.rs

//! Transaction resolution simulation
//!
//! Stages the requested installs/updates (or an update of everything
//! installed), lets a [`Solver`] build the transaction, and classifies the
//! solver's result code. Nothing is ever installed.

pub mod depsolve;
pub mod transaction;

pub use depsolve::DepSolver;
pub use transaction::{ResolverSession, Staging, Transaction, TransactionMember};

use crate::error::{Error, Result};
use crate::repository::snapshot::RepositorySnapshot;
use tracing::{debug, info};

/// Result code: there was nothing to do
pub const CODE_NOTHING_TO_DO: i32 = 0;

/// Result code: the transaction has unresolved problems
pub const CODE_FAILED: i32 = 1;

/// Result code: the transaction resolved cleanly
pub const CODE_RESOLVED: i32 = 2;

/// Builds the dependency closure of a staged transaction
pub trait Solver {
    /// Resolve `transaction` against `snapshot`
    ///
    /// `Err` means the solver itself failed, which is different from a
    /// transaction that cannot be resolved.
    fn build_transaction(
        &mut self,
        snapshot: &RepositorySnapshot,
        transaction: &Transaction,
    ) -> Result<SolverReport>;
}

/// Raw solver output: a result code plus its diagnostics, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverReport {
    pub code: i32,
    pub messages: Vec<String>,
}

impl SolverReport {
    pub fn new(code: i32, messages: Vec<String>) -> Self {
        Self { code, messages }
    }
}

/// Classified solver result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveCode {
    NothingToDo,
    Failed,
    Resolved,
    Unknown(i32),
}

impl From<i32> for ResolveCode {
    fn from(code: i32) -> Self {
        match code {
            CODE_NOTHING_TO_DO => ResolveCode::NothingToDo,
            CODE_FAILED => ResolveCode::Failed,
            CODE_RESOLVED => ResolveCode::Resolved,
            other => ResolveCode::Unknown(other),
        }
    }
}

/// Outcome of a simulated transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    NoOp,
    Resolved,
    /// Diagnostics in the order the solver produced them
    Unresolved(Vec<String>),
}

impl TransactionOutcome {
    /// Treat an unresolved transaction as a failure
    pub fn into_result(self) -> Result<()> {
        match self {
            TransactionOutcome::Unresolved(messages) => Err(Error::Unresolved(messages)),
            TransactionOutcome::NoOp | TransactionOutcome::Resolved => Ok(()),
        }
    }
}

/// Simulate the transaction for `requested` with the default solver
pub fn simulate(snapshot: &RepositorySnapshot, requested: &[String]) -> Result<TransactionOutcome> {
    simulate_with(snapshot, requested, &mut DepSolver::default())
}

/// Simulate the transaction for `requested` with `solver`
///
/// An empty request updates every installed package. Every requested name
/// is staged before unavailable ones are reported together.
pub fn simulate_with<S: Solver + ?Sized>(
    snapshot: &RepositorySnapshot,
    requested: &[String],
    solver: &mut S,
) -> Result<TransactionOutcome> {
    let mut session = ResolverSession::open(snapshot);

    if requested.is_empty() {
        session.stage_update_all();
    } else {
        let mut no_such_package = Vec::new();
        for name in requested {
            if session.stage_install(name) == Staging::NotFound {
                no_such_package.push(name.clone());
            }
        }
        if !no_such_package.is_empty() {
            return Err(Error::PackagesUnavailable(no_such_package));
        }
    }

    let report = session.build(solver)?;
    debug!("Solver returned code {} with {} message(s)", report.code, report.messages.len());

    match ResolveCode::from(report.code) {
        ResolveCode::NothingToDo => {
            info!("Nothing to do");
            Ok(TransactionOutcome::NoOp)
        }
        ResolveCode::Resolved => {
            info!("Transaction resolved with {} member(s)", session.transaction().len());
            Ok(TransactionOutcome::Resolved)
        }
        ResolveCode::Failed => Ok(TransactionOutcome::Unresolved(report.messages)),
        ResolveCode::Unknown(code) => Err(Error::UnknownResolutionError {
            code,
            messages: report.messages,
        }),
    }
}
