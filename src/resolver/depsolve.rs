// src/resolver/depsolve.rs

//! Dependency closure over a staged transaction
//!
//! The resulting package set is the installed set, minus everything the
//! transaction replaces, plus everything it brings in. Each pass checks
//! every requirement of every member; unmet ones pull in a provider (or, for
//! an installed package, its own newest update) until nothing changes. What
//! is still unmet then, plus any conflicts inside the set, is reported.

use super::{CODE_FAILED, CODE_NOTHING_TO_DO, CODE_RESOLVED, Solver, SolverReport, Transaction};
use crate::error::{Error, Result};
use crate::repository::snapshot::{Capability, Package, RepositorySnapshot};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Upper bound on closure passes before giving up
const MAX_PASSES: usize = 256;

/// The built-in solver
#[derive(Debug, Default)]
pub struct DepSolver;

impl Solver for DepSolver {
    fn build_transaction(
        &mut self,
        snapshot: &RepositorySnapshot,
        transaction: &Transaction,
    ) -> Result<SolverReport> {
        if transaction.is_empty() {
            return Ok(SolverReport::new(CODE_NOTHING_TO_DO, Vec::new()));
        }

        let problems = Closure::new(snapshot, transaction).run()?;
        if problems.is_empty() {
            Ok(SolverReport::new(CODE_RESOLVED, Vec::new()))
        } else {
            Ok(SolverReport::new(CODE_FAILED, problems))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Member {
    Installed(usize),
    Available(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Bring in an available package
    Add(usize),
    /// Replace an installed package with an available one
    Replace { installed: usize, by: usize },
}

struct Closure<'a> {
    snapshot: &'a RepositorySnapshot,
    members: Vec<Member>,
    /// Names of the available packages in the set
    selected_names: HashSet<&'a str>,
    /// Installed packages already given a chance to update themselves
    attempted_updates: HashSet<usize>,
    /// Capability name to the available packages providing it
    available_index: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Closure<'a> {
    fn new(snapshot: &'a RepositorySnapshot, transaction: &Transaction) -> Self {
        let replaced = transaction.replaced();

        let mut members: Vec<Member> = (0..snapshot.installed.len())
            .filter(|i| !replaced.contains(i))
            .map(Member::Installed)
            .collect();
        let mut selected_names = HashSet::new();
        for member in transaction.members() {
            let package = member.package();
            members.push(Member::Available(package));
            selected_names.insert(snapshot.available[package].name.as_str());
        }

        let mut available_index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, pkg) in snapshot.available.iter().enumerate() {
            available_index.entry(pkg.name.as_str()).or_default().push(i);
            for provide in &pkg.provides {
                let providers = available_index.entry(provide.name.as_str()).or_default();
                if !providers.contains(&i) {
                    providers.push(i);
                }
            }
        }

        Self {
            snapshot,
            members,
            selected_names,
            attempted_updates: replaced,
            available_index,
        }
    }

    fn package(&self, member: Member) -> &'a Package {
        match member {
            Member::Installed(i) => &self.snapshot.installed[i],
            Member::Available(i) => &self.snapshot.available[i],
        }
    }

    fn describe(&self, member: Member) -> String {
        let pkg = self.package(member);
        format!("{} ({})", pkg.nevra(), pkg.origin)
    }

    /// Capability name to the members providing it
    fn member_index(&self) -> HashMap<&'a str, Vec<Member>> {
        let mut index: HashMap<&str, Vec<Member>> = HashMap::new();
        for &member in &self.members {
            let pkg = self.package(member);
            index.entry(pkg.name.as_str()).or_default().push(member);
            for provide in &pkg.provides {
                index.entry(provide.name.as_str()).or_default().push(member);
            }
        }
        index
    }

    fn run(mut self) -> Result<Vec<String>> {
        for pass in 1..=MAX_PASSES {
            let index = self.member_index();
            let mut changes: Vec<Change> = Vec::new();
            let mut problems = Vec::new();

            for &member in &self.members {
                for requirement in &self.package(member).requires {
                    let satisfied = index.get(requirement.name.as_str()).is_some_and(|providers| {
                        providers.iter().any(|&p| self.package(p).provides_capability(requirement))
                    });
                    if satisfied {
                        continue;
                    }

                    match self.fix_for(member, requirement) {
                        Some(change) => {
                            if !changes.contains(&change) {
                                changes.push(change);
                            }
                        }
                        None => problems.push(format!(
                            "Package: {} requires {}",
                            self.describe(member),
                            requirement
                        )),
                    }
                }
            }

            if changes.is_empty() {
                problems.extend(self.conflicts(&index));
                dedup_in_order(&mut problems);
                debug!("Dependency closure settled after {} pass(es)", pass);
                return Ok(problems);
            }

            for change in changes {
                self.apply(change);
            }
        }

        Err(Error::Resolver(format!(
            "Dependency closure did not settle after {} passes",
            MAX_PASSES
        )))
    }

    /// Find a change that would satisfy `requirement` of `member`
    fn fix_for(&self, member: Member, requirement: &Capability) -> Option<Change> {
        let candidates = self.available_index.get(requirement.name.as_str());

        let provider = candidates.and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .filter(|&i| {
                    let pkg = &self.snapshot.available[i];
                    !self.selected_names.contains(pkg.name.as_str())
                        && pkg.provides_capability(requirement)
                        && self.snapshot.newest_installed(&pkg.name).is_none_or(|installed| {
                            pkg.evr > self.snapshot.installed[installed].evr
                        })
                })
                .max_by(|&a, &b| {
                    let (pa, pb) = (&self.snapshot.available[a], &self.snapshot.available[b]);
                    (pa.name == requirement.name)
                        .cmp(&(pb.name == requirement.name))
                        .then_with(|| pa.evr.cmp(&pb.evr))
                })
        });

        if let Some(by) = provider {
            let name = self.snapshot.available[by].name.as_str();
            return Some(match self.installed_member_named(name) {
                Some(installed) => Change::Replace { installed, by },
                None => Change::Add(by),
            });
        }

        // An installed package may still be fixed by its own update
        let Member::Installed(installed) = member else {
            return None;
        };
        if self.attempted_updates.contains(&installed) {
            return None;
        }
        let pkg = &self.snapshot.installed[installed];
        self.snapshot
            .best_available(&pkg.name)
            .filter(|&best| {
                self.snapshot.available[best].evr > pkg.evr
                    && !self.selected_names.contains(pkg.name.as_str())
            })
            .map(|by| Change::Replace { installed, by })
    }

    fn installed_member_named(&self, name: &str) -> Option<usize> {
        self.members.iter().find_map(|&m| match m {
            Member::Installed(i) if self.snapshot.installed[i].name == name => Some(i),
            _ => None,
        })
    }

    fn apply(&mut self, change: Change) {
        let (removed, added) = match change {
            Change::Add(by) => (None, by),
            Change::Replace { installed, by } => (Some(installed), by),
        };

        let added_pkg = &self.snapshot.available[added];
        if !self.selected_names.insert(added_pkg.name.as_str()) {
            // Another change this pass already brought in this name
            return;
        }

        if let Some(installed) = removed {
            self.attempted_updates.insert(installed);
            self.members.retain(|&m| m != Member::Installed(installed));
        }
        debug!("Pulling in {}", added_pkg.nevra());
        self.members.push(Member::Available(added));
    }

    fn conflicts(&self, index: &HashMap<&'a str, Vec<Member>>) -> Vec<String> {
        let mut problems = Vec::new();
        for &member in &self.members {
            let pkg = self.package(member);
            for conflict in &pkg.conflicts {
                let Some(providers) = index.get(conflict.name.as_str()) else {
                    continue;
                };
                for &other in providers {
                    let other_pkg = self.package(other);
                    if other == member || other_pkg.name == pkg.name {
                        continue;
                    }
                    if other_pkg.provides_capability(conflict) {
                        problems.push(format!(
                            "Package: {} conflicts with {} provided by {}",
                            self.describe(member),
                            conflict,
                            other_pkg.nevra()
                        ));
                    }
                }
            }
        }
        problems
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::parsers::{PackageMetadata, Relation, RelationKind};
    use crate::repository::snapshot::Origin;
    use crate::resolver::{ResolverSession, TransactionOutcome, simulate};

    fn available(name: &str, version: &str, relations: &[(RelationKind, &str, Option<&str>)]) -> Package {
        let mut pkg = Package::from_metadata(&PackageMetadata::new(name, version, "1"), "base").unwrap();
        for (kind, cap, constraint) in relations {
            pkg = pkg.with_relation(&Relation::new(*kind, cap, *constraint)).unwrap();
        }
        pkg
    }

    fn installed(name: &str, version: &str, relations: &[(RelationKind, &str, Option<&str>)]) -> Package {
        let mut pkg = available(name, version, relations);
        pkg.origin = Origin::Installed;
        pkg
    }

    fn requested(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    use RelationKind::{Conflicts, Provides, Requires};

    #[test]
    fn test_empty_transaction_is_nothing_to_do() {
        let snapshot = RepositorySnapshot::default();
        let report = DepSolver.build_transaction(&snapshot, &Transaction::new()).unwrap();
        assert_eq!(report.code, CODE_NOTHING_TO_DO);
    }

    #[test]
    fn test_requirements_pull_in_providers() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![
                available("atomic-openshift-node", "3.3.0.1", &[(Requires, "docker", Some(">= 1.10"))]),
                available("docker", "1.9.1", &[]),
                available("docker", "1.10.3", &[(Requires, "container-selinux", None)]),
                available("container-selinux", "2.0", &[]),
            ],
            Vec::new(),
        );

        assert_eq!(simulate(&snapshot, &requested(&["atomic-openshift-node"])).unwrap(), TransactionOutcome::Resolved);
    }

    #[test]
    fn test_virtual_provides_satisfy_requirements() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![
                available("tuned-profiles", "1.0", &[(Requires, "tuned", None)]),
                available("tuned-ng", "2.0", &[(Provides, "tuned", Some("= 2.0"))]),
            ],
            Vec::new(),
        );

        assert_eq!(simulate(&snapshot, &requested(&["tuned-profiles"])).unwrap(), TransactionOutcome::Resolved);
    }

    #[test]
    fn test_missing_requirement_is_reported() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("atomic-openshift-node", "3.3.0.1", &[(Requires, "docker", Some(">= 1.10"))])],
            Vec::new(),
        );

        let outcome = simulate(&snapshot, &requested(&["atomic-openshift-node"])).unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Unresolved(vec![
                "Package: atomic-openshift-node-3.3.0.1-1.x86_64 (base) requires docker >= 1.10".to_string()
            ])
        );
    }

    #[test]
    fn test_installed_dependents_follow_their_dependency() {
        // Updating foo breaks foo-libs unless foo-libs updates too
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![
                available("foo", "2.0", &[]),
                available("foo-libs", "2.0", &[(Requires, "foo", Some("= 2.0"))]),
            ],
            vec![
                installed("foo", "1.0", &[]),
                installed("foo-libs", "1.0", &[(Requires, "foo", Some("= 1.0"))]),
            ],
        );

        assert_eq!(simulate(&snapshot, &requested(&["foo"])).unwrap(), TransactionOutcome::Resolved);
    }

    #[test]
    fn test_installed_dependent_without_update_fails() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("foo", "2.0", &[])],
            vec![
                installed("foo", "1.0", &[]),
                installed("foo-libs", "1.0", &[(Requires, "foo", Some("= 1.0"))]),
            ],
        );

        match simulate(&snapshot, &requested(&["foo"])).unwrap() {
            TransactionOutcome::Unresolved(messages) => {
                assert_eq!(messages, vec!["Package: foo-libs-1.0-1.x86_64 (@installed) requires foo = 1.0".to_string()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_conflicts_are_reported() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("origin-node", "1.3", &[(Conflicts, "atomic-openshift-node", None)])],
            vec![installed("atomic-openshift-node", "3.3.0.1", &[])],
        );

        let outcome = simulate(&snapshot, &requested(&["origin-node"])).unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Unresolved(vec![
                "Package: origin-node-1.3-1.x86_64 (base) conflicts with atomic-openshift-node provided by \
                 atomic-openshift-node-3.3.0.1-1.x86_64"
                    .to_string()
            ])
        );
    }

    #[test]
    fn test_update_all_resolves() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("docker", "1.10.3", &[])],
            vec![installed("docker", "1.9.1", &[]), installed("bash", "4.2", &[])],
        );

        assert_eq!(simulate(&snapshot, &[]).unwrap(), TransactionOutcome::Resolved);

        // Nothing newer anywhere: nothing to do
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("docker", "1.9.1", &[])],
            vec![installed("docker", "1.9.1", &[])],
        );
        assert_eq!(simulate(&snapshot, &[]).unwrap(), TransactionOutcome::NoOp);
    }

    #[test]
    fn test_session_transaction_reaches_solver() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![available("a", "1.0", &[])],
            Vec::new(),
        );
        let mut session = ResolverSession::open(&snapshot);
        session.stage_install("a");

        let report = session.build(&mut DepSolver).unwrap();
        assert_eq!(report, SolverReport::new(CODE_RESOLVED, Vec::new()));
    }
}
