use thiserror::Error;

/// Errors surfaced by the registry API (§7: "IO failure" and "Logical
/// conflict" kinds). Fatal conditions (§7) are not represented here —
/// they abort the process via `panic!`, mirroring the original's
/// `log_fatal` calls on foundational allocation/index corruption.
#[derive(Error, Debug)]
pub enum DbError<E> {
    /// `enter_host` found a distinct, live host already registered under
    /// the requested name.
    #[error("host with this name already exists")]
    Exists,
    /// journal write or commit failed (`write_host`/`write_lease`/
    /// `commit_leases`).
    #[error("journal error")]
    IoError(#[from] E),
    /// the caller asked for an immediate commit without setting `commit`
    /// (`supersede_lease`'s `pimmediate && !commit` contract violation).
    #[error("pimmediate requires commit")]
    ImmediateWithoutCommit,
    /// the candidate lease has no pool reference; `supersede_lease` cannot
    /// place it on a queue.
    #[error("lease {0} has no pool")]
    NoPool(std::net::IpAddr),
}
