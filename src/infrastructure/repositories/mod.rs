//! Repository implementations backed by PostgreSQL.

mod membership_repository;
mod telephony_repository;

pub use membership_repository::PgScopeAuthorizer;
pub use telephony_repository::PgTelephonyRepository;
