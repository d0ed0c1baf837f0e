pub mod classify;
pub mod lca;
pub mod misp;
pub mod modification;

pub use classify::{classify, Classification, IdenticalLcas};
pub use lca::{Lca, LookupError, Oracle, Resolver, RetryPolicy, UnipeptClient};
pub use modification::{Modifications, PositionCheck};
