//! Ports implemented by the infrastructure layer

mod store;

pub use store::{
    AuditFilter, AuditStore, DEFAULT_PURGE_BATCH, GroupKey, MAX_PAGE_SIZE, PageRequest,
    RepoResult, SortOrder,
};
