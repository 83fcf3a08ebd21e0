//! `PersistenceGateway`: the one injected port the Item Processor blocks on
//! during stage 7 (design §4.6 step 7, §5 "only persistence and observation
//! may block on I/O"). The core computes *what* to write and whether the
//! write is silent; the gateway is responsible for *how*.

use crate::model::{MenuItemRecord, Patch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    SourceDeletePointer,
}

pub trait PersistenceGateway: Send + Sync {
    fn insert(&self, external_id: &str, changes: &Patch) -> Result<(), String>;

    /// `silent` is true when every key in `changes` is in the declared
    /// silent-fields set (design §8 P6) — the gateway is expected to bypass
    /// hooks/callbacks for that path and take the normal one otherwise.
    fn update(&self, external_id: &str, changes: &Patch, silent: bool) -> Result<(), String>;

    fn soft_delete(&self, external_id: &str, reason: DestroyReason) -> Result<(), String>;

    fn find(&self, external_id: &str) -> Result<Option<MenuItemRecord>, String>;
}
