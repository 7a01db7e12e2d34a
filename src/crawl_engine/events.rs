//! Task progress events
//!
//! Published on the session's broadcast channel so observers (progress
//! displays, schedulers) follow a task without being wired into it.

use serde::{Deserialize, Serialize};

use crate::domain::task::CollectionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskEvent {
    TaskStarted {
        task_id: String,
        keyword: String,
        target: u32,
    },
    Progress {
        task_id: String,
        collected: usize,
        target: u32,
    },
    DetailPhaseStarted {
        task_id: String,
        items: usize,
    },
    ItemDegraded {
        task_id: String,
        sku: String,
        reason: String,
    },
    TaskFinished {
        task_id: String,
        status: CollectionStatus,
        merged: usize,
        degraded: usize,
        discarded: usize,
    },
}
