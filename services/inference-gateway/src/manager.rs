//! Model lifecycle manager: owns the active model slot and the model audit trail.
//!
//! The slot holds an immutable `(record, predictor)` pair behind an
//! [`ArcSwapOption`]; a load swaps the whole pair, so a reader never pairs an
//! id from one generation with a predictor from another. Loads are serialized
//! by the issued-id lock so audit order matches swap order.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::now_stamp;
use crate::error::{CoreError, CoreResult};
use crate::runtime::{ModelRuntime, Predictor};
use crate::store::{Collection, StoreError};

/// Length of generated model ids.
pub const MODEL_ID_LEN: usize = 8;
const MAX_ID_ATTEMPTS: usize = 32;

/// Audit entry for one successful load. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub load_time: String,
    pub kind: String,
    pub artifact_sha256: String,
}

/// The model currently serving inference, together with its identity.
#[derive(Clone)]
pub struct ActiveModel {
    pub record: ModelRecord,
    pub predictor: Arc<dyn Predictor>,
}

impl std::fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveModel").field("record", &self.record).finish_non_exhaustive()
    }
}

pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random fixed-length alphanumeric ids.
#[derive(Debug, Clone, Copy)]
pub struct RandomIds {
    len: usize,
}

impl RandomIds {
    pub fn new(len: usize) -> Self { Self { len } }
}

impl Default for RandomIds {
    fn default() -> Self { Self::new(MODEL_ID_LEN) }
}

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        rand::thread_rng().sample_iter(&Alphanumeric).take(self.len).map(char::from).collect()
    }
}

/// Hands out a fixed list of ids, then falls back to random ones.
#[derive(Debug, Default)]
pub struct SequenceIds {
    queue: Mutex<VecDeque<String>>,
    fallback: RandomIds,
}

impl SequenceIds {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { queue: Mutex::new(ids.into_iter().map(Into::into).collect()), fallback: RandomIds::default() }
    }
}

impl IdSource for SequenceIds {
    fn next_id(&self) -> String {
        self.queue.lock().pop_front().unwrap_or_else(|| self.fallback.next_id())
    }
}

pub struct ModelManager {
    runtime: Arc<dyn ModelRuntime>,
    ids: Box<dyn IdSource>,
    slot: ArcSwapOption<ActiveModel>,
    audit: Collection<ModelRecord>,
    issued: Mutex<HashSet<String>>,
}

impl ModelManager {
    /// Ids already present in `audit` (a reopened persistent store) are reserved.
    pub fn new(runtime: Arc<dyn ModelRuntime>, audit: Collection<ModelRecord>) -> Result<Self, StoreError> {
        let issued = audit.scan()?.into_iter().map(|r| r.model_id).collect::<HashSet<_>>();
        if !issued.is_empty() { info!(reserved_ids = issued.len(), "restored model audit trail"); }
        Ok(Self { runtime, ids: Box::new(RandomIds::default()), slot: ArcSwapOption::empty(), audit, issued: Mutex::new(issued) })
    }

    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Deserialize `artifact`, record it in the audit trail and make it the active model.
    ///
    /// On any failure the active slot is left as it was.
    pub fn load_model(&self, artifact: &[u8]) -> CoreResult<ModelRecord> {
        let predictor = self.runtime.deserialize(artifact).map_err(|e| {
            warn!(error = %e, bytes = artifact.len(), "model artifact rejected");
            CoreError::ModelLoad(e.to_string())
        })?;

        let mut issued = self.issued.lock();
        let model_id = Self::fresh_id(self.ids.as_ref(), &issued)?;
        let record = ModelRecord {
            model_id,
            load_time: now_stamp(),
            kind: predictor.kind().to_string(),
            artifact_sha256: hex::encode(Sha256::digest(artifact)),
        };
        self.audit.append(&record)?;
        issued.insert(record.model_id.clone());
        self.slot.store(Some(Arc::new(ActiveModel { record: record.clone(), predictor })));
        info!(model_id = %record.model_id, kind = %record.kind, sha256 = %record.artifact_sha256, "model loaded");
        Ok(record)
    }

    fn fresh_id(ids: &dyn IdSource, issued: &HashSet<String>) -> CoreResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = ids.next_id();
            if !issued.contains(&id) { return Ok(id); }
            debug!(model_id = %id, "model id collision, redrawing");
        }
        Err(CoreError::ModelLoad("could not allocate a unique model id".into()))
    }

    /// The active `(record, predictor)` pair.
    pub fn get_active_model(&self) -> CoreResult<Arc<ActiveModel>> {
        self.slot.load_full().ok_or(CoreError::NoModelLoaded)
    }

    pub fn current_model_id(&self) -> Option<String> {
        self.slot.load_full().map(|m| m.record.model_id.clone())
    }

    pub fn active_record(&self) -> Option<ModelRecord> {
        self.slot.load_full().map(|m| m.record.clone())
    }

    /// Every successful load, oldest first.
    pub fn audit_trail(&self) -> Result<Vec<ModelRecord>, StoreError> {
        self.audit.scan()
    }
}
