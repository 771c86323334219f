//! File-backed staging store: one JSON file per session.
//!
//! Writers serialize through an advisory `.lock` file per session and
//! publish with a tmp-file + atomic rename, so readers always see a
//! consistent snapshot.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lattice_core::api_types::CommitItemResult;
use lattice_core::{
    ChunkExtractionError, Document, GraphStore, ItemEdit, ItemKind, ItemPayload, ItemStatus,
    LatticeError, Result, SessionStatistics, SessionStatus, StagingItem, StagingSession,
};

/// How long a writer waits for the advisory lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(2);
const LOCK_POLL: Duration = Duration::from_millis(25);

/// On-disk layout of `{session_id}.json`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    session_id: Uuid,
    document_id: Uuid,
    document_title: String,
    document_source: String,
    created_at: chrono::DateTime<Utc>,
    status: SessionStatus,
    entities: Vec<StagingItem>,
    relationships: Vec<StagingItem>,
    statistics: SessionStatistics,
    metadata: serde_json::Value,
}

impl SessionFile {
    fn extraction_error_count(&self) -> usize {
        self.metadata
            .get("extraction_errors")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }

    fn recompute_statistics(&mut self) {
        let items: Vec<StagingItem> = self
            .entities
            .iter()
            .chain(self.relationships.iter())
            .cloned()
            .collect();
        self.statistics = SessionStatistics::compute(&items, self.extraction_error_count());
    }

    fn all_items_mut(&mut self) -> impl Iterator<Item = &mut StagingItem> {
        self.entities.iter_mut().chain(self.relationships.iter_mut())
    }

    fn summary(&self) -> StagingSession {
        StagingSession {
            id: self.session_id,
            document_id: self.document_id,
            document_title: self.document_title.clone(),
            document_source: self.document_source.clone(),
            created_at: self.created_at,
            status: self.status,
            statistics: self.statistics,
            metadata: self.metadata.clone(),
        }
    }
}

/// RAII guard for the per-session advisory lock file.
struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let deadline = std::time::Instant::now() + LOCK_WAIT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if std::time::Instant::now() >= deadline {
                        return Err(LatticeError::Conflict(format!(
                            "session is locked by another writer ({})",
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

#[derive(Clone)]
pub struct FileStagingStore {
    data_dir: PathBuf,
}

impl FileStagingStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Run a synchronous store operation on the blocking pool. Lock
    /// acquisition polls with thread sleeps, so callers on the async
    /// runtime must not run it inline.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(FileStagingStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| LatticeError::Internal(format!("staging task failed: {e}")))?
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    fn lock_path(&self, id: Uuid) -> PathBuf {
        self.data_dir.join(format!("{id}.lock"))
    }

    fn load(&self, id: Uuid) -> Result<SessionFile> {
        let path = self.session_path(id);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LatticeError::NotFound(format!("session {id}"))
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write via tmp file + rename so readers never observe a torn file.
    fn persist(&self, file: &SessionFile) -> Result<()> {
        let path = self.session_path(file.session_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(file)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load-mutate-persist under the session lock.
    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionFile) -> Result<T>,
    ) -> Result<T> {
        let _lock = SessionLock::acquire(self.lock_path(id))?;
        let mut file = self.load(id)?;
        let out = f(&mut file)?;
        file.recompute_statistics();
        self.persist(&file)?;
        Ok(out)
    }

    pub fn create_session(
        &self,
        document: &Document,
        extraction_errors: &[ChunkExtractionError],
    ) -> Result<StagingSession> {
        let mut file = SessionFile {
            session_id: Uuid::new_v4(),
            document_id: document.id,
            document_title: document.title.clone(),
            document_source: document.source.clone(),
            created_at: Utc::now(),
            status: SessionStatus::PendingReview,
            entities: Vec::new(),
            relationships: Vec::new(),
            statistics: SessionStatistics::default(),
            metadata: serde_json::json!({
                "extraction_errors": extraction_errors,
            }),
        };
        file.recompute_statistics();
        self.persist(&file)?;
        tracing::info!(session_id = %file.session_id, title = %file.document_title, "Created staging session");
        Ok(file.summary())
    }

    pub fn add_items(&self, session_id: Uuid, items: Vec<StagingItem>) -> Result<()> {
        self.with_session(session_id, |file| {
            if file.status != SessionStatus::PendingReview {
                return Err(LatticeError::Conflict(format!(
                    "cannot add items to a session in state {:?}",
                    file.status
                )));
            }
            for item in items {
                match item.kind {
                    ItemKind::Entity => file.entities.push(item),
                    ItemKind::Relationship => file.relationships.push(item),
                }
            }
            Ok(())
        })
    }

    pub fn get_session(&self, id: Uuid) -> Result<StagingSession> {
        Ok(self.load(id)?.summary())
    }

    pub fn list_sessions(&self) -> Result<Vec<StagingSession>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            match self.load(id) {
                Ok(file) => sessions.push(file.summary()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub fn list_items(
        &self,
        session_id: Uuid,
        status: Option<ItemStatus>,
        kind: Option<ItemKind>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<(Vec<StagingItem>, usize)> {
        let file = self.load(session_id)?;
        let filtered: Vec<StagingItem> = file
            .entities
            .iter()
            .chain(file.relationships.iter())
            .filter(|i| status.is_none_or(|s| i.status == s))
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .cloned()
            .collect();
        let total = filtered.len();
        let offset = offset.unwrap_or(0);
        let page: Vec<StagingItem> = filtered
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    /// Locate an item across all sessions. The HTTP surface addresses items
    /// by id alone.
    pub fn find_item(&self, item_id: Uuid) -> Result<(Uuid, StagingItem)> {
        for session in self.list_sessions()? {
            let file = self.load(session.id)?;
            if let Some(item) = file
                .entities
                .iter()
                .chain(file.relationships.iter())
                .find(|i| i.id == item_id)
            {
                return Ok((session.id, item.clone()));
            }
        }
        Err(LatticeError::NotFound(format!("staging item {item_id}")))
    }

    /// Apply reviewer edits to a pending item's payload. The patch is a
    /// shallow JSON object merge; the payload's kind cannot change.
    pub fn update_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        patch: serde_json::Value,
    ) -> Result<StagingItem> {
        let Some(patch_map) = patch.as_object().cloned() else {
            return Err(LatticeError::Validation("edits must be a JSON object".into()));
        };
        self.with_session(session_id, |file| {
            let item = file
                .all_items_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| LatticeError::NotFound(format!("staging item {item_id}")))?;
            if item.status != ItemStatus::Pending {
                return Err(LatticeError::Conflict(format!(
                    "item {item_id} is {:?}; only pending items can be edited",
                    item.status
                )));
            }

            let mut payload_json = serde_json::to_value(&item.payload)?;
            let Some(obj) = payload_json.as_object_mut() else {
                return Err(LatticeError::Internal("payload is not an object".into()));
            };
            for (key, value) in &patch_map {
                if key == "type" || key == "kind" {
                    return Err(LatticeError::Validation(format!(
                        "field '{key}' cannot be edited"
                    )));
                }
                obj.insert(key.clone(), value.clone());
            }
            let new_payload: ItemPayload = serde_json::from_value(payload_json)
                .map_err(|e| LatticeError::Validation(format!("edits produce an invalid payload: {e}")))?;

            item.payload = new_payload;
            item.edited = true;
            item.edits.push(ItemEdit {
                at: Utc::now(),
                patch: serde_json::Value::Object(patch_map.clone()),
            });
            Ok(item.clone())
        })
    }

    /// Transition items to approved/rejected/pending. Validates every
    /// transition before applying any, so an illegal one changes nothing.
    pub fn transition(
        &self,
        session_id: Uuid,
        item_ids: &[Uuid],
        to: ItemStatus,
    ) -> Result<usize> {
        self.with_session(session_id, |file| {
            if file.status != SessionStatus::PendingReview
                && file.status != SessionStatus::Committed
            {
                return Err(LatticeError::Conflict(format!(
                    "session is {:?}; items cannot transition",
                    file.status
                )));
            }
            for id in item_ids {
                let item = file
                    .entities
                    .iter()
                    .chain(file.relationships.iter())
                    .find(|i| i.id == *id)
                    .ok_or_else(|| LatticeError::NotFound(format!("staging item {id}")))?;
                if !item.can_transition(to) {
                    return Err(LatticeError::Conflict(format!(
                        "item {id} cannot transition {:?} -> {:?}",
                        item.status, to
                    )));
                }
            }
            let now = Utc::now();
            let mut affected = 0;
            for item in file.all_items_mut() {
                if item_ids.contains(&item.id) && item.status != to {
                    item.status = to;
                    item.decided_at = match to {
                        ItemStatus::Pending => None,
                        _ => Some(now),
                    };
                    affected += 1;
                }
            }
            Ok(affected)
        })
    }

    pub fn bulk_approve_all(&self, session_id: Uuid) -> Result<(usize, SessionStatistics)> {
        self.bulk_transition(session_id, ItemStatus::Pending, ItemStatus::Approved)
    }

    pub fn bulk_reject_pending(&self, session_id: Uuid) -> Result<(usize, SessionStatistics)> {
        self.bulk_transition(session_id, ItemStatus::Pending, ItemStatus::Rejected)
    }

    fn bulk_transition(
        &self,
        session_id: Uuid,
        from: ItemStatus,
        to: ItemStatus,
    ) -> Result<(usize, SessionStatistics)> {
        self.with_session(session_id, |file| {
            if file.status != SessionStatus::PendingReview {
                return Err(LatticeError::Conflict(format!(
                    "session is {:?}; bulk transitions require pending_review",
                    file.status
                )));
            }
            let now = Utc::now();
            let mut affected = 0;
            for item in file.all_items_mut() {
                if item.status == from {
                    item.status = to;
                    item.decided_at = Some(now);
                    affected += 1;
                }
            }
            file.recompute_statistics();
            Ok((affected, file.statistics))
        })
    }

    /// Commit approved items to the graph. Atomic per item: a failed item
    /// records its error and the commit continues; prior successes stand.
    pub async fn commit(
        &self,
        session_id: Uuid,
        graph: &dyn GraphStore,
    ) -> Result<(SessionStatus, Vec<CommitItemResult>, SessionStatistics)> {
        // Mark committing first so concurrent readers see the phase.
        self.run_blocking(move |s| s.mark_committing(session_id))
            .await?;

        let file = self.run_blocking(move |s| s.load(session_id)).await?;
        let mut results = Vec::new();

        // Entities first so relationship endpoints usually exist; the graph
        // writer still tolerates missing ones with placeholders.
        let approved = file
            .entities
            .iter()
            .chain(file.relationships.iter())
            .filter(|i| i.status == ItemStatus::Approved);

        for item in approved {
            let outcome = match &item.payload {
                ItemPayload::Entity(entity) => graph.merge_entity(entity).await,
                ItemPayload::Relationship(edge) => graph.merge_edge(edge).await,
            };
            match outcome {
                Ok(()) => results.push(CommitItemResult {
                    item_id: item.id,
                    ok: true,
                    error: None,
                }),
                Err(e) => {
                    tracing::error!(item_id = %item.id, error = %e, "Staging item failed to commit");
                    results.push(CommitItemResult {
                        item_id: item.id,
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let recorded = results.clone();
        let stats = self
            .run_blocking(move |s| s.record_commit_results(session_id, recorded))
            .await?;

        tracing::info!(
            session_id = %session_id,
            committed = results.iter().filter(|r| r.ok).count(),
            failed = results.iter().filter(|r| !r.ok).count(),
            "Session commit finished"
        );
        Ok((SessionStatus::Committed, results, stats))
    }

    fn mark_committing(&self, session_id: Uuid) -> Result<()> {
        let _lock = SessionLock::acquire(self.lock_path(session_id))?;
        let mut file = self.load(session_id)?;
        match file.status {
            SessionStatus::PendingReview | SessionStatus::Committed => {}
            other => {
                return Err(LatticeError::Conflict(format!(
                    "session is {other:?}; commit requires pending_review"
                )))
            }
        }
        file.status = SessionStatus::Committing;
        self.persist(&file)
    }

    fn record_commit_results(
        &self,
        session_id: Uuid,
        results: Vec<CommitItemResult>,
    ) -> Result<SessionStatistics> {
        self.with_session(session_id, |file| {
            for result in &results {
                if let Some(item) = file.all_items_mut().find(|i| i.id == result.item_id) {
                    item.commit_error = result.error.clone();
                }
            }
            file.status = SessionStatus::Committed;
            file.recompute_statistics();
            Ok(file.statistics)
        })
    }

    pub fn discard(&self, session_id: Uuid) -> Result<()> {
        self.with_session(session_id, |file| {
            if file.status == SessionStatus::Committing {
                return Err(LatticeError::Conflict(
                    "session is committing and cannot be discarded".into(),
                ));
            }
            file.status = SessionStatus::Discarded;
            Ok(())
        })
    }
}

impl std::fmt::Debug for FileStagingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStagingStore")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattice_core::{
        CompanyEntity, EdgeKind, EntityKind, ExtractedEntity, FactRecord, GraphQuery,
        Neighborhood, NodeRecord, PersonEntity, TypedEdge,
    };
    use std::sync::Mutex;

    /// In-memory GraphStore double recording merges; optionally fails
    /// every merge to exercise per-item error isolation.
    #[derive(Default)]
    struct FakeGraph {
        merged_entities: Mutex<Vec<String>>,
        merged_edges: Mutex<Vec<String>>,
        fail_edges: bool,
    }

    #[async_trait]
    impl GraphStore for FakeGraph {
        async fn merge_entity(&self, entity: &ExtractedEntity) -> lattice_core::Result<()> {
            self.merged_entities
                .lock()
                .unwrap()
                .push(entity.name().to_string());
            Ok(())
        }

        async fn merge_edge(&self, edge: &TypedEdge) -> lattice_core::Result<()> {
            if self.fail_edges {
                return Err(LatticeError::Commit("edge rejected".into()));
            }
            self.merged_edges.lock().unwrap().push(edge.fact_text.clone());
            Ok(())
        }

        async fn search_facts(&self, _: &str, _: usize) -> lattice_core::Result<Vec<FactRecord>> {
            Ok(Vec::new())
        }
        async fn search_entities(&self, _: &str, _: usize) -> lattice_core::Result<Vec<NodeRecord>> {
            Ok(Vec::new())
        }
        async fn entity_relationships(&self, name: &str, _: u8) -> lattice_core::Result<Neighborhood> {
            Err(LatticeError::NotFound(name.to_string()))
        }
        async fn execute_cypher(&self, _: &GraphQuery) -> lattice_core::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn node_count(&self) -> lattice_core::Result<u64> {
            Ok(0)
        }
        async fn edge_count(&self) -> lattice_core::Result<u64> {
            Ok(0)
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    fn store() -> (tempfile::TempDir, FileStagingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStagingStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn person_item(name: &str) -> StagingItem {
        StagingItem::new(
            ItemPayload::Entity(ExtractedEntity::Person(PersonEntity {
                name: name.into(),
                position: Some("CEO".into()),
                ..Default::default()
            })),
            0.9,
            false,
        )
    }

    fn edge_item() -> StagingItem {
        StagingItem::new(
            ItemPayload::Relationship(TypedEdge {
                kind: EdgeKind::Leadership,
                source_name: "John Smith".into(),
                source_kind: EntityKind::Person,
                target_name: "TechCorp Inc.".into(),
                target_kind: EntityKind::Company,
                attributes: serde_json::json!({"position": "CEO"}),
                confidence: 0.9,
                valid_at: None,
                invalid_at: None,
                fact_text: "John Smith is the CEO of TechCorp Inc.".into(),
                source_chunk_ids: vec![0],
            }),
            0.9,
            false,
        )
    }

    fn seeded_session(store: &FileStagingStore) -> StagingSession {
        let doc = Document::new("Quarterly brief".into(), "upload".into());
        let session = store.create_session(&doc, &[]).unwrap();
        store
            .add_items(
                session.id,
                vec![
                    person_item("John Smith"),
                    StagingItem::new(
                        ItemPayload::Entity(ExtractedEntity::Company(CompanyEntity {
                            name: "TechCorp Inc.".into(),
                            founded_year: Some(2020),
                            ..Default::default()
                        })),
                        0.9,
                        false,
                    ),
                    edge_item(),
                ],
            )
            .unwrap();
        store.get_session(session.id).unwrap()
    }

    #[test]
    fn create_and_reload_round_trips() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        assert_eq!(session.status, SessionStatus::PendingReview);
        assert_eq!(session.statistics.entities.total, 2);
        assert_eq!(session.statistics.relationships.total, 1);

        // Export -> import -> export is stable.
        let first = serde_json::to_value(store.load(session.id).unwrap()).unwrap();
        let reparsed: SessionFile = serde_json::from_value(first.clone()).unwrap();
        let second = serde_json::to_value(&reparsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn list_items_filters_and_paginates() {
        let (_dir, store) = store();
        let session = seeded_session(&store);

        let (entities, total) = store
            .list_items(session.id, None, Some(ItemKind::Entity), None, None)
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(entities.len(), 2);

        let (page, total) = store
            .list_items(session.id, None, None, Some(1), Some(1))
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);

        let (pending, _) = store
            .list_items(session.id, Some(ItemStatus::Pending), None, None, None)
            .unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn edits_only_while_pending_and_keep_history() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let (items, _) = store
            .list_items(session.id, None, Some(ItemKind::Entity), None, None)
            .unwrap();
        let item_id = items[0].id;

        let updated = store
            .update_item(session.id, item_id, serde_json::json!({"position": "Chairman"}))
            .unwrap();
        assert!(updated.edited);
        assert_eq!(updated.edits.len(), 1);
        let ItemPayload::Entity(ExtractedEntity::Person(p)) = &updated.payload else {
            panic!()
        };
        assert_eq!(p.position.as_deref(), Some("Chairman"));

        store
            .transition(session.id, &[item_id], ItemStatus::Approved)
            .unwrap();
        let err = store
            .update_item(session.id, item_id, serde_json::json!({"position": "CTO"}))
            .unwrap_err();
        assert!(matches!(err, LatticeError::Conflict(_)));
    }

    #[test]
    fn payload_kind_cannot_be_edited() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let (items, _) = store
            .list_items(session.id, None, Some(ItemKind::Entity), None, None)
            .unwrap();
        let err = store
            .update_item(session.id, items[0].id, serde_json::json!({"kind": "company"}))
            .unwrap_err();
        assert!(matches!(err, LatticeError::Validation(_)));
    }

    #[test]
    fn approve_reopen_reject_preserves_payload_and_history() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let (items, _) = store
            .list_items(session.id, None, Some(ItemKind::Entity), None, None)
            .unwrap();
        let item_id = items[0].id;
        store
            .update_item(session.id, item_id, serde_json::json!({"department": "Exec"}))
            .unwrap();
        let before = store.find_item(item_id).unwrap().1;

        store.transition(session.id, &[item_id], ItemStatus::Approved).unwrap();
        store.transition(session.id, &[item_id], ItemStatus::Pending).unwrap();
        store.transition(session.id, &[item_id], ItemStatus::Rejected).unwrap();

        let after = store.find_item(item_id).unwrap().1;
        assert_eq!(after.status, ItemStatus::Rejected);
        assert_eq!(after.payload, before.payload);
        assert_eq!(after.edits.len(), 1);
    }

    #[test]
    fn illegal_transition_applies_nothing() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let (items, _) = store.list_items(session.id, None, None, None, None).unwrap();
        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        store.transition(session.id, &[ids[0]], ItemStatus::Approved).unwrap();

        // Approved -> rejected is illegal; the whole batch must not move.
        let err = store
            .transition(session.id, &ids, ItemStatus::Rejected)
            .unwrap_err();
        assert!(matches!(err, LatticeError::Conflict(_)));
        let (still_pending, _) = store
            .list_items(session.id, Some(ItemStatus::Pending), None, None, None)
            .unwrap();
        assert_eq!(still_pending.len(), 2);
    }

    #[test]
    fn statistics_track_every_transition() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let (affected, stats) = store.bulk_approve_all(session.id).unwrap();
        assert_eq!(affected, 3);
        assert_eq!(stats.entities.approved, 2);
        assert_eq!(stats.relationships.approved, 1);
        assert_eq!(
            stats.entities.approved + stats.entities.pending + stats.entities.rejected,
            stats.entities.total
        );
    }

    #[tokio::test]
    async fn commit_writes_approved_items_only() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        store.bulk_approve_all(session.id).unwrap();

        let graph = FakeGraph::default();
        let (status, results, stats) = store.commit(session.id, &graph).await.unwrap();
        assert_eq!(status, SessionStatus::Committed);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.ok));
        assert_eq!(stats.commit_failures, 0);
        assert_eq!(graph.merged_entities.lock().unwrap().len(), 2);
        assert_eq!(graph.merged_edges.lock().unwrap().len(), 1);

        // Items are retained after commit for audit.
        let (items, _) = store.list_items(session.id, None, None, None, None).unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn commit_isolates_per_item_failures() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        store.bulk_approve_all(session.id).unwrap();

        let graph = FakeGraph {
            fail_edges: true,
            ..Default::default()
        };
        let (status, results, stats) = store.commit(session.id, &graph).await.unwrap();
        assert_eq!(status, SessionStatus::Committed);
        // Both entities landed despite the edge failing.
        assert_eq!(graph.merged_entities.lock().unwrap().len(), 2);
        assert_eq!(results.iter().filter(|r| !r.ok).count(), 1);
        assert_eq!(stats.commit_failures, 1);
    }

    #[tokio::test]
    async fn rejected_session_commits_nothing() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        store.bulk_reject_pending(session.id).unwrap();

        let graph = FakeGraph::default();
        let (status, results, stats) = store.commit(session.id, &graph).await.unwrap();
        assert_eq!(status, SessionStatus::Committed);
        assert!(results.is_empty());
        assert_eq!(stats.entities.rejected, 2);
        assert!(graph.merged_entities.lock().unwrap().is_empty());
        assert!(graph.merged_edges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_item_session_commits_to_committed() {
        let (_dir, store) = store();
        let doc = Document::new("Empty".into(), "upload".into());
        let session = store.create_session(&doc, &[]).unwrap();
        let graph = FakeGraph::default();
        let (status, results, _) = store.commit(session.id, &graph).await.unwrap();
        assert_eq!(status, SessionStatus::Committed);
        assert!(results.is_empty());
        assert_eq!(
            store.get_session(session.id).unwrap().status,
            SessionStatus::Committed
        );
    }

    #[test]
    fn discard_blocks_further_item_additions() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        store.discard(session.id).unwrap();
        let err = store
            .add_items(session.id, vec![person_item("Mary Johnson")])
            .unwrap_err();
        assert!(matches!(err, LatticeError::Conflict(_)));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (_dir, store) = store();
        let err = store.get_session(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, LatticeError::NotFound(_)));
    }

    #[tokio::test]
    async fn blocking_wrapper_reaches_the_same_store() {
        let (_dir, store) = store();
        let session = seeded_session(&store);

        let listed = store.run_blocking(|s| s.list_sessions()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, session.id);

        // A held lock still surfaces as a conflict through the wrapper.
        let _held = SessionLock::acquire(store.lock_path(session.id)).unwrap();
        let err = store
            .run_blocking(move |s| s.add_items(session.id, vec![person_item("Blocked")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LatticeError::Conflict(_)));
    }

    #[test]
    fn lock_file_blocks_second_writer() {
        let (_dir, store) = store();
        let session = seeded_session(&store);
        let _held = SessionLock::acquire(store.lock_path(session.id)).unwrap();
        let err = store
            .add_items(session.id, vec![person_item("Blocked")])
            .unwrap_err();
        assert!(matches!(err, LatticeError::Conflict(_)));
    }
}
