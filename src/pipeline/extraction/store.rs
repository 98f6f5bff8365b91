use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use uuid::Uuid;

use super::types::DocumentQualityReport;

/// Holds the latest quality report per document. Injected into the
/// orchestrator; there is no process-wide cache.
pub trait ReportStore: Send + Sync {
    fn put(&self, document_id: Uuid, report: DocumentQualityReport);

    fn get(&self, document_id: &Uuid) -> Option<DocumentQualityReport>;
}

struct StoreInner {
    reports: HashMap<Uuid, DocumentQualityReport>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory store. Evicts the least recently written document.
pub struct InMemoryReportStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

impl InMemoryReportStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                reports: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportStore for InMemoryReportStore {
    fn put(&self, document_id: Uuid, report: DocumentQualityReport) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::warn!(document_id = %document_id, "Report store lock poisoned, dropping report");
            return;
        };

        inner.order.retain(|id| *id != document_id);
        inner.order.push_back(document_id);
        inner.reports.insert(document_id, report);

        while inner.reports.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.reports.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn get(&self, document_id: &Uuid) -> Option<DocumentQualityReport> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.reports.get(document_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::aggregate::analyze_document_quality;

    #[test]
    fn stores_and_returns_reports() {
        let store = InMemoryReportStore::new(4);
        let id = Uuid::new_v4();
        let report = analyze_document_quality(&["", ""]);
        store.put(id, report.clone());
        assert_eq!(store.get(&id), Some(report));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let store = InMemoryReportStore::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.put(*id, analyze_document_quality(&[""]));
        }
        assert!(store.get(&ids[0]).is_none());
        assert!(store.get(&ids[1]).is_some());
        assert!(store.get(&ids[2]).is_some());
    }

    #[test]
    fn rewriting_refreshes_position() {
        let store = InMemoryReportStore::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.put(a, analyze_document_quality(&[""]));
        store.put(b, analyze_document_quality(&[""]));
        store.put(a, analyze_document_quality(&["", ""]));
        store.put(c, analyze_document_quality(&[""]));
        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn missing_document_is_none() {
        let store = InMemoryReportStore::new(1);
        assert!(store.is_empty());
        assert!(store.get(&Uuid::new_v4()).is_none());
    }
}
