//! Embedding-based peer matching.
//!
//! Peer root causes are embedded once, on first use, through the
//! provider's embeddings endpoint. Each query root cause is embedded
//! (with an in-memory cache) and compared against every peer by cosine
//! similarity; the single best peer is returned if it clears the
//! configured threshold.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use kp_domain::config::MatchingConfig;
use kp_domain::error::{Error, Result};
use kp_domain::peer::{PeerMatch, PeerRecord};
use kp_domain::profile::RootCause;
use parking_lot::RwLock;
use tokio::sync::OnceCell;

use crate::traits::{EmbeddingsRequest, LlmProvider, PeerMatcher};

/// Maximum number of cached query embeddings before the cache is reset.
const CACHE_MAX_ENTRIES: usize = 4_096;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vector math
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if the lengths differ or
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Top-1 peer for `query`, if its score (capped at 1.0) is at least
/// `threshold`. Ties keep the earlier peer.
pub fn best_match(
    query: &[f32],
    peers: &[PeerRecord],
    vectors: &[Vec<f32>],
    threshold: f32,
) -> Option<PeerMatch> {
    let (idx, score) = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v).min(1.0)))
        .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
            Some((_, bs)) if bs >= s => best,
            _ => Some((i, s)),
        })?;

    if score < threshold {
        tracing::debug!(score, threshold, "best peer below similarity threshold");
        return None;
    }
    peers.get(idx).map(|p| PeerMatch::from_record(p, score))
}

/// Read the peers file: a JSON array of [`PeerRecord`].
///
/// Every record needs a non-blank id and root cause, and ids must be
/// unique.
pub fn load_peers(path: &Path) -> Result<Vec<PeerRecord>> {
    let invalid = |message: String| Error::Peers {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let peers: Vec<PeerRecord> =
        serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    for (i, peer) in peers.iter().enumerate() {
        if peer.peer_id.trim().is_empty() || peer.root_cause.trim().is_empty() {
            return Err(invalid(format!("record {i} has a blank peer_id or root_cause")));
        }
        if !seen.insert(peer.peer_id.as_str()) {
            return Err(invalid(format!("duplicate peer_id {:?}", peer.peer_id)));
        }
    }
    Ok(peers)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EmbeddingPeerMatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EmbeddingPeerMatcher {
    provider: Arc<dyn LlmProvider>,
    cfg: MatchingConfig,
    peers: Vec<PeerRecord>,
    peer_vectors: OnceCell<Vec<Vec<f32>>>,
    query_cache: RwLock<HashMap<String, Vec<f32>>>,
}

impl EmbeddingPeerMatcher {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        cfg: MatchingConfig,
        peers: Vec<PeerRecord>,
    ) -> Self {
        Self {
            provider,
            cfg,
            peers,
            peer_vectors: OnceCell::new(),
            query_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let resp = self
            .provider
            .embeddings(EmbeddingsRequest {
                input,
                model: Some(self.cfg.embedding_model.clone()),
            })
            .await?;
        Ok(resp.embeddings)
    }

    async fn peer_vectors(&self) -> Result<&Vec<Vec<f32>>> {
        self.peer_vectors
            .get_or_try_init(|| async {
                let input: Vec<String> = self.peers.iter().map(|p| p.root_cause.clone()).collect();
                let vectors = self.embed(input).await?;
                tracing::info!(peers = vectors.len(), "peer embeddings initialized");
                Ok::<_, Error>(vectors)
            })
            .await
    }

    async fn query_vector(&self, root_cause: &str) -> Result<Vec<f32>> {
        let cached = self.query_cache.read().get(root_cause).cloned();
        if let Some(v) = cached {
            return Ok(v);
        }
        let vector = self
            .embed(vec![root_cause.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider {
                provider: self.provider.provider_id().to_owned(),
                message: "empty embeddings response".into(),
            })?;

        let mut cache = self.query_cache.write();
        if cache.len() >= CACHE_MAX_ENTRIES {
            cache.clear();
        }
        cache.insert(root_cause.to_owned(), vector.clone());
        Ok(vector)
    }

    async fn try_match(&self, root_cause: &str) -> Result<Option<PeerMatch>> {
        if self.peers.is_empty() {
            return Ok(None);
        }
        let vectors = self.peer_vectors().await?;
        let query = self.query_vector(root_cause).await?;
        Ok(best_match(
            &query,
            &self.peers,
            vectors,
            self.cfg.similarity_threshold,
        ))
    }
}

#[async_trait::async_trait]
impl PeerMatcher for EmbeddingPeerMatcher {
    async fn find_match(&self, root_cause: &str) -> Option<PeerMatch> {
        let RootCause::Set(cause) = RootCause::parse(root_cause) else {
            return None;
        };
        match self.try_match(&cause).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "peer lookup failed");
                None
            }
        }
    }
}

/// Matcher used when `[matching] enabled = false`.
pub struct DisabledMatcher;

#[async_trait::async_trait]
impl PeerMatcher for DisabledMatcher {
    async fn find_match(&self, _root_cause: &str) -> Option<PeerMatch> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse, EmbeddingsResponse};
    use kp_domain::stream::{BoxStream, StreamEvent};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer(id: &str, cause: &str) -> PeerRecord {
        PeerRecord {
            peer_id: id.into(),
            root_cause: cause.into(),
            primary_emotion: None,
            clinical_notes: None,
        }
    }

    /// Embeds by keyword so similarity is predictable.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    fn keyword_vector(text: &str) -> Vec<f32> {
        let t = text.to_lowercase();
        vec![
            if t.contains("job") { 1.0 } else { 0.0 },
            if t.contains("breakup") { 1.0 } else { 0.0 },
            if t.contains("exam") { 1.0 } else { 0.0 },
        ]
    }

    #[async_trait::async_trait]
    impl LlmProvider for KeywordEmbedder {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Err(Error::Other("unused".into()))
        }

        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Err(Error::Other("unused".into()))
        }

        async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmbeddingsResponse {
                embeddings: req.input.iter().map(|t| keyword_vector(t)).collect(),
            })
        }

        fn provider_id(&self) -> &str {
            "keyword"
        }
    }

    fn matcher() -> (Arc<KeywordEmbedder>, EmbeddingPeerMatcher) {
        let provider = Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) });
        let m = EmbeddingPeerMatcher::new(
            provider.clone(),
            MatchingConfig::default(),
            vec![peer("p-job", "Lost my job"), peer("p-love", "A painful breakup")],
        );
        (provider, m)
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn best_match_enforces_threshold() {
        let peers = vec![peer("a", "x"), peer("b", "y")];
        let vectors = vec![vec![1.0, 0.0], vec![0.6, 0.8]];
        let m = best_match(&[1.0, 0.0], &peers, &vectors, 0.70).unwrap();
        assert_eq!(m.peer_id, "a");
        assert!(best_match(&[0.0, 1.0], &peers, &vectors, 0.90).is_none());
        assert!(best_match(&[0.0, 1.0], &peers, &[], 0.0).is_none());
    }

    #[tokio::test]
    async fn finds_closest_peer() {
        let (_, m) = matcher();
        let found = m.find_match("Job loss").await.unwrap();
        assert_eq!(found.peer_id, "p-job");
        assert!(found.score <= 1.0);
    }

    #[tokio::test]
    async fn unset_root_cause_never_matches() {
        let (provider, m) = matcher();
        assert!(m.find_match("-").await.is_none());
        assert!(m.find_match("  ").await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unrelated_cause_is_below_threshold() {
        let (_, m) = matcher();
        assert!(m.find_match("Exam stress").await.is_none());
    }

    #[tokio::test]
    async fn embeddings_are_cached() {
        let (provider, m) = matcher();
        m.find_match("Job loss").await;
        m.find_match("Job loss").await;
        // one batch for peers, one for the query
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn peers_file_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"peer_id":"p1","root_cause":"Bereavement","clinical_notes":"Lost a parent"}}]"#
        )
        .unwrap();
        let peers = load_peers(file.path()).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].clinical_notes.as_deref(), Some("Lost a parent"));
        assert!(matches!(
            load_peers(Path::new("/definitely/not/here.json")),
            Err(Error::Peers { .. })
        ));
    }

    #[test]
    fn peers_file_rejects_duplicates_and_blanks() {
        let mut dup = tempfile::NamedTempFile::new().unwrap();
        write!(
            dup,
            r#"[{{"peer_id":"p1","root_cause":"A"}},{{"peer_id":"p1","root_cause":"B"}}]"#
        )
        .unwrap();
        let err = load_peers(dup.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate peer_id"));

        let mut blank = tempfile::NamedTempFile::new().unwrap();
        write!(blank, r#"[{{"peer_id":"p1","root_cause":"  "}}]"#).unwrap();
        assert!(matches!(load_peers(blank.path()), Err(Error::Peers { .. })));
    }
}
