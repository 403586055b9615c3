//! Query runner shared by the `lexsearch` binary and its tests.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use lexsearch_core::traits::{LexicalRanker, SemanticSearcher};
use lexsearch_hybrid::{HybridRetriever, RetrievedChunk};

#[derive(Debug)]
pub enum QueryOutcome {
    Ranked(Vec<RetrievedChunk>),
    Failed(String),
    TimedOut,
}

#[derive(Debug)]
pub struct QueryReport {
    pub query: String,
    pub outcome: QueryOutcome,
}

/// Run every query on a blocking task against one shared retriever.
///
/// Each query gets its own `deadline`; `None` waits indefinitely. Reports
/// come back in input order.
pub async fn run_queries<L, S>(
    retriever: Arc<HybridRetriever<L, S>>,
    queries: Vec<String>,
    top_k_semantic: usize,
    top_k_final: usize,
    deadline: Option<Duration>,
) -> Vec<QueryReport>
where
    L: LexicalRanker + 'static,
    S: SemanticSearcher + 'static,
{
    let tasks = queries.into_iter().map(|query| {
        let retriever = Arc::clone(&retriever);
        async move {
            let q = query.clone();
            let task = tokio::task::spawn_blocking(move || retriever.retrieve_detailed(&q, top_k_semantic, top_k_final));
            let joined = match deadline {
                Some(d) => match tokio::time::timeout(d, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(query = %query, ?d, "query exceeded its deadline");
                        return QueryReport { query, outcome: QueryOutcome::TimedOut };
                    }
                },
                None => task.await,
            };
            let outcome = match joined {
                Ok(Ok(ranked)) => QueryOutcome::Ranked(ranked),
                Ok(Err(e)) => QueryOutcome::Failed(format!("{e:#}")),
                Err(e) => QueryOutcome::Failed(format!("query task failed: {e}")),
            };
            QueryReport { query, outcome }
        }
    });
    join_all(tasks).await
}

/// `0` disables the deadline.
pub fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
