//! Reactive recommendation queries.
//!
//! A query fires whenever one of its inputs (skin tone, body type, category,
//! prompt) changes, including a first estimate replacing a default. Requests
//! are never cancelled; instead each carries a sequence number and only the
//! newest one may touch the display.

use crate::error::RecommendError;
use crate::state::{Memo, PerceivedState};
use crate::types::{BodyType, CategoryFilter, GarmentRecommendation, RecommendationQuery, RecommendationResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const DEFAULT_SKIN_TONE: &str = "Wheatish";
pub const DEFAULT_BODY_TYPE: BodyType = BodyType::Mesomorph;

#[async_trait]
pub trait RecommendationService: Send + Sync {
    /// `None` asks for the service's unparameterised list.
    async fn recommend(&self, query: Option<RecommendationQuery>) -> Result<RecommendationResult, RecommendError>;
}

/// `GET {base}/recommend?skin_tone=..&body_type=..&category=..&prompt=..`
pub struct HttpRecommender {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpRecommender {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RecommendError> {
        let raw = format!("{}/recommend", base_url.trim_end_matches('/'));
        let endpoint = reqwest::Url::parse(&raw).map_err(|e| RecommendError::InvalidEndpoint(format!("{raw}: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait]
impl RecommendationService for HttpRecommender {
    async fn recommend(&self, query: Option<RecommendationQuery>) -> Result<RecommendationResult, RecommendError> {
        let mut request = self.client.get(self.endpoint.clone());
        if let Some(query) = &query {
            request = request.query(query);
        }
        let result = request
            .send()
            .await?
            .error_for_status()?
            .json::<RecommendationResult>()
            .await?;
        Ok(result)
    }
}

/// The pipeline's inputs before defaults are filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryInputs {
    pub skin_tone: Option<String>,
    pub body_type: Option<BodyType>,
    pub category: CategoryFilter,
    pub prompt: String,
}

impl QueryInputs {
    pub fn from_state(state: &PerceivedState, category: CategoryFilter, prompt: &str) -> Self {
        Self {
            skin_tone: state.skin_tone.clone(),
            body_type: state.metrics.as_ref().and_then(|m| m.body_type),
            category,
            prompt: prompt.to_string(),
        }
    }

    pub fn to_query(&self) -> RecommendationQuery {
        RecommendationQuery {
            skin_tone: self.skin_tone.clone().unwrap_or_else(|| DEFAULT_SKIN_TONE.to_string()),
            body_type: self.body_type.unwrap_or(DEFAULT_BODY_TYPE).to_string(),
            category: self.category.to_string(),
            prompt: self.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Startup fetch without parameters.
    Seed,
    Live(u64),
}

struct Completion {
    origin: Origin,
    outcome: Result<RecommendationResult, RecommendError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Newest live response; display replaced.
    Applied,
    /// Startup list shown until the first live response.
    Seeded,
    /// Discarded: a newer request was issued, or a live result already won.
    Superseded,
    /// Request failed; display unchanged.
    Failed,
}

pub struct RecommendationPipeline {
    service: Arc<dyn RecommendationService>,
    last_inputs: Memo<QueryInputs>,
    issued: u64,
    has_live: bool,
    displayed: RecommendationResult,
    in_flight: JoinSet<Completion>,
}

impl RecommendationPipeline {
    pub fn new(service: Arc<dyn RecommendationService>) -> Self {
        Self {
            service,
            last_inputs: Memo::default(),
            issued: 0,
            has_live: false,
            displayed: RecommendationResult::default(),
            in_flight: JoinSet::new(),
        }
    }

    pub fn displayed(&self) -> &RecommendationResult {
        &self.displayed
    }

    /// Number of parameterised queries issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn garment(&self, id: u64) -> Option<&GarmentRecommendation> {
        self.displayed.garments.iter().find(|g| g.id == id)
    }

    /// Displayed garments admitted by `filter`, in service order.
    pub fn wardrobe(&self, filter: CategoryFilter) -> Vec<&GarmentRecommendation> {
        self.displayed.garments.iter().filter(|g| filter.admits(g)).collect()
    }

    pub fn seed(&mut self) {
        self.spawn(Origin::Seed, None);
    }

    /// Fires a query if any input changed. Returns whether one fired.
    pub fn observe(&mut self, inputs: &QueryInputs) -> bool {
        if self.last_inputs.update(inputs.clone()).is_none() {
            return false;
        }
        let query = inputs.to_query();
        self.issued += 1;
        debug!(
            seq = self.issued,
            skin_tone = %query.skin_tone,
            body_type = %query.body_type,
            category = %query.category,
            "recommendation query"
        );
        self.spawn(Origin::Live(self.issued), Some(query));
        true
    }

    fn spawn(&mut self, origin: Origin, query: Option<RecommendationQuery>) {
        let service = Arc::clone(&self.service);
        self.in_flight.spawn(async move {
            let outcome = service.recommend(query).await;
            Completion { origin, outcome }
        });
    }

    /// Waits for the next request to finish and applies it. Pends forever
    /// while nothing is in flight.
    pub async fn next_completion(&mut self) -> CompletionOutcome {
        loop {
            match self.in_flight.join_next().await {
                Some(Ok(completion)) => return self.apply(completion),
                Some(Err(e)) => warn!("recommendation task failed: {e}"),
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn apply(&mut self, completion: Completion) -> CompletionOutcome {
        let fresh = match completion.origin {
            Origin::Seed => !self.has_live,
            Origin::Live(seq) => seq == self.issued,
        };
        if !fresh {
            debug!(origin = ?completion.origin, latest = self.issued, "discarding superseded recommendations");
            return CompletionOutcome::Superseded;
        }

        match completion.outcome {
            Ok(result) => {
                info!(
                    garments = result.garments.len(),
                    colors = result.palette.len(),
                    "recommendations updated"
                );
                self.displayed = result;
                match completion.origin {
                    Origin::Seed => CompletionOutcome::Seeded,
                    Origin::Live(_) => {
                        self.has_live = true;
                        CompletionOutcome::Applied
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch recommendations: {e}");
                CompletionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Script = dyn Fn(Option<&RecommendationQuery>) -> (Duration, Result<RecommendationResult, RecommendError>)
        + Send
        + Sync;

    /// Answers from a script after a (virtual) delay and records every call.
    pub struct FakeRecommender {
        script: Box<Script>,
        pub calls: Mutex<Vec<Option<RecommendationQuery>>>,
    }

    impl FakeRecommender {
        pub fn new(
            script: impl Fn(Option<&RecommendationQuery>) -> (Duration, Result<RecommendationResult, RecommendError>)
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self { script: Box::new(script), calls: Mutex::new(Vec::new()) })
        }

        /// One garment named after the query's skin tone (or "seed").
        pub fn echo(delay: Duration) -> Arc<Self> {
            Self::new(move |query| (delay, Ok(result_named(query.map_or("seed", |q| q.skin_tone.as_str())))))
        }

        pub fn calls(&self) -> Vec<Option<RecommendationQuery>> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn result_named(name: &str) -> RecommendationResult {
        RecommendationResult {
            garments: vec![GarmentRecommendation {
                id: 1,
                name: name.to_string(),
                category: "Formal".into(),
                color: Some("#ff0000".into()),
                match_percent: None,
            }],
            palette: Vec::new(),
            body_advice: None,
        }
    }

    #[async_trait]
    impl RecommendationService for FakeRecommender {
        async fn recommend(&self, query: Option<RecommendationQuery>) -> Result<RecommendationResult, RecommendError> {
            let (delay, outcome) = (self.script)(query.as_ref());
            self.calls.lock().unwrap().push(query);
            tokio::time::sleep(delay).await;
            outcome
        }
    }
}
