use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::llm::{ModelInvoker, ModelOutcome};
use crate::prompt::render_prompt;
use crate::scraper::Profile;

/// Sends one profile to several models at once and gathers every answer.
///
/// All fan-outs in the process draw from the same pool of permits, so the
/// number of model calls in flight stays bounded no matter how many requests
/// arrive together. Each call runs in its own task; a task that dies is
/// reported as an error outcome for its model and never takes its siblings
/// down with it.
#[derive(Clone)]
pub struct FanOut {
    invoker: ModelInvoker,
    permits: Arc<Semaphore>,
}

impl FanOut {
    pub fn new(invoker: ModelInvoker, max_concurrent: usize) -> Self {
        Self {
            invoker,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Returns one outcome per entry of `model_ids`, in the same order.
    pub async fn run(&self, profile: &Profile, model_ids: &[String]) -> Vec<ModelOutcome> {
        let prompt: Arc<str> = Arc::from(render_prompt(profile));
        let started = std::time::Instant::now();

        let mut tasks = JoinSet::new();
        for (index, model_id) in model_ids.iter().enumerate() {
            let invoker = self.invoker.clone();
            let permits = Arc::clone(&self.permits);
            let prompt = Arc::clone(&prompt);
            let model_id = model_id.clone();

            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => invoker.invoke(&model_id, &prompt).await,
                    Err(err) => ModelOutcome::failure(&model_id, err),
                };
                (index, outcome)
            });
        }

        // Barrier: every task is awaited, failed ones included.
        let mut slots: Vec<Option<ModelOutcome>> = vec![None; model_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    debug!(model = %outcome.model_id, is_error = outcome.is_error, "model call finished");
                    slots[index] = Some(outcome);
                }
                Err(err) => error!(error = %err, "model task aborted"),
            }
        }

        let outcomes: Vec<ModelOutcome> = slots
            .into_iter()
            .zip(model_ids)
            .map(|(slot, model_id)| {
                slot.unwrap_or_else(|| ModelOutcome::failure(model_id, "model task failed before producing an outcome"))
            })
            .collect();

        info!(
            models = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.is_error).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fan-out complete"
        );
        outcomes
    }
}
