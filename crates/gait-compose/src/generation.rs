//! Query generation pipeline.
//!
//! A submission raises `is_generating` in the same state update that issues
//! its ticket, then asks the generator. Only the latest submission's answer
//! is applied: the query when present, else the explanatory message (shown
//! in the editor as if it were query text). A hard failure leaves the query
//! text alone and is recorded in `generation_error`. Either way the latest
//! completion lowers `is_generating`.

use crate::events::{ComposerEvent, Pipeline};
use crate::gate::{LatestGate, Ticket};
use crate::runtime::Shared;
use crate::{GenerationRequest, QueryGenerator};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum Applied {
    Written(String),
    Unchanged,
    Failed(String),
}

pub(crate) struct GenerationPipeline {
    generator: Arc<dyn QueryGenerator>,
    gate: Arc<LatestGate>,
}

impl GenerationPipeline {
    pub(crate) fn new(generator: Arc<dyn QueryGenerator>) -> Self {
        Self {
            generator,
            gate: Arc::new(LatestGate::new()),
        }
    }

    pub(crate) fn submit(&self, shared: &Shared, request: GenerationRequest) -> Ticket {
        let gate = Arc::clone(&self.gate);
        let ticket = shared.update(|state| {
            state.begin_generation();
            gate.issue()
        });
        debug!(
            %ticket,
            endpoint = %request.endpoint.url,
            model = %request.model,
            "generation submitted"
        );

        let generator = Arc::clone(&self.generator);
        let task_shared = shared.clone();
        shared.tasks.spawn(async move {
            let outcome = generator.generate(&request).await;

            let applied = task_shared.update_if(|state| {
                gate.admit(ticket, || match &outcome {
                    Ok(result) => match state.finish_generation(result) {
                        Some(text) => Applied::Written(text),
                        None => Applied::Unchanged,
                    },
                    Err(err) => {
                        state.fail_generation(err.to_string());
                        Applied::Failed(err.to_string())
                    }
                })
            });

            match applied {
                Some(Applied::Written(text)) => {
                    info!(%ticket, "generated query applied");
                    task_shared.emit(ComposerEvent::QueryGenerated { ticket, text });
                }
                Some(Applied::Unchanged) => {
                    warn!(%ticket, "generator returned neither query nor message");
                }
                Some(Applied::Failed(message)) => {
                    warn!(%ticket, error = %message, "query generation failed");
                    task_shared.emit(ComposerEvent::GenerationFailed { ticket, message });
                }
                None => {
                    debug!(%ticket, "stale generation discarded");
                    task_shared.emit(ComposerEvent::Discarded {
                        pipeline: Pipeline::Generation,
                        ticket,
                    });
                }
            }
        });
        ticket
    }

    pub(crate) fn close(&self) {
        self.gate.retire();
    }
}
