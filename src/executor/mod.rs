//! Step executors
//!
//! One handler per capability variant, dispatched by pattern match on the
//! closed [`StepConfig`] enum. All handlers share the same contract: resolved
//! inputs in, output map out, [`StepError`] on failure. The dispatch future
//! is boxed so the parallel-group handler can recurse through the same
//! single-step path.

mod external;
mod group;
mod llm;
mod transform;

pub use external::{Endpoint, ExternalCallExecutor, PlatformEndpoints};
pub use group::ParallelGroupExecutor;
pub use llm::LlmCompletionExecutor;
pub use transform::TransformExecutor;

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::provider::{CompletionProvider, PromptStore};
use crate::workflow::{OutputMap, Step, StepConfig};

/// The closed set of capability handlers.
pub struct StepExecutors {
    external: ExternalCallExecutor,
    llm: LlmCompletionExecutor,
    transform: TransformExecutor,
    group: ParallelGroupExecutor,
}

impl StepExecutors {
    pub fn new(provider: Arc<dyn CompletionProvider>, prompt_store: Arc<dyn PromptStore>) -> Self {
        Self {
            external: ExternalCallExecutor::new(PlatformEndpoints::default()),
            llm: LlmCompletionExecutor::new(provider, prompt_store),
            transform: TransformExecutor,
            group: ParallelGroupExecutor,
        }
    }

    /// Override the platform endpoint bases (tests, staging).
    pub fn with_endpoints(mut self, endpoints: PlatformEndpoints) -> Self {
        self.external = ExternalCallExecutor::new(endpoints);
        self
    }

    /// Execute one step with already-resolved inputs. This is the single-step
    /// path everything funnels through, parallel-group sub-steps included.
    pub fn run<'a>(
        &'a self,
        step: &'a Step,
        inputs: OutputMap,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<OutputMap, StepError>> {
        Box::pin(async move {
            debug!(step_id = %step.id, capability = %step.kind(), "executing step");
            match &step.config {
                StepConfig::ExternalCall(cfg) => self.external.execute(cfg, &inputs).await,
                StepConfig::LlmCompletion(cfg) => self.llm.execute(step, cfg, &inputs).await,
                StepConfig::Transform(cfg) => self.transform.execute(cfg, &inputs, ctx),
                StepConfig::ParallelGroup(cfg) => self.group.execute(self, cfg, &inputs, ctx).await,
            }
        })
    }
}
