//! Runs orchestrator instances side by side
//!
//! Each instance lives in its own tokio task and owns its orchestrator. Inputs
//! reach it over a channel, so transitions for one instance are strictly
//! serialized while different instances proceed in parallel without sharing
//! any mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;

use super::clock::Clock;
use super::orchestrator::{
    BufferState, Collaborators, CompletionSettings, MemoryOrchestrator, OrchestratorError,
    StepOutcome,
};
use super::policy::ConsolidationPolicy;
use super::query::{QueryAnswer, QueryOrchestrator};

type Reply = oneshot::Sender<Result<StepOutcome, OrchestratorError>>;

struct Envelope {
    text: String,
    reply: Option<Reply>,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    size: usize,
    epoch_start: DateTime<Utc>,
}

impl Snapshot {
    fn of(orchestrator: &MemoryOrchestrator) -> Self {
        let checkpoint = orchestrator.checkpoint();
        Self {
            size: checkpoint.buffer.len(),
            epoch_start: checkpoint.epoch_start,
        }
    }
}

struct InstanceHandle {
    inputs: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

pub struct InstanceHost {
    policy: ConsolidationPolicy,
    settings: CompletionSettings,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    query: QueryOrchestrator,
    instances: RwLock<HashMap<String, InstanceHandle>>,
}

impl InstanceHost {
    pub fn new(
        policy: ConsolidationPolicy,
        settings: CompletionSettings,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let query = QueryOrchestrator::new(
            collaborators.completion.clone(),
            collaborators.long_term.clone(),
            settings,
        );

        Self {
            policy,
            settings,
            collaborators,
            clock,
            query,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Queue an input for `instance_id` and return without waiting for it.
    pub async fn submit_input(&self, instance_id: &str, text: &str) -> Result<(), OrchestratorError> {
        self.send(instance_id, text, None).await
    }

    /// Queue an input and wait until the instance has processed it.
    pub async fn process_input(
        &self,
        instance_id: &str,
        text: &str,
    ) -> Result<StepOutcome, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.send(instance_id, text, Some(tx)).await?;
        rx.await
            .map_err(|_| OrchestratorError::InstanceClosed(instance_id.to_string()))?
    }

    /// Buffer size and epoch age. Instances that are not running are read
    /// from their checkpoint and left stopped.
    pub async fn buffer_state(&self, instance_id: &str) -> Result<BufferState, OrchestratorError> {
        let running = self
            .instances
            .read()
            .await
            .get(instance_id)
            .map(|handle| *handle.state.borrow());

        let snapshot = match running {
            Some(snapshot) => snapshot,
            None => {
                let loaded = self
                    .collaborators
                    .checkpoints
                    .load(instance_id)
                    .await
                    .map_err(OrchestratorError::Checkpoint)?;
                match loaded {
                    Some(checkpoint) => Snapshot {
                        size: checkpoint.buffer.len(),
                        epoch_start: checkpoint.epoch_start,
                    },
                    None => {
                        return Ok(BufferState {
                            size: 0,
                            epoch_elapsed_minutes: 0,
                        })
                    }
                }
            }
        };

        let elapsed = (self.clock.now() - snapshot.epoch_start).max(chrono::Duration::zero());
        Ok(BufferState {
            size: snapshot.size,
            epoch_elapsed_minutes: elapsed.num_minutes(),
        })
    }

    pub async fn query(&self, text: &str) -> QueryAnswer {
        self.query.handle(text, self.clock.now()).await
    }

    /// Stop every instance after it drains the inputs already queued.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, InstanceHandle)> =
            self.instances.write().await.drain().collect();

        for (instance_id, handle) in handles {
            drop(handle.inputs);
            if let Err(e) = handle.task.await {
                tracing::error!("[{}] Instance task ended abnormally: {}", instance_id, e);
            }
        }
    }

    async fn send(
        &self,
        instance_id: &str,
        text: &str,
        reply: Option<Reply>,
    ) -> Result<(), OrchestratorError> {
        self.ensure_instance(instance_id).await?;
        let instances = self.instances.read().await;
        let handle = instances
            .get(instance_id)
            .ok_or_else(|| OrchestratorError::InstanceClosed(instance_id.to_string()))?;

        handle
            .inputs
            .send(Envelope {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| OrchestratorError::InstanceClosed(instance_id.to_string()))
    }

    /// Recover and start the instance if it is not running yet.
    async fn ensure_instance(&self, instance_id: &str) -> Result<(), OrchestratorError> {
        if self.instances.read().await.contains_key(instance_id) {
            return Ok(());
        }

        // Recovery only reads, so a racing caller may recover too; the first insert wins.
        let orchestrator = MemoryOrchestrator::recover(
            instance_id,
            self.policy,
            self.settings,
            self.collaborators.clone(),
            self.clock.now(),
        )
        .await?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(instance_id) {
            return Ok(());
        }

        let (inputs, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(Snapshot::of(&orchestrator));
        let task = tokio::spawn(run_instance(
            orchestrator,
            receiver,
            state_tx,
            self.clock.clone(),
        ));

        instances.insert(
            instance_id.to_string(),
            InstanceHandle {
                inputs,
                state,
                task,
            },
        );
        Ok(())
    }
}

async fn run_instance(
    mut orchestrator: MemoryOrchestrator,
    mut inputs: mpsc::UnboundedReceiver<Envelope>,
    state: watch::Sender<Snapshot>,
    clock: Arc<dyn Clock>,
) {
    while let Some(envelope) = inputs.recv().await {
        let result = orchestrator.process(&envelope.text, clock.now()).await;
        if let Err(ref e) = result {
            tracing::error!("[{}] {}", orchestrator.instance_id(), e);
        }

        state.send_replace(Snapshot::of(&orchestrator));

        if let Some(reply) = envelope.reply {
            let _ = reply.send(result);
        }
    }

    tracing::info!("[{}] Instance stopped", orchestrator.instance_id());
}
