//! Stage completion signals.
//!
//! An executor running a staged pipeline marks each stage done as it finishes;
//! stages wait on the signals of the stages they need.

use std::collections::HashMap;
use tokio::sync::watch;

use crate::pipeline::Pipeline;

#[derive(Debug, Default)]
pub struct StageSignals {
    stages: HashMap<String, watch::Sender<bool>>,
}

impl StageSignals {
    /// One signal per stage of `pipeline`.
    pub fn for_pipeline(pipeline: &Pipeline) -> Self {
        let stages = pipeline
            .stages
            .iter()
            .map(|stage| (stage.name.clone(), watch::Sender::new(false)))
            .collect();
        Self { stages }
    }

    /// Marks a stage complete. Unknown names are ignored.
    pub fn complete(&self, stage: &str) {
        if let Some(sender) = self.stages.get(stage) {
            sender.send_replace(true);
        }
    }

    pub fn is_complete(&self, stage: &str) -> bool {
        self.stages.get(stage).is_some_and(|sender| *sender.borrow())
    }

    /// Waits until every stage in `needs` is complete.
    ///
    /// Needs that name no stage of the pipeline (for example a stage that was
    /// purged) are treated as complete.
    pub async fn wait_for(&self, needs: &[String]) {
        for need in needs {
            let Some(sender) = self.stages.get(need) else {
                continue;
            };
            let mut receiver = sender.subscribe();
            // The sender lives as long as `self`, so this cannot observe a close.
            let _ = receiver.wait_for(|done| *done).await;
        }
    }
}
