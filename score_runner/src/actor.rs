use std::sync::mpsc::{self, Sender, Receiver};
use std::thread;
use tokio::sync::oneshot;
use tracing::{instrument, info, error};

use crate::score::{score_all, ScoreOptions, ScoreSet};
use crate::{EmbeddingConfig, EmbeddingRunner, EmbeddingRunnerTrait};

pub enum ScoreCommand {
    LoadModel {
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    Score {
        predictions: Vec<String>,
        references: Vec<String>,
        options: ScoreOptions,
        reply: oneshot::Sender<anyhow::Result<ScoreSet>>,
    },
}

/// Async handle to the scoring thread. Scoring is CPU-bound, so it stays off
/// the event loop.
#[derive(Clone)]
pub struct ScorerHandle {
    cmd_tx: Sender<ScoreCommand>,
}

impl ScorerHandle {
    pub fn new(cmd_tx: Sender<ScoreCommand>) -> Self {
        Self { cmd_tx }
    }

    #[instrument(skip(self))]
    pub async fn load_model(&self) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = ScoreCommand::LoadModel { reply: reply_tx };
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("Actor thread closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("Actor dropped reply"))?
    }

    #[instrument(skip_all, fields(pairs = predictions.len()))]
    pub async fn score(
        &self,
        predictions: Vec<String>,
        references: Vec<String>,
        options: ScoreOptions,
    ) -> anyhow::Result<ScoreSet> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = ScoreCommand::Score { predictions, references, options, reply: reply_tx };
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("Actor thread closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("Actor dropped reply"))?
    }
}

#[instrument(skip(config))]
pub fn start_scorer_actor(config: EmbeddingConfig) -> (ScorerHandle, thread::JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let handle = ScorerHandle::new(cmd_tx);

    let join_handle = thread::spawn(move || {
        let mut runner = EmbeddingRunner::new(config);
        actor_loop(&mut runner, cmd_rx);
        info!("Scorer thread: command channel closed, exiting.");
    });

    (handle, join_handle)
}

fn actor_loop(runner: &mut EmbeddingRunner, cmd_rx: Receiver<ScoreCommand>) {
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            ScoreCommand::LoadModel { reply } => {
                let res = runner.load_model();
                if let Err(e) = &res {
                    error!("Load model error: {:?}", e);
                }
                let _ = reply.send(res);
            }
            ScoreCommand::Score { predictions, references, options, reply } => {
                info!("Scoring {} prediction/reference pairs", predictions.len());
                let res = score_all(&*runner, &predictions, &references, &options);
                let _ = reply.send(res);
            }
        }
    }
}
