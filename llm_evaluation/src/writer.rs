use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info};

use crate::results::{AggregatedJudgeResults, InferenceResult, JudgeResult};
use crate::storage::{ObjectStorage, METRICS_PREFIX};
use crate::util::{encode_file_name, sanitize_file_name};

pub const INFERENCE_RESULTS_DIR: &str = "inference_results";
pub const JUDGE_RESULTS_DIR: &str = "judge_results";
pub const EVALUATION_RESULTS_DIR: &str = "evaluation_results";

const EVALUATION_RESULTS_FILE: &str = "evaluation_results.json";
const CONFIG_FILE: &str = "config.json";
const JUDGE_DETAILS_FILE: &str = "judge_details.json";

/// Per-document views of a judge run, keyed by document id.
#[derive(Serialize)]
struct JudgeDetails<'a> {
    grades: BTreeMap<&'a str, u8>,
    generations: BTreeMap<&'a str, &'a str>,
    judgments: BTreeMap<&'a str, &'a str>,
    full_prompts: BTreeMap<&'a str, String>,
}

/// `inferences_{model}--{dataset}--{version}--{timestamp}`
pub fn run_directory_name(model: &str, dataset: &str, version: &str, now: DateTime<Local>) -> String {
    format!(
        "inferences_{}--{}--{}--{}",
        sanitize_file_name(model),
        sanitize_file_name(dataset),
        version,
        now.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Writes per-document results as they stream in and the aggregate report
/// at the end of a run.
pub struct ResultSink {
    run_dir: PathBuf,
    storage: Option<ObjectStorage>,
}

impl ResultSink {
    pub fn create(run_dir: impl Into<PathBuf>, storage: Option<ObjectStorage>) -> Result<Self> {
        let run_dir = run_dir.into();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;
        info!("Writing results to {}", run_dir.display());
        Ok(Self { run_dir, storage })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn inference_results_dir(&self) -> PathBuf {
        self.run_dir.join(INFERENCE_RESULTS_DIR)
    }

    pub fn write_inference_result(&self, result: &InferenceResult) -> Result<PathBuf> {
        let path = self
            .inference_results_dir()
            .join(format!("{}.json", encode_file_name(&result.doc_id)));
        write_json(&path, result)?;
        Ok(path)
    }

    pub fn write_judge_result(&self, result: &JudgeResult) -> Result<PathBuf> {
        let path = self
            .run_dir
            .join(JUDGE_RESULTS_DIR)
            .join(format!("{}.json", encode_file_name(&result.context_document_id)));
        write_json(&path, result)?;
        Ok(path)
    }

    /// Write the aggregate results and the run configuration, then mirror
    /// both to object storage if configured.
    pub async fn save_results<R, C>(&self, results: &R, config: &C) -> Result<PathBuf>
    where
        R: Serialize,
        C: Serialize,
    {
        let results_path = self.save_artifact(EVALUATION_RESULTS_FILE, "results.json", results).await?;
        self.save_artifact(CONFIG_FILE, CONFIG_FILE, config).await?;
        info!("Saved evaluation results to {}", results_path.display());
        Ok(results_path)
    }

    /// Grades, generations, judgments and rendered judge prompts per document.
    pub async fn save_judge_details(&self, aggregated: &AggregatedJudgeResults) -> Result<PathBuf> {
        let details = JudgeDetails {
            grades: aggregated.grades(),
            generations: aggregated.generations(),
            judgments: aggregated.judgments(),
            full_prompts: aggregated.full_prompts()?,
        };
        self.save_artifact(JUDGE_DETAILS_FILE, JUDGE_DETAILS_FILE, &details).await
    }

    async fn save_artifact<T: Serialize + ?Sized>(&self, file_name: &str, key: &str, value: &T) -> Result<PathBuf> {
        let path = self.run_dir.join(EVALUATION_RESULTS_DIR).join(file_name);
        write_json(&path, value)?;
        if let Some(storage) = &self.storage {
            let key = format!("{}/{}/{}", METRICS_PREFIX, self.run_dir_name(), key);
            storage.upload(&path, &key).await;
        }
        Ok(path)
    }

    fn run_dir_name(&self) -> String {
        self.run_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    debug!("Wrote {}", path.display());
    Ok(())
}
