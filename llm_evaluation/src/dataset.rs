use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, ListArray, StringArray,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, instrument};

use crate::error::EvalError;

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co/datasets";

/// One dataset row keyed by column name.
pub type Record = Map<String, Value>;

/// Column names used to project records into documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentColumns {
    pub id: String,
    pub context: String,
    pub gold_standard: String,
}

impl Default for DocumentColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            context: "article".to_string(),
            gold_standard: "highlights".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub context: String,
    pub gold_standard: String,
}

impl Document {
    pub fn from_record(record: &Record, columns: &DocumentColumns) -> Result<Self, EvalError> {
        let id = record
            .get(&columns.id)
            .map(value_to_text)
            .ok_or_else(|| EvalError::MissingColumn {
                record: "<unknown>".to_string(),
                column: columns.id.clone(),
            })?;
        let context = value_to_text(column(record, &columns.context, &id)?);
        let gold_standard = match column(record, &columns.gold_standard, &id)? {
            Value::Array(answers) => match answers.as_slice() {
                [answer] => value_to_text(answer),
                [] => return Err(EvalError::EmptyGoldStandard { doc_id: id }),
                answers => {
                    return Err(EvalError::MultipleCorrectAnswers {
                        doc_id: id,
                        count: answers.len(),
                    })
                }
            },
            other => value_to_text(other),
        };

        Ok(Self {
            id,
            context,
            gold_standard,
        })
    }
}

fn column<'r>(record: &'r Record, name: &str, id: &str) -> Result<&'r Value, EvalError> {
    record.get(name).ok_or_else(|| EvalError::MissingColumn {
        record: id.to_string(),
        column: name.to_string(),
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loads dataset splits from a local file or a cached hub download.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    cache_dir: PathBuf,
    hub_url: String,
}

impl DatasetLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            hub_url: DEFAULT_HUB_URL.to_string(),
        }
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache_path(&self, name: &str, version: &str, split: &str) -> PathBuf {
        self.cache_dir
            .join(name.replace('/', "__"))
            .join(version)
            .join(format!("{}.parquet", split))
    }

    #[instrument(skip(self))]
    pub async fn load(&self, name: &str, version: &str, split: &str) -> Result<Vec<Record>> {
        let local = Path::new(name);
        let path = if local.is_file() {
            local.to_path_buf()
        } else {
            let cached = self.cache_path(name, version, split);
            if !cached.exists() {
                self.download(name, version, split, &cached).await?;
            }
            cached
        };

        let records = read_records(&path)?;
        if records.is_empty() {
            anyhow::bail!("No entries found in dataset split {} ({})", split, path.display());
        }
        info!("Loaded {} records from {}", records.len(), path.display());
        Ok(records)
    }

    async fn download(&self, name: &str, version: &str, split: &str, target: &Path) -> Result<()> {
        let url = format!(
            "{}/{}/resolve/main/{}/{}-00000-of-00001.parquet",
            self.hub_url, name, version, split
        );
        info!("Dataset not cached, downloading {}", url);

        let bytes = reqwest::get(&url)
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to download dataset from {}", url))?
            .bytes()
            .await
            .context("Failed to read dataset body")?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create cache directory")?;
        }
        tokio::fs::write(target, &bytes)
            .await
            .with_context(|| format!("Failed to write dataset to {}", target.display()))?;
        debug!("Downloaded {} bytes to {}", bytes.len(), target.display());
        Ok(())
    }
}

/// Read every record of a dataset file, dispatching on the extension.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => read_parquet(path),
        Some("csv") => read_csv(path),
        Some("jsonl") => read_jsonl(path),
        Some("json") => read_json(path),
        _ => anyhow::bail!("Unsupported dataset format: {}", path.display()),
    }
}

fn read_parquet(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).context("Failed to open dataset file")?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("Failed to create parquet reader")?
        .build()
        .context("Failed to build parquet reader")?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.context("Failed to read record batch")?;
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            let mut record = Record::new();
            for (field, column) in schema.fields().iter().zip(batch.columns()) {
                record.insert(field.name().clone(), array_value(column, row)?);
            }
            records.push(record);
        }
    }
    Ok(records)
}

fn array_value(array: &ArrayRef, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let any = array.as_any();
    let value = if let Some(a) = any.downcast_ref::<StringArray>() {
        Value::String(a.value(row).to_string())
    } else if let Some(a) = any.downcast_ref::<LargeStringArray>() {
        Value::String(a.value(row).to_string())
    } else if let Some(a) = any.downcast_ref::<Int64Array>() {
        Value::from(a.value(row))
    } else if let Some(a) = any.downcast_ref::<Int32Array>() {
        Value::from(a.value(row))
    } else if let Some(a) = any.downcast_ref::<Float64Array>() {
        float_value(a.value(row))
    } else if let Some(a) = any.downcast_ref::<Float32Array>() {
        float_value(f64::from(a.value(row)))
    } else if let Some(a) = any.downcast_ref::<BooleanArray>() {
        Value::Bool(a.value(row))
    } else if let Some(a) = any.downcast_ref::<ListArray>() {
        let values = a.value(row);
        let items = (0..values.len())
            .map(|i| array_value(&values, i))
            .collect::<Result<Vec<_>>>()?;
        Value::Array(items)
    } else {
        Value::String(
            arrow::util::display::array_value_to_string(array, row)
                .context("Failed to render parquet value")?,
        )
    };
    Ok(value)
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn read_csv(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).context("Failed to open dataset file")?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));
    let headers = reader.headers().context("Failed to read CSV header")?.clone();

    reader
        .records()
        .map(|row| {
            let row = row.context("Failed to read CSV record")?;
            Ok(headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect())
        })
        .collect()
}

fn read_jsonl(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).context("Failed to open dataset file")?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read JSONL line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {} of {}", idx + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

fn read_json(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).context("Failed to open dataset file")?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Expected a JSON array of objects in {}", path.display()))
}
