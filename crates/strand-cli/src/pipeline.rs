//! Built-in TMDB extraction pipeline.
//!
//! ```text
//! extract_tmdb
//! ├── extract_details   requires extract_ids, yields movie/tv details
//! │   └── extract_ids   requires movie/tv ids
//! └── extract_credits   requires extract_ids, yields movie/tv credits
//! extract_episodes      requires extract_details, yields get_episodes
//! ```
//!
//! Leaf stages write a JSON stage file into the output directory instead of
//! talking to the TMDB API.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strand_core::app::EngineBuilder;
use strand_core::domain::{Artifact, ConfigurationError, Outcome, TaskDescriptor, TaskError};
use strand_core::typed::{Handler, Task, Wrapper};
use tracing::debug;

/// Every kind this pipeline registers.
pub const KINDS: &[&str] = &[
    ExtractMovieIds::KIND,
    ExtractTvIds::KIND,
    ExtractMovieDetails::KIND,
    ExtractTvDetails::KIND,
    ExtractMovieCredits::KIND,
    ExtractTvCredits::KIND,
    GetEpisodes::KIND,
    "extract_ids",
    "extract_details",
    "extract_credits",
    "extract_episodes",
    "extract_tmdb",
];

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractMovieIds;

impl Task for ExtractMovieIds {
    const KIND: &'static str = "extract_movie_ids";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractTvIds;

impl Task for ExtractTvIds {
    const KIND: &'static str = "extract_tv_ids";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractMovieDetails;

impl Task for ExtractMovieDetails {
    const KIND: &'static str = "extract_movie_details";

    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(vec![ExtractMovieIds.descriptor()?])
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractTvDetails;

impl Task for ExtractTvDetails {
    const KIND: &'static str = "extract_tv_details";

    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(vec![ExtractTvIds.descriptor()?])
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractMovieCredits;

impl Task for ExtractMovieCredits {
    const KIND: &'static str = "extract_movie_credits";

    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(vec![ExtractMovieIds.descriptor()?])
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractTvCredits;

impl Task for ExtractTvCredits {
    const KIND: &'static str = "extract_tv_credits";

    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(vec![ExtractTvIds.descriptor()?])
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetEpisodes;

impl Task for GetEpisodes {
    const KIND: &'static str = "get_episodes";

    fn requires(&self) -> Result<Vec<TaskDescriptor>, ConfigurationError> {
        Ok(vec![ExtractTvDetails.descriptor()?])
    }
}

fn wrappers() -> Result<Vec<Wrapper>, ConfigurationError> {
    let ids = Wrapper::new("extract_ids")
        .requires([ExtractMovieIds.descriptor()?, ExtractTvIds.descriptor()?]);
    let details = Wrapper::new("extract_details")
        .requires([ids.descriptor()])
        .yields([ExtractMovieDetails.descriptor()?, ExtractTvDetails.descriptor()?]);
    let credits = Wrapper::new("extract_credits")
        .requires([ids.descriptor()])
        .yields([ExtractMovieCredits.descriptor()?, ExtractTvCredits.descriptor()?]);
    let episodes = Wrapper::new("extract_episodes")
        .requires([details.descriptor()])
        .yields([GetEpisodes.descriptor()?]);
    let tmdb =
        Wrapper::new("extract_tmdb").requires([details.descriptor(), credits.descriptor()]);
    Ok(vec![ids, details, credits, episodes, tmdb])
}

/// Writes `<out_dir>/<kind>.json` for any stage task.
pub struct StageWriter<T> {
    out_dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StageWriter<T> {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task> Handler<T> for StageWriter<T> {
    async fn handle(&self, task: T) -> Result<Outcome, TaskError> {
        let inputs: Vec<String> = task
            .requires()
            .map_err(|e| TaskError::new(e.to_string()))?
            .iter()
            .map(|d| d.key().as_str().to_string())
            .collect();
        let body = json!({
            "stage": T::KIND,
            "inputs": inputs,
            "written_at": Utc::now(),
        });

        let path = write_stage(&self.out_dir, T::KIND, &body).await?;
        debug!(stage = T::KIND, path = %path.display(), "stage written");
        Ok(Outcome::done().with_artifact(Artifact::FilePath(path.display().to_string())))
    }
}

/// Write through a temp file so a half-written stage never carries the
/// final name.
async fn write_stage(
    out_dir: &Path,
    kind: &str,
    body: &serde_json::Value,
) -> Result<PathBuf, TaskError> {
    tokio::fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(format!("{kind}.json"));
    let tmp = out_dir.join(format!("{kind}.json.tmp"));
    let bytes = serde_json::to_vec_pretty(body)?;
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

/// Register every stage and wrapper of the pipeline.
pub fn register(
    builder: EngineBuilder,
    out_dir: &Path,
) -> Result<EngineBuilder, ConfigurationError> {
    let mut builder = builder
        .register::<ExtractMovieIds, _>(StageWriter::new(out_dir))?
        .register::<ExtractTvIds, _>(StageWriter::new(out_dir))?
        .register::<ExtractMovieDetails, _>(StageWriter::new(out_dir))?
        .register::<ExtractTvDetails, _>(StageWriter::new(out_dir))?
        .register::<ExtractMovieCredits, _>(StageWriter::new(out_dir))?
        .register::<ExtractTvCredits, _>(StageWriter::new(out_dir))?
        .register::<GetEpisodes, _>(StageWriter::new(out_dir))?;
    for wrapper in wrappers()? {
        builder = builder.register_wrapper(wrapper)?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strand_core::app::Engine;
    use strand_core::impls::InMemoryCompletionStore;

    fn engine(out_dir: &Path) -> Engine {
        register(
            Engine::builder().store(Arc::new(InMemoryCompletionStore::new())),
            out_dir,
        )
        .unwrap()
        .expect_kinds(KINDS)
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn stage_writer_promotes_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StageWriter::<ExtractTvDetails>::new(dir.path());

        let outcome = writer.handle(ExtractTvDetails).await.unwrap();

        let path = dir.path().join("extract_tv_details.json");
        assert_eq!(
            outcome.artifacts,
            vec![Artifact::FilePath(path.display().to_string())]
        );
        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(body["stage"], "extract_tv_details");
        assert_eq!(body["inputs"], json!(["extract_tv_ids"]));
        assert!(!dir.path().join("extract_tv_details.json.tmp").exists());
    }

    #[tokio::test]
    async fn extract_tmdb_runs_every_stage_but_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        let report = engine
            .run(&[TaskDescriptor::bare("extract_tmdb")])
            .await
            .unwrap();

        assert!(report.is_success());
        let mut executed = report.executed_keys();
        executed.sort();
        assert_eq!(
            executed,
            [
                "extract_credits",
                "extract_details",
                "extract_ids",
                "extract_movie_credits",
                "extract_movie_details",
                "extract_movie_ids",
                "extract_tmdb",
                "extract_tv_credits",
                "extract_tv_details",
                "extract_tv_ids",
            ]
        );
        assert!(!dir.path().join("get_episodes.json").exists());
        assert!(dir.path().join("extract_movie_credits.json").exists());
    }

    #[tokio::test]
    async fn episodes_reuse_completed_details() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .run(&[TaskDescriptor::bare("extract_details")])
            .await
            .unwrap();

        let report = engine
            .run(&[TaskDescriptor::bare("extract_episodes")])
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.executed_keys(), ["get_episodes", "extract_episodes"]);
    }

    #[tokio::test]
    async fn plan_lists_static_closure() {
        let dir = tempfile::tempdir().unwrap();
        let plan = engine(dir.path())
            .plan(&[TaskDescriptor::bare("extract_ids")])
            .await
            .unwrap();

        let mut keys = plan.keys();
        assert_eq!(keys.pop(), Some("extract_ids"));
        keys.sort();
        assert_eq!(keys, ["extract_movie_ids", "extract_tv_ids"]);
    }
}
