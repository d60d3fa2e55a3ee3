use anyhow::Result;
use app_wrapper::modules::AppWrapperModule;
use app_wrapper::workflow::definition::WorkflowLoader;
use app_wrapper::workflow::execute;
use clap::Parser;
use momentum_infra::container::DataContainer;
use momentum_infra::run_meta::RunMeta;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workflow definition: a file path, or the json / yaml text itself.
    #[arg(long, short, required = true)]
    workflow: String,

    /// Uploaded file the run processes.
    #[arg(long, short, required = true)]
    file: PathBuf,

    #[arg(long, default_value = "application/octet-stream")]
    content_type: String,

    #[arg(long, default_value = "local")]
    workspace: String,

    #[arg(long, default_value = "local")]
    processor: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    momentum_base::logging::logging_init(
        momentum_base::logging::load_logging_config_from_env().unwrap_or_default(),
    )?;

    let definition = if Path::new(&args.workflow).is_file() {
        WorkflowLoader::load_path(&args.workflow).await?
    } else {
        WorkflowLoader::load_str(&args.workflow)?
    };
    let app_module = AppWrapperModule::new_by_env()?;

    let upload = app_module.repositories.containers.create();
    let size = upload.upload_file(&args.file, &args.content_type).await?;
    tracing::info!(
        "stored upload {:?} as {} ({} bytes)",
        &args.file,
        upload.container_id(),
        size
    );
    let meta = RunMeta {
        workspace_id: args.workspace.clone(),
        upload_id: upload.container_id().to_string(),
        processor_id: args.processor.clone(),
        workflow_id: uuid::Uuid::now_v7().to_string(),
        run_id: uuid::Uuid::new_v4().to_string(),
        file_name: args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        content_type: args.content_type.clone(),
    };

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    let (executor, result) =
        execute::execute(&app_module, Arc::new(definition), meta, cancellation).await;
    let report = executor.workflow_context().read().await.to_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    result.map(|_| ())
}
