use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use common::App;
use distributed::{
    init_logger,
    job::{plan, read_corpus},
    Endpoint, FileServer, Job, Store, Workspace, ADDR,
};
use futures::TryStreamExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
pub struct Cli {
    /// Application to run (wc, indexer)
    #[arg(short, long, default_value = "wc")]
    app: String,
    /// Address the file server listens on
    #[arg(short, long, default_value = ADDR)]
    listen: String,
    #[arg(short = 'm', long)]
    n_map: Option<usize>,
    #[arg(short = 'r', long)]
    n_reduce: Option<usize>,
    /// Input records per map task when --n-map is not given
    #[arg(long, default_value_t = 1000)]
    rows_per_shard: usize,
    /// Tasks executed concurrently
    #[arg(short, long, default_value_t = 4)]
    workers: usize,
    /// Parent of the scratch directory (defaults to the system temp dir)
    #[arg(long)]
    scratch: Option<PathBuf>,
    #[arg(long)]
    keep_scratch: bool,
    #[arg(short, long, default_value = "target.db")]
    output: PathBuf,
    /// Print the final pairs to stdout
    #[arg(short, long)]
    print: bool,
    #[arg(long)]
    log_dir: Option<PathBuf>,
    input_files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logger(cli.log_dir.as_deref());

    let app = App::load(&cli.app)?;
    let ws = Workspace::scratch(cli.scratch.as_deref()).await?;
    info!(root = %ws.root().display(), app = %app.app_name, "scratch directory ready");

    let server = FileServer::start(ws.root(), &cli.listen).await?;
    let endpoint = Endpoint::Remote(server.addr().to_string());
    let job = Job::new(ws.clone(), app.handle(), endpoint, cli.workers);

    let result = run(&cli, &job).await;

    server.shutdown().await?;
    if cli.keep_scratch {
        info!(root = %ws.root().display(), "keeping scratch directory");
    } else if let Err(e) = ws.cleanup().await {
        warn!("{e:#}");
    }
    result
}

async fn run(cli: &Cli, job: &Job) -> Result<()> {
    let records = read_corpus(&cli.input_files).await?;
    let (n_map, n_reduce) = plan(records.len(), cli.rows_per_shard, cli.n_map, cli.n_reduce);
    info!(records = records.len(), n_map, n_reduce, "splitting input");
    job.split(&records, n_map).await?;

    let report = job.run(n_map, n_reduce).await?;
    info!(?report, "job finished");

    let total = job.gather(n_reduce, &cli.output).await?;
    info!(pairs = total, output = %cli.output.display(), "output written");

    if cli.print {
        let store = Store::open(&cli.output).await?;
        let mut pairs = store.scan_ordered();
        while let Some(pair) = pairs.try_next().await? {
            println!("{pair}");
        }
    }
    Ok(())
}
