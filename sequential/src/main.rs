use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use clap::Parser;
use common::{corpus::read_corpus, sequential, App};
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(short, long)]
    app_name: String,
    input_files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app = App::load(&cli.app_name)?;

    let records = read_corpus(&cli.input_files)?;
    info!(records = records.len(), app = %app.app_name, "running sequentially");

    let output = sequential::run(&*app, records);

    let path = PathBuf::from(format!("mr-{}-seq", &cli.app_name));
    let mut output_file = BufWriter::new(File::create(&path)?);
    for pair in &output {
        writeln!(output_file, "{pair}")?;
    }
    output_file.flush()?;
    info!(keys = output.len(), path = %path.display(), "done");

    Ok(())
}
