use clap::Parser;

use curvewheel::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Serve { host, port, data_dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(curvewheel::api::serve(&host, port, &data_dir))
        }
        cli::Command::Migrate { data_dir } => curvewheel::store::migrate_cmd(&data_dir),
    }
}
