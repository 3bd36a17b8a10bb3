use clap::Parser;
use lockd::cli::Cli;

fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	lockd::init_tracing(&cli);

	tracing::info!(scenario = ?cli.scenario, "starting lockd demo");
	lockd::run(&cli)
}
