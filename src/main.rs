use gebeta::cli::run_cli;
use gebeta::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let _guard = init_logging()?;
    run_cli()
}
