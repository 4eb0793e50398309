use clap::Parser;
use sensor_dashboard::{DashboardConfig, app};

/// Serve the sensor dashboard
#[derive(Parser, Debug)]
#[command(name = "dashboard", version, about)]
struct Cli {
    #[command(flatten)]
    config: DashboardConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sensor_dashboard::init_logging();
    let cli = Cli::parse();

    log::info!(
        "starting dashboard on {} (model {})",
        cli.config.bind_addr(),
        cli.config.model
    );
    app::run(cli.config).await
}
