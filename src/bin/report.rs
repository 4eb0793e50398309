use clap::Parser;
use sensor_dashboard::downloader::{self, ExportFormat};
use sensor_dashboard::loader::ORIGINAL_SHEET;
use sensor_dashboard::{DashboardConfig, View, Workbook, summary, view};
use std::path::PathBuf;

/// Print one view of a sensor workbook as Markdown
#[derive(Parser, Debug)]
#[command(name = "report", version, about)]
struct Cli {
    /// Workbook with `Original` and `Completado_Filas` sheets
    file: PathBuf,

    #[arg(long, default_value = ORIGINAL_SHEET)]
    hoja: String,

    /// View slug (totales, anuales, mensual, promedios, extremos, distribucion, proporcion)
    #[arg(long, default_value = "totales")]
    vista: View,

    /// Also write the view's table to this .csv or .xlsx file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Ask for a written conclusion about the sheet
    #[arg(long)]
    conclusion: bool,

    /// Ask for a comparison of both sheets
    #[arg(long)]
    comparacion: bool,

    #[command(flatten)]
    config: DashboardConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sensor_dashboard::init_logging();
    let cli = Cli::parse();

    let workbook = Workbook::open(&cli.file)?;
    let table = workbook.load_sheet(&cli.hoja)?;
    log::info!("loaded {} rows from sheet '{}'", table.len(), cli.hoja);

    let data = view::compute(&table, cli.vista)?;
    println!("# {} / {}\n", workbook.file_name, cli.hoja);
    println!("{}", view::to_markdown(&data, cli.vista));

    if let Some(path) = &cli.export {
        let format: ExportFormat = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .parse()?;
        std::fs::write(path, downloader::export(&data, cli.vista, format)?)?;
        log::info!("wrote {}", path.display());
    }

    if cli.conclusion || cli.comparacion {
        let generator = cli.config.text_generator()?;
        if cli.conclusion {
            let text = summary::sheet_conclusion(generator.as_deref(), &table).await?;
            println!("## Conclusión\n\n{}\n", text);
        }
        if cli.comparacion {
            let text = summary::sheet_comparison(generator.as_deref(), &workbook).await?;
            println!("## Comparación entre hojas\n\n{}\n", text);
        }
    }

    Ok(())
}
