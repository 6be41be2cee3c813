//! Point d'entrée CLI pour geoimport-pg

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use geoimport_pg::cli::{self, Commands};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Importer des géodonnées vectorielles (DXF, GeoJSON) vers PostGIS
#[derive(Parser)]
#[command(name = "geoimport-pg")]
#[command(author, version)]
#[command(about = "Importer des géodonnées vectorielles (DXF, GeoJSON) vers PostGIS")]
#[command(
    long_about = "Pipeline d'import: parsing DXF, détection du système de coordonnées, \
                  réparation des géométries, reprojection et import PostGIS par lots.\n\n\
                  Utilisez 'preview' pour générer du GeoJSON catégorisé sans base de données."
)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Import {
            path,
            project_file_id,
            collection,
            source_srid,
            target_srid,
            batch_size,
            schema,
            config,
            report_json,
            jobs,
            host,
            database,
            user,
            password,
            port,
            ssl,
        } => {
            cli::cmd_import(
                &path,
                &project_file_id,
                collection,
                source_srid,
                target_srid,
                batch_size,
                schema,
                &config,
                report_json,
                jobs,
                host,
                database,
                user,
                password,
                port,
                ssl,
            )
            .await?;
        }
        Commands::Preview {
            path,
            output,
            layers,
            source_srid,
        } => {
            cli::cmd_preview(&path, &output, layers, source_srid)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
