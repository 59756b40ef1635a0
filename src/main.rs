//! based - Main entry point.
//!
//! Runs the given SQL statements in one transaction and prints the rows
//! returned by the last one as JSON lines.

use based::config::Config;
use based::{Database, DbError};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr so stdout carries only rows
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let database = Database::new(&config.url, config.database_options())?;
    info!(
        url = %database.url(),
        force_rollback = database.force_rollback(),
        statements = config.statements.len(),
        "Starting based v{}",
        env!("CARGO_PKG_VERSION")
    );

    let statements = &config.statements;
    let result = database
        .run(|db| async move {
            db.transaction(|session| async move {
                let mut rows = Vec::new();
                for sql in statements {
                    rows = session.fetch_all(sql.as_str()).await?;
                }
                Ok::<_, DbError>(rows)
            })
            .await
        })
        .await;

    let rows = match result {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "Statements failed");
            return Err(e.into());
        }
    };

    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }

    info!(rows = rows.len(), "Done");
    Ok(())
}
