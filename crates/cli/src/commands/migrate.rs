//! Schema migration command.
//!
//! Runs the same migrator the server runs on startup and prints one line per
//! table. Exits with an error if any table failed.

use ai_store_server::config::ServerConfig;
use ai_store_server::db::{self, Migrator, SchemaState, migrations::TableStatus};

/// Run the schema migrator against `DATABASE_URL`.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database cannot be
/// opened, or any table failed to migrate.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    let schema = Migrator::default().run(&pool).await;
    pool.close().await;

    #[allow(clippy::print_stdout)]
    {
        print!("{}", report(&schema));
    }

    if schema.is_fully_migrated() {
        Ok(())
    } else {
        Err(format!("{} table(s) failed to migrate", schema.failed_tables().count()).into())
    }
}

/// Render the per-table report.
fn report(schema: &SchemaState) -> String {
    let mut out = String::new();
    for table in Migrator::default().table_names() {
        let line = match schema.status(table) {
            Some(TableStatus::Ready { columns }) => {
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                format!("{table:<10} ok      {}\n", columns.join(", "))
            }
            Some(TableStatus::Failed { error }) => format!("{table:<10} FAILED  {error}\n"),
            None => format!("{table:<10} skipped\n"),
        };
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_lists_every_table() {
        let pool = db::connect_in_memory().await.unwrap();
        let schema = Migrator::default().run(&pool).await;

        let text = report(&schema);
        for table in ["products", "users", "cart", "orders"] {
            assert!(text.contains(table), "missing {table} in:\n{text}");
        }
        assert!(!text.contains("FAILED"));
        assert!(text.contains("imageUrl"));
    }
}
