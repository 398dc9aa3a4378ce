//! Standalone migration runner, for environments that run migrations as a
//! separate deploy step rather than on main-process boot.

use ticketflow_core::{config, db};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_config = config::load_config()?;
    config::init_tracing(&app_config.log_level, app_config.log_json);

    let pool = db::establish_connection(&app_config.database_url).await?;
    db::run_migrations(&pool).await?;
    println!("migrations applied");
    Ok(())
}
