use campus_session::app::App;
use campus_session::domain_model::TokenPair;
use campus_session::logger::*;
use campus_session::settings::*;
use serde_json::json;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let app = App::try_new(&project_settings)?;
    let session = app.session.clone();

    match cli.command {
        Command::Run => {
            session.start()?;
            info!("session monitor running, press Ctrl-C to stop");
            signal::ctrl_c().await?;
        }
        Command::Status => {
            let status = session.session_status()?;
            let body = json!({
                "is_valid": status.is_valid,
                "time_until_expiry_secs": status.time_until_expiry.as_secs(),
                "is_refreshing": status.is_refreshing,
                "retry_count": status.retry_count,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Refresh => {
            let refreshed = session.force_refresh().await;
            println!("{}", json!({ "refreshed": refreshed }));
            if !refreshed {
                app.shutdown().await;
                return Err(anyhow::anyhow!("token refresh failed"));
            }
        }
        Command::Login { access, refresh } => {
            session.login(TokenPair {
                access_token: access,
                refresh_token: refresh,
            })?;
            let status = session.session_status()?;
            if !status.is_valid {
                warn!("stored access token is already expired or unreadable");
            }
        }
        Command::Logout => session.logout()?,
    }

    let shutdown_timeout = std::time::Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, app.shutdown()).await {
        Ok(_) => info!("session manager stopped"),
        Err(_) => error!("session manager shutdown timed out"),
    }

    Ok(())
}
