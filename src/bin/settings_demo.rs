use campus_session::settings::*;

fn main() -> anyhow::Result<()> {
    // Load settings from the default location, or from --settings
    // $ cargo run --bin settings_demo -- --settings=settings/release.toml status
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!("Loaded settings: {:#?}", project_settings);

    let config = project_settings.session.to_config()?;
    println!("Session config: {:#?}", config);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    Ok(())
}
