use super::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "campus-session", about = "Keeps a campus marketplace session alive")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep the stored session fresh until Ctrl-C.
    Run,
    /// Print the current session status as JSON.
    Status,
    /// Refresh the access token now.
    Refresh,
    /// Store tokens obtained from the login endpoint.
    Login {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
    },
    /// Forget the stored tokens.
    Logout,
}
