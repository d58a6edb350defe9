use std::path::PathBuf;

use actix_web::web;
use anyhow::Context;
use clap::{Parser, Subcommand};
use dof3a_core::{Config, Grade, NewUser};
use dof3a_server::logging::init_logging;
use dof3a_server::AppState;

#[derive(Parser, Debug)]
#[command(name = "dof3a-server")]
#[command(about = "dof3a educational platform API")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DOF3A_DEBUG", default_value = "false")]
    debug: bool,

    /// Server port (overrides DOF3A_PORT and dof3a.toml)
    #[arg(long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long, env = "DOF3A_HOST", default_value = "127.0.0.1")]
    host: String,

    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Create a user together with its student profile
    AddUser {
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        /// e.g. "Middle 2"
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        staff: bool,
    },
    /// Print a new API token for a user
    IssueToken { user_id: i64 },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = Config::load();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    log::debug!(
        "Resolved configuration: model={}, database={:?}, port={}",
        config.model,
        config.database_path,
        config.port
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to open the platform database")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            log::info!("Starting dof3a server on port {}", config.port);
            dof3a_server::run(web::Data::new(state), &cli.host, config.port).await?;
        }
        Commands::AddUser {
            username,
            email,
            first_name,
            last_name,
            grade,
            staff,
        } => {
            let grade = grade
                .map(|grade| grade.parse::<Grade>())
                .transpose()
                .context("invalid --grade")?;
            let user = state
                .store
                .create_user(NewUser {
                    username,
                    email,
                    first_name,
                    last_name,
                    is_staff: staff,
                    is_superuser: false,
                })
                .await?;
            if let Some(grade) = grade {
                state.store.update_student_grade(user.id, grade).await?;
            }
            println!("Created user {} ({})", user.id, user.username);
        }
        Commands::IssueToken { user_id } => {
            let token = state.store.issue_token(user_id).await?;
            println!("{token}");
        }
    }

    Ok(())
}
