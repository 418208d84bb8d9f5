//! Vetcall CLI - consultation preflight and local settings.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use vetcall_core::{
    BlurDegree, ContextClient, HttpTokenClient, Role, SessionConfig, Settings, SettingsStore,
    TokenProvider, VirtualBackgroundConfig, gradient,
};

#[derive(Parser)]
#[command(name = "vetcall")]
#[command(about = "Prepare and inspect veterinary video consultations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding settings.json (defaults to the user config dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the API base URL from settings
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Resolve an appointment and check that a join token can be issued
    Prepare {
        /// Appointment id (also the call channel)
        appointment: String,

        /// Bearer token for the platform API
        #[arg(long, env = "VETCALL_API_TOKEN")]
        bearer: Option<String>,
    },

    /// Render a gradient background to a PNG file
    Gradient {
        /// e.g. "135deg, #667eea 0%, #764ba2 100%"
        spec: String,

        #[arg(short, long, default_value = "background.png")]
        out: PathBuf,

        #[arg(long, default_value = "1280")]
        width: u32,

        #[arg(long, default_value = "720")]
        height: u32,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        api_base_url: Option<String>,
        #[arg(long)]
        app_id: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        mic_on_join: Option<bool>,
        #[arg(long)]
        camera_on_join: Option<bool>,
        /// none, blur-low, blur-medium, blur-high, image:<src> or gradient:<spec>
        #[arg(long)]
        background: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "vetcall_core=trace,vetcall_cli=debug"
    } else {
        "vetcall_core=debug,vetcall_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(cli_dir: Option<PathBuf>) -> Result<PathBuf> {
    match cli_dir {
        Some(dir) => Ok(dir),
        None => dirs::config_dir()
            .map(|d| d.join("vetcall"))
            .ok_or_else(|| anyhow!("no config directory on this platform, pass --data-dir")),
    }
}

fn require_app_id(settings: &Settings) -> Result<&str> {
    settings
        .app_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .context("no app id; set one with `vetcall settings set --app-id`")
}

fn parse_background(value: &str) -> Result<Option<VirtualBackgroundConfig>> {
    let config = match value {
        "none" => return Ok(None),
        "blur-low" => VirtualBackgroundConfig::Blur(BlurDegree::Low),
        "blur-medium" | "blur" => VirtualBackgroundConfig::Blur(BlurDegree::Medium),
        "blur-high" => VirtualBackgroundConfig::Blur(BlurDegree::High),
        other => {
            if let Some(src) = other.strip_prefix("image:") {
                VirtualBackgroundConfig::Image(src.to_string())
            } else if let Some(spec) = other.strip_prefix("gradient:") {
                gradient::parse_gradient(spec)?;
                VirtualBackgroundConfig::Gradient(spec.to_string())
            } else {
                bail!("unknown background '{other}'");
            }
        }
    };
    Ok(Some(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = SettingsStore::new(data_dir(cli.data_dir)?);

    match cli.command {
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                println!("{}", serde_json::to_string_pretty(&store.get())?);
            }
            SettingsAction::Set {
                api_base_url,
                app_id,
                display_name,
                mic_on_join,
                camera_on_join,
                background,
            } => {
                if let Some(url) = api_base_url {
                    store.set_api_base_url(Some(url));
                }
                if let Some(id) = app_id {
                    store.set_app_id(Some(id));
                }
                if let Some(name) = display_name {
                    store.set_display_name(Some(name));
                }
                if let Some(enabled) = mic_on_join {
                    store.set_mic_enabled_on_join(enabled);
                }
                if let Some(enabled) = camera_on_join {
                    store.set_camera_enabled_on_join(enabled);
                }
                if let Some(value) = background {
                    store.set_default_background(parse_background(&value)?);
                }
                println!("{}", serde_json::to_string_pretty(&store.get())?);
            }
        },
        Commands::Prepare { appointment, bearer } => {
            let settings = store.get();
            let base = cli
                .api_base_url
                .or_else(|| settings.api_base_url.clone())
                .context("no API base URL; set one with `vetcall settings set --api-base-url`")?;
            prepare(&base, &appointment, bearer, &settings).await?;
        }
        Commands::Gradient { spec, out, width, height } => {
            let parsed = gradient::parse_gradient(&spec)?;
            let image = gradient::render(&parsed, width, height);
            image
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {}x{} gradient to {}", width, height, out.display());
        }
    }

    Ok(())
}

async fn prepare(
    base: &str,
    appointment_id: &str,
    bearer: Option<String>,
    settings: &Settings,
) -> Result<()> {
    let app_id = require_app_id(settings)?;
    let mut context = ContextClient::new(base)?;
    if let Some(token) = bearer {
        context = context.with_bearer(token);
    }

    let appointment = context.appointment(appointment_id).await?;
    let profile = context.own_profile().await?;
    tracing::info!("resolved appointment {} for {:?} {}", appointment.id, profile.role, profile.id);

    let own_id = match profile.role {
        Role::Veterinarian => &appointment.vet_id,
        Role::PetParent => &appointment.parent_id,
    };
    if *own_id != profile.id {
        bail!("profile {} is not part of appointment {}", profile.id, appointment.id);
    }

    let counterpart = match profile.role {
        Role::Veterinarian => context.pet_parent(&appointment.parent_id).await?.name,
        Role::PetParent => context.veterinarian(&appointment.vet_id).await?.name,
    };

    let config = SessionConfig::for_appointment(app_id, &appointment, profile.role)
        .with_settings(settings);

    let credential = HttpTokenClient::new(base)
        .fetch_token(&config.channel, &config.identity, true)
        .await?;

    println!("appointment:   {}", appointment.id);
    if let Some(pet) = &appointment.pet_name {
        println!("pet:           {pet}");
    }
    println!("scheduled at:  {}", appointment.scheduled_at.to_rfc3339());
    println!("with:          {counterpart}");
    println!("channel:       {}", config.channel);
    println!("identity:      {}", config.identity);
    println!("mic on join:   {}", config.mic_enabled_on_join);
    println!("camera on join:{}", config.camera_enabled_on_join);
    println!("background:    {:?}", config.initial_background.kind());
    println!("review prompt: {}", if config.review_target.is_some() { "at call end" } else { "n/a" });
    match credential.ttl {
        Some(ttl) => println!("token:         ok (ttl {ttl}s)"),
        None => println!("token:         ok"),
    }
    Ok(())
}
