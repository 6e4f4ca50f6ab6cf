//! yologen CLI: datasets, versions and training jobs from the terminal.

mod app;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use yologen::analysis::FrequencyBar;
use yologen::client::health::{self, BackendHealth, HealthMonitor};
use yologen::client::{
    AnalysisView, Backend, Confirm, DatasetRegistry, DatasetWorkflow, TrainingConfigurator,
};
use yologen::forms::{parse_classes, validate_new_dataset};
use yologen::models::{AugmentationConfig, DatasetAnalysis, DatasetStats, TrainingConfig};
use yologen::session::RegisterRequest;
use yologen::{Permission, PipelineController, PipelineStatus, Role};

use crate::app::{spinner, App, BrowserNavigator, PrintNavigator, StdinConfirm};

#[derive(Parser)]
#[command(
    name = "yologen",
    about = "🎯 yologen: datasets, versions and training jobs",
    version,
    author
)]
struct Cli {
    /// Config file (YAML)
    #[arg(long, global = true, env = "YOLOGEN_CONFIG", default_value = "yologen.yaml")]
    config: PathBuf,
    /// Backend base URL, overrides the config file and YOLOGEN_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Also write logs (JSON) to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        username: String,
        /// Password (prompted for when omitted)
        #[arg(long, env = "YOLOGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "user")]
        role: Role,
        /// Password (prompted for when omitted)
        #[arg(long, env = "YOLOGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// Show the logged-in user and their permissions
    Whoami,
    /// List datasets with their pipeline stage
    Datasets,
    /// Create a dataset
    Create {
        name: String,
        #[arg(long, short, default_value = "")]
        description: String,
        /// Comma-separated class names, e.g. "car,bus,truck"
        #[arg(long, short)]
        classes: String,
    },
    /// Delete a dataset and everything in it
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Upload images to a dataset
    Upload {
        id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate a dataset version (export with augmentations)
    Generate {
        id: String,
        #[arg(long)]
        flip_horizontal: bool,
        #[arg(long)]
        flip_vertical: bool,
        #[arg(long)]
        grayscale: bool,
    },
    /// Download the latest export in the browser
    Export {
        id: String,
        /// Print the download URL instead of opening it
        #[arg(long)]
        print: bool,
    },
    /// Analyze a dataset's training readiness
    Analyze {
        id: String,
        /// Print the raw report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a training job
    Train {
        id: String,
        #[command(flatten)]
        settings: TrainArgs,
        /// Train on these classes only (comma-separated)
        #[arg(long)]
        classes: Option<String>,
    },
    /// List training jobs
    Jobs,
    /// Show one training job
    Job { job_id: String },
    /// Cancel a training job and remove it from the job list
    Cancel {
        job_id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Manage user accounts (admin)
    Users {
        #[command(subcommand)]
        action: Option<UserAction>,
    },
    /// Check that the backend is up
    Health {
        /// Keep polling until Ctrl-C
        #[arg(long, short)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// List accounts (default)
    List,
    /// Change an account's role
    SetRole { user_id: String, role: Role },
    /// Delete an account
    Delete {
        user_id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    epochs: Option<u32>,
    #[arg(long)]
    batch_size: Option<u32>,
    #[arg(long)]
    img_size: Option<u32>,
    #[arg(long)]
    lr: Option<f64>,
    #[arg(long)]
    patience: Option<u32>,
    #[arg(long)]
    device: Option<String>,
}

impl TrainArgs {
    /// The defaults with every given flag applied.
    fn config(&self) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        if let Some(model) = &self.model {
            config.model_name = model.clone();
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(img_size) = self.img_size {
            config.img_size = img_size;
        }
        if self.lr.is_some() {
            config.learning_rate = self.lr;
        }
        if self.patience.is_some() {
            config.patience = self.patience;
        }
        if self.device.is_some() {
            config.device = self.device.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    // Checked before the session is touched.
    match &cli.command {
        Commands::Create {
            name,
            description,
            classes,
        } => {
            validate_new_dataset(name, description, classes)?;
        }
        Commands::Train { settings, .. } => settings.config().validate()?,
        _ => {}
    }

    let app = App::open(&cli.config, cli.api_url.clone())?;

    match cli.command {
        Commands::Login { username, password } => cmd_login(&app, username, password).await?,
        Commands::Register {
            username,
            email,
            role,
            password,
        } => cmd_register(&app, username, email, role, password).await?,
        Commands::Logout => cmd_logout(&app)?,
        Commands::Whoami => cmd_whoami(&app).await?,
        Commands::Datasets => cmd_datasets(&app).await?,
        Commands::Create {
            name,
            description,
            classes,
        } => cmd_create(&app, name, description, classes).await?,
        Commands::Delete { id, yes } => cmd_delete(&app, id, yes).await?,
        Commands::Upload { id, files } => cmd_upload(&app, id, files).await?,
        Commands::Generate {
            id,
            flip_horizontal,
            flip_vertical,
            grayscale,
        } => {
            let config = AugmentationConfig {
                flip_horizontal,
                flip_vertical,
                grayscale,
            };
            cmd_generate(&app, id, config).await?
        }
        Commands::Export { id, print } => cmd_export(&app, id, print).await?,
        Commands::Analyze { id, json } => cmd_analyze(&app, id, json).await?,
        Commands::Train {
            id,
            settings,
            classes,
        } => cmd_train(&app, id, settings.config(), classes).await?,
        Commands::Jobs => cmd_jobs(&app).await?,
        Commands::Job { job_id } => cmd_job(&app, job_id).await?,
        Commands::Cancel { job_id, yes } => cmd_cancel(&app, job_id, yes).await?,
        Commands::Users { action } => {
            cmd_users(&app, action.unwrap_or(UserAction::List)).await?
        }
        Commands::Health { watch } => cmd_health(&app, watch).await?,
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let (file, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file must name a file")?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_login(app: &App, username: String, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => app::read_line("Password: ")?,
    };
    let user = app.session.login(&username, &password).await?;
    app.save_session()?;
    println!("  ✓ Logged in as {} ({})", user.username, user.role);
    Ok(())
}

async fn cmd_register(
    app: &App,
    username: String,
    email: String,
    role: Role,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => app::read_line("Password: ")?,
    };
    let user = app
        .session
        .register(&RegisterRequest {
            username,
            email,
            password,
            role,
        })
        .await?;
    app.save_session()?;
    println!("  ✓ Registered and logged in as {} ({})", user.username, user.role);
    Ok(())
}

fn cmd_logout(app: &App) -> Result<()> {
    app.session.logout();
    app.save_session()?;
    println!("  ✓ Logged out");
    Ok(())
}

async fn cmd_whoami(app: &App) -> Result<()> {
    let user = app.require(None).await?;
    println!("User:  {}", user.username);
    if let Some(email) = &user.email {
        println!("Email: {}", email);
    }
    println!("Role:  {}", user.role);
    let permissions: Vec<&str> = user.permissions().iter().map(|p| p.as_str()).collect();
    println!("Permissions: {}", permissions.join(", "));

    match app.backend.permissions().await {
        Ok(grant) => {
            let (remote_only, local_only) = grant.drift();
            if grant.role != user.role {
                eprintln!("  ! Backend reports role {}", grant.role);
            }
            if !remote_only.is_empty() {
                eprintln!("  ! Granted by the backend only: {}", remote_only.join(", "));
            }
            if !local_only.is_empty() {
                let names: Vec<&str> = local_only.iter().map(|p| p.as_str()).collect();
                eprintln!("  ! Not granted by the backend: {}", names.join(", "));
            }
        }
        Err(e) => warn!(error = %e, "Could not fetch permissions from the backend"),
    }
    Ok(())
}

async fn cmd_datasets(app: &App) -> Result<()> {
    app.require(Some(Permission::ViewDataset.into())).await?;
    let registry = DatasetRegistry::new(app.backend.clone(), app.notifier.clone());

    let pb = spinner("Loading datasets");
    let entries = registry.list().await;
    pb.finish_and_clear();
    let entries = entries?;

    if entries.is_empty() {
        println!("No datasets yet. Create one with `yologen create`.");
        return Ok(());
    }

    let controller = PipelineController::new();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["ID", "Name", "Classes", "Images", "Annotated", "Stage", "Next"]);
    for entry in &entries {
        let status = entry.status(&controller);
        let (images, annotated) = match entry.stats_error {
            Some(_) => ("?".to_string(), "?".to_string()),
            None => (
                entry.stats.total_images.to_string(),
                format!("{:.0}%", entry.stats.completion()),
            ),
        };
        table.add_row([
            entry.dataset.id.as_str(),
            &entry.dataset.name,
            &entry.dataset.classes.join(", "),
            &images,
            &annotated,
            status.stage.as_str(),
            status.recommended.map(|a| a.as_str()).unwrap_or("-"),
        ]);
    }
    println!("{}", table);

    let degraded = entries.iter().filter(|e| e.stats_error.is_some()).count();
    if degraded > 0 {
        eprintln!("  ! Stats unavailable for {} dataset(s)", degraded);
    }
    Ok(())
}

async fn cmd_create(app: &App, name: String, description: String, classes: String) -> Result<()> {
    app.require(Some(Permission::CreateDataset.into())).await?;
    let registry = DatasetRegistry::new(app.backend.clone(), app.notifier.clone());
    let dataset = registry.create(&name, &description, &classes).await?;
    println!("   ID:      {}", dataset.id);
    println!("   Classes: {}", dataset.classes.join(", "));
    println!("   Next:    yologen upload {} <images...>", dataset.id);
    Ok(())
}

async fn cmd_delete(app: &App, id: String, yes: bool) -> Result<()> {
    app.require(Some(Permission::DeleteDataset.into())).await?;
    let registry = DatasetRegistry::new(app.backend.clone(), app.notifier.clone());
    if !registry.delete(&id, &StdinConfirm { assume_yes: yes }).await? {
        println!("Cancelled.");
    }
    Ok(())
}

async fn cmd_upload(app: &App, id: String, files: Vec<PathBuf>) -> Result<()> {
    app.require(Some(Permission::EditDataset.into())).await?;
    let workflow = DatasetWorkflow::new(app.backend.clone(), app.notifier.clone(), &id);
    let report = workflow
        .upload(&files, || print_progress(app, &workflow))
        .await?;
    for reason in report.rejected.iter().chain(&report.errors) {
        eprintln!("    - {}", reason);
    }
    Ok(())
}

async fn cmd_generate(app: &App, id: String, config: AugmentationConfig) -> Result<()> {
    app.require(Some(Permission::EditDataset.into())).await?;
    let workflow = DatasetWorkflow::new(app.backend.clone(), app.notifier.clone(), &id);
    workflow
        .generate_version(config, || print_progress(app, &workflow))
        .await?;
    println!("   Download with: yologen export {}", id);
    Ok(())
}

async fn cmd_export(app: &App, id: String, print: bool) -> Result<()> {
    app.require(Some(Permission::ViewDataset.into())).await?;
    let registry = DatasetRegistry::new(app.backend.clone(), app.notifier.clone());
    if print {
        registry.export(&id, &PrintNavigator);
    } else {
        registry.export(&id, &BrowserNavigator);
    }
    Ok(())
}

async fn cmd_analyze(app: &App, id: String, json: bool) -> Result<()> {
    app.require(Some(Permission::ViewDataset.into())).await?;
    let view = AnalysisView::new(app.backend.clone(), &id);

    let pb = spinner("Analyzing dataset");
    let analysis = view.load().await;
    pb.finish_and_clear();
    let analysis = analysis.with_context(|| format!("Analysis of dataset {id} failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis, &view.bars());
    }
    Ok(())
}

async fn cmd_train(
    app: &App,
    id: String,
    config: TrainingConfig,
    classes: Option<String>,
) -> Result<()> {
    app.require(Some(Permission::StartTraining.into())).await?;
    let dataset = app.backend.dataset(&id).await?;

    let mut configurator =
        TrainingConfigurator::new(app.backend.clone(), app.notifier.clone(), &dataset);
    *configurator.config_mut() = config;
    if let Some(csv) = classes {
        configurator.select_only(&parse_classes(&csv))?;
    }

    let workflow = DatasetWorkflow::new(app.backend.clone(), app.notifier.clone(), &id);
    let job = workflow.train(&configurator).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Setting", "Value"]);
    table.add_row(["Job", job.job_id.as_str()]);
    table.add_row(["Model", job.config.model_name.as_str()]);
    table.add_row(["Epochs", &job.config.epochs.to_string()]);
    table.add_row(["Batch size", &job.config.batch_size.to_string()]);
    table.add_row(["Image size", &job.config.img_size.to_string()]);
    table.add_row(["Classes", &job.classes.join(", ")]);
    println!("{}", table);
    Ok(())
}

async fn cmd_jobs(app: &App) -> Result<()> {
    app.require(Some(Permission::ViewTraining.into())).await?;

    let pb = spinner("Loading training jobs");
    let jobs = app.backend.training_jobs().await;
    pb.finish_and_clear();
    let jobs = jobs?;

    if jobs.is_empty() {
        println!("No training jobs.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Job", "Dataset", "Status", "Progress"]);
    for job in &jobs {
        table.add_row([
            job.job_id.as_str(),
            job.dataset_id.as_deref().unwrap_or("-"),
            &job.status,
            &job.progress_label(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

async fn cmd_job(app: &App, job_id: String) -> Result<()> {
    app.require(Some(Permission::ViewTraining.into())).await?;
    let job = app.backend.training_status(&job_id).await?;

    println!("Job:      {}", job.job_id);
    println!("Dataset:  {}", job.dataset_id.as_deref().unwrap_or("-"));
    println!("Status:   {}", job.status);
    println!("Progress: {}", job.progress_label());
    if !job.extra.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Field", "Value"]);
        for (key, value) in &job.extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            table.add_row([key.as_str(), &value]);
        }
        println!("{}", table);
    }
    Ok(())
}

async fn cmd_cancel(app: &App, job_id: String, yes: bool) -> Result<()> {
    app.require(Some(Permission::StopTraining.into())).await?;
    let confirm = StdinConfirm { assume_yes: yes };
    if !confirm.confirm(&format!("Cancel training job {job_id}?")) {
        println!("Cancelled.");
        return Ok(());
    }
    app.backend.delete_training_job(&job_id).await?;
    println!("  ✓ Training job {} removed", job_id);
    Ok(())
}

async fn cmd_users(app: &App, action: UserAction) -> Result<()> {
    let me = app.require(Some(Permission::ManageUsers.into())).await?;

    match action {
        UserAction::List => {
            let users = app.backend.list_users().await?;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(["ID", "Username", "Email", "Role"]);
            for user in &users {
                table.add_row([
                    user.id.as_str(),
                    &user.username,
                    user.email.as_deref().unwrap_or("-"),
                    user.role.as_str(),
                ]);
            }
            println!("{}", table);
        }
        UserAction::SetRole { user_id, role } => {
            app.backend.update_user_role(&user_id, role).await?;
            println!("  ✓ User {} is now {}", user_id, role);
        }
        UserAction::Delete { user_id, yes } => {
            if user_id == me.id {
                bail!("Cannot delete your own account");
            }
            let confirm = StdinConfirm { assume_yes: yes };
            if !confirm.confirm(&format!("Delete user {user_id}?")) {
                println!("Cancelled.");
                return Ok(());
            }
            app.backend.delete_user(&user_id).await?;
            println!("  ✓ User {} deleted", user_id);
        }
    }
    Ok(())
}

async fn cmd_health(app: &App, watch: bool) -> Result<()> {
    if !watch {
        return match health::check(app.backend.as_ref()).await {
            BackendHealth::Online(status) => {
                println!("  ✓ {} is {}", app.config.base_url, status.status);
                Ok(())
            }
            BackendHealth::Offline(reason) => bail!("{} is offline: {}", app.config.base_url, reason),
            BackendHealth::Unknown => bail!("{} did not answer", app.config.base_url),
        };
    }

    let handle = HealthMonitor::spawn(app.backend.clone(), app.config.health_poll_interval());
    let mut updates = handle.subscribe();
    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        app.config.base_url,
        app.config.health_poll_interval().as_secs()
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                match &*updates.borrow_and_update() {
                    BackendHealth::Online(status) => println!("  ✓ {}", status.status),
                    BackendHealth::Offline(reason) => println!("  ✗ {}", reason),
                    BackendHealth::Unknown => {}
                }
            }
        }
    }
    handle.stop().await;
    Ok(())
}

// ─── Output helpers ───────────────────────────────────────────────────────────

const BAR_WIDTH: f64 = 30.0;

async fn print_progress(app: &App, workflow: &DatasetWorkflow) {
    match app.backend.dataset_stats(workflow.dataset_id()).await {
        Ok(stats) => print_status(&stats, &workflow.status(&stats)),
        Err(e) => warn!(dataset = %workflow.dataset_id(), error = %e, "Could not refresh stats"),
    }
}

fn print_status(stats: &DatasetStats, status: &PipelineStatus) {
    println!(
        "   Images: {} ({} annotated, {:.0}%)",
        stats.total_images,
        stats.annotated_images,
        stats.completion()
    );
    println!(
        "   Stage:  {} · next: {}",
        status.stage,
        status.recommended.map(|a| a.as_str()).unwrap_or("-")
    );
}

fn print_analysis(analysis: &DatasetAnalysis, bars: &[FrequencyBar]) {
    println!("── Quality ──────────────────────────────");
    for (label, pct) in analysis.score_percentages() {
        println!("  {:<17} {:.1}%", format!("{label}:"), pct);
    }
    println!(
        "  Images:           {} ({} annotated, {} boxes, {:.1} per image)",
        analysis.total_images,
        analysis.annotated_images,
        analysis.total_annotations,
        analysis.avg_objects_per_image
    );
    if !analysis.structure_valid && !analysis.structure_issues.is_empty() {
        println!("  Structure:        {} issue(s)", analysis.structure_issues.len());
    }
    if analysis.data_leakage_detected {
        println!("  ! Images shared between splits");
    }
    println!();

    println!("── Class frequency ──────────────────────");
    if bars.is_empty() {
        println!("  (no annotations)");
    }
    let width = bars.iter().map(|b| b.label.len()).max().unwrap_or(0);
    for bar in bars {
        let len = (bar.height_pct / 100.0 * BAR_WIDTH).round() as usize;
        println!("  {:<width$} {} {}", bar.label, "█".repeat(len), bar.count);
    }
    println!();

    let issues: Vec<_> = analysis
        .issues()
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .collect();
    if !issues.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Issue", "Count", "Example"]);
        for (kind, items) in issues {
            table.add_row([kind, &items.len().to_string(), items[0].as_str()]);
        }
        println!("{}", table);
    }

    if analysis.recommended_epochs > 0 {
        println!(
            "Suggested: --img-size {} --batch-size {} --epochs {}",
            analysis.recommended_image_size,
            analysis.recommended_batch_size,
            analysis.recommended_epochs
        );
    }
    for warning in &analysis.warnings {
        println!("  ! {}", warning);
    }
    for rec in &analysis.recommendations {
        println!("  → {}", rec);
    }
}
